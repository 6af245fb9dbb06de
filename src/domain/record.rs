use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Ordering a collection maintains, keyed on creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    CreatedAsc,
    CreatedDesc,
}

/// An entity that can live in a `RecordStore`.
///
/// Identifiers are generated client-side before the first network call and
/// never change, so an optimistic row and its server-confirmed counterpart
/// can always be matched up.
pub trait Record: Clone + Send + Sync + 'static {
    /// Partial-update payload for this entity.
    type Patch: Clone + Send + Sync + 'static;

    const ORDER: SortOrder;

    fn id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
    fn apply_patch(&mut self, patch: &Self::Patch);
}
