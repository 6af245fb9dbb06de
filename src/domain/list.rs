use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{Record, SortOrder};

pub const DEFAULT_COLOR: &str = "#3b82f6";
pub const DEFAULT_ICON: &str = "list";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ListId(pub Uuid);

impl ListId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Classifier deciding whether member todos carry priority/due-date fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Task,
    Casual,
}

impl ListKind {
    /// Whether todos filed under a list of this kind carry priority and
    /// due-date fields.
    pub fn carries_details(self) -> bool {
        matches!(self, ListKind::Task)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct List {
    pub id: ListId,
    pub user_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ListKind,
    pub color: String,
    pub icon: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for List {
    type Patch = UpdateList;

    const ORDER: SortOrder = SortOrder::CreatedAsc;

    fn id(&self) -> Uuid {
        self.id.0
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply_patch(&mut self, patch: &UpdateList) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        if let Some(icon) = &patch.icon {
            self.icon = icon.clone();
        }
    }
}

/// Caller-supplied fields for a new list; identity and ownership are stamped
/// by the synchronizer.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateList {
    pub name: String,
    pub kind: ListKind,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ListKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}
