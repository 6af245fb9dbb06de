use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::record::{Record, SortOrder};

/// Copy of a store's contents, taken immediately before an optimistic
/// mutation so the failure path can undo it.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    records: Vec<T>,
}

/// Ordered in-memory collection of one entity type with optimistic-mutation
/// support.
///
/// Rows are keyed by their client-assigned id and held in creation-time
/// order. Every mutation issues a per-id sequence number; reconciliation and
/// rollback only apply while their sequence is still the latest issued for
/// that id, so a slow older mutation's failure handler can never clobber a
/// newer mutation's optimistic state.
#[derive(Debug)]
pub struct RecordStore<T: Record> {
    records: Vec<T>,
    mutations: HashMap<Uuid, u64>,
}

impl<T: Record> Default for RecordStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> RecordStore<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            mutations: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.records.iter().find(|r| r.id() == id)
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    fn insert_sorted(&mut self, row: T) {
        let key = row.created_at();
        let pos = match T::ORDER {
            SortOrder::CreatedAsc => self.records.iter().position(|r| r.created_at() > key),
            SortOrder::CreatedDesc => self.records.iter().position(|r| r.created_at() < key),
        }
        .unwrap_or(self.records.len());
        self.records.insert(pos, row);
    }

    /// Replace the whole collection with freshly fetched rows.
    pub fn replace_all(&mut self, mut rows: Vec<T>) {
        match T::ORDER {
            SortOrder::CreatedAsc => rows.sort_by_key(|r| r.created_at()),
            SortOrder::CreatedDesc => rows.sort_by(|a, b| b.created_at().cmp(&a.created_at())),
        }
        self.records = rows;
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        Snapshot {
            records: self.records.clone(),
        }
    }

    /// Whole-collection rollback to a prior snapshot.
    pub fn restore(&mut self, snapshot: Snapshot<T>) {
        self.records = snapshot.records;
    }

    /// Insert a row that already carries its final id, at its sort position.
    pub fn optimistic_insert(&mut self, row: T) {
        self.insert_sorted(row);
    }

    /// Merge partial fields into the row at `id`; `false` if absent.
    pub fn optimistic_update(&mut self, id: Uuid, patch: &T::Patch) -> bool {
        match self.position(id) {
            Some(pos) => {
                self.records[pos].apply_patch(patch);
                true
            }
            None => false,
        }
    }

    /// Remove the row at `id`. Idempotent.
    pub fn optimistic_delete(&mut self, id: Uuid) {
        self.records.retain(|r| r.id() != id);
    }

    /// Replace the row at `id` with the server-confirmed version without
    /// moving it; if the row was concurrently removed, insert it at its sort
    /// position instead. Never duplicates, and applying the same row twice
    /// is a no-op.
    pub fn reconcile(&mut self, id: Uuid, server: T) {
        match self.position(id) {
            Some(pos) => self.records[pos] = server,
            None => self.insert_sorted(server),
        }
    }

    /// Issue a mutation sequence number for `id`. Every optimistic mutation
    /// takes one before touching the store.
    pub fn begin_mutation(&mut self, id: Uuid) -> u64 {
        let seq = self.mutations.entry(id).or_insert(0);
        *seq += 1;
        *seq
    }

    pub fn mutation_is_current(&self, id: Uuid, seq: u64) -> bool {
        self.mutations.get(&id).is_some_and(|latest| *latest == seq)
    }

    /// Reconcile, unless a newer mutation has been issued for `id` since
    /// `seq` — then the confirmation is stale and is discarded.
    pub fn reconcile_if_current(&mut self, id: Uuid, server: T, seq: u64) -> bool {
        if !self.mutation_is_current(id, seq) {
            return false;
        }
        self.reconcile(id, server);
        true
    }

    /// Roll `id` back to the state it had in `snapshot`, unless a newer
    /// mutation has been issued for it since `seq`. Only the one row is
    /// touched; concurrent optimistic state on other ids survives.
    pub fn roll_back(&mut self, id: Uuid, snapshot: &Snapshot<T>, seq: u64) -> bool {
        if !self.mutation_is_current(id, seq) {
            return false;
        }
        let prior = snapshot.records.iter().find(|r| r.id() == id).cloned();
        match prior {
            Some(row) => match self.position(id) {
                Some(pos) => self.records[pos] = row,
                None => self.insert_sorted(row),
            },
            None => self.optimistic_delete(id),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::domain::list::{List, ListId, ListKind};
    use crate::domain::todo::{Todo, TodoId, UpdateTodo};

    fn list(name: &str, minute: u32) -> List {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap();
        List {
            id: ListId::new(),
            user_id: Uuid::new_v4(),
            name: name.to_string(),
            kind: ListKind::Task,
            color: "#3b82f6".to_string(),
            icon: "list".to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    fn todo(title: &str, minute: u32) -> Todo {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap();
        Todo {
            id: TodoId::new(),
            user_id: Uuid::new_v4(),
            list_id: None,
            title: title.to_string(),
            description: None,
            completed: false,
            priority: None,
            due_date: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn lists_order_oldest_first() {
        let mut store = RecordStore::new();
        store.optimistic_insert(list("b", 10));
        store.optimistic_insert(list("a", 5));
        store.optimistic_insert(list("c", 20));
        let names: Vec<_> = store.records().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn todos_order_newest_first() {
        let mut store = RecordStore::new();
        store.optimistic_insert(todo("old", 5));
        store.optimistic_insert(todo("new", 20));
        store.optimistic_insert(todo("mid", 10));
        let titles: Vec<_> = store.records().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["new", "mid", "old"]);
    }

    #[test]
    fn optimistic_update_merges_fields() {
        let mut store = RecordStore::new();
        let row = todo("milk", 1);
        let id = row.id.0;
        store.optimistic_insert(row);

        let patch = UpdateTodo {
            title: Some("oat milk".to_string()),
            ..UpdateTodo::default()
        };
        assert!(store.optimistic_update(id, &patch));
        assert_eq!(store.get(id).unwrap().title, "oat milk");
        assert!(!store.optimistic_update(Uuid::new_v4(), &patch));
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut store = RecordStore::new();
        let row = list("groceries", 1);
        let id = row.id.0;
        store.optimistic_insert(row.clone());

        let mut confirmed = row.clone();
        confirmed.updated_at = row.updated_at + Duration::seconds(3);
        store.reconcile(id, confirmed.clone());
        let once = store.records().to_vec();
        store.reconcile(id, confirmed);
        assert_eq!(store.records(), &once[..]);
    }

    #[test]
    fn reconcile_of_removed_row_inserts_without_duplicating() {
        let mut store = RecordStore::new();
        let row = todo("milk", 1);
        let id = row.id.0;
        store.reconcile(id, row.clone());
        store.reconcile(id, row);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reconcile_keeps_position() {
        let mut store = RecordStore::new();
        store.optimistic_insert(todo("first", 1));
        let row = todo("second", 2);
        let id = row.id.0;
        store.optimistic_insert(row.clone());
        store.optimistic_insert(todo("third", 3));

        let mut confirmed = row;
        confirmed.title = "second confirmed".to_string();
        store.reconcile(id, confirmed);
        assert_eq!(store.records()[1].title, "second confirmed");
    }

    #[test]
    fn roll_back_restores_pre_mutation_state() {
        let mut store = RecordStore::new();
        let row = todo("milk", 1);
        let id = row.id.0;
        store.optimistic_insert(row);

        let snapshot = store.snapshot();
        let before = store.records().to_vec();
        let seq = store.begin_mutation(id);
        store.optimistic_update(id, &UpdateTodo::completed(true));

        assert!(store.roll_back(id, &snapshot, seq));
        assert_eq!(store.records(), &before[..]);
    }

    #[test]
    fn roll_back_reinserts_deleted_row() {
        let mut store = RecordStore::new();
        store.optimistic_insert(todo("keep", 1));
        let row = todo("drop", 2);
        let id = row.id.0;
        store.optimistic_insert(row);

        let snapshot = store.snapshot();
        let before = store.records().to_vec();
        let seq = store.begin_mutation(id);
        store.optimistic_delete(id);

        assert!(store.roll_back(id, &snapshot, seq));
        assert_eq!(store.records(), &before[..]);
    }

    #[test]
    fn stale_roll_back_is_discarded() {
        let mut store = RecordStore::new();
        let row = todo("milk", 1);
        let id = row.id.0;
        store.optimistic_insert(row);

        // First mutation starts, then a second one lands on the same id.
        let first_snapshot = store.snapshot();
        let first = store.begin_mutation(id);
        store.optimistic_update(id, &UpdateTodo::completed(true));

        let second = store.begin_mutation(id);
        let patch = UpdateTodo {
            title: Some("renamed".to_string()),
            ..UpdateTodo::default()
        };
        store.optimistic_update(id, &patch);

        // The first mutation's rollback must not revert the second's state.
        assert!(!store.roll_back(id, &first_snapshot, first));
        assert_eq!(store.get(id).unwrap().title, "renamed");
        assert!(store.get(id).unwrap().completed);
        assert!(store.mutation_is_current(id, second));
    }

    #[test]
    fn stale_reconcile_is_discarded() {
        let mut store = RecordStore::new();
        let row = todo("milk", 1);
        let id = row.id.0;
        store.optimistic_insert(row.clone());

        let first = store.begin_mutation(id);
        store.begin_mutation(id);

        let mut server = row;
        server.title = "server copy".to_string();
        assert!(!store.reconcile_if_current(id, server, first));
        assert_eq!(store.get(id).unwrap().title, "milk");
    }

    #[test]
    fn restore_replaces_whole_collection() {
        let mut store = RecordStore::new();
        store.optimistic_insert(list("a", 1));
        let snapshot = store.snapshot();
        let before = store.records().to_vec();

        store.optimistic_insert(list("b", 2));
        store.optimistic_insert(list("c", 3));
        store.restore(snapshot);
        assert_eq!(store.records(), &before[..]);
    }
}
