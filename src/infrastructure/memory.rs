use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::domain::auth::{AuthProvider, AuthUser};
use crate::domain::error::RemoteError;
use crate::domain::gateway::{
    ChangeEvent, ChangeFeed, ChangeKind, ListGateway, ProfileGateway, TodoGateway,
};
use crate::domain::list::{List, ListId, UpdateList};
use crate::domain::profile::{Profile, UpdateProfile};
use crate::domain::record::Record;
use crate::domain::todo::{Todo, TodoId, TodoScope, UpdateTodo};

const EVENT_CAPACITY: usize = 64;

/// One remote operation, for scripting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchLists,
    InsertList,
    UpdateList,
    DeleteList,
    FetchTodos,
    InsertTodo,
    UpdateTodo,
    DeleteTodo,
    DeleteTodosInList,
    FetchProfile,
    UpdateProfile,
}

#[derive(Default)]
struct Tables {
    lists: HashMap<Uuid, List>,
    todos: HashMap<Uuid, Todo>,
    profiles: HashMap<Uuid, Profile>,
    failures: HashMap<RemoteOp, VecDeque<RemoteError>>,
}

/// In-process stand-in for the hosted backend: serves every gateway trait,
/// stamps server-side timestamps, and emits a change event for each write —
/// the same contract the remote service exposes, minus the network.
///
/// Failures can be scripted per operation with [`MemoryBackend::fail_next`],
/// which the tests use to drive every recovery path.
#[derive(Clone)]
pub struct MemoryBackend {
    tables: Arc<Mutex<Tables>>,
    list_events: broadcast::Sender<ChangeEvent<List>>,
    todo_events: broadcast::Sender<ChangeEvent<Todo>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            list_events: broadcast::channel(EVENT_CAPACITY).0,
            todo_events: broadcast::channel(EVENT_CAPACITY).0,
        }
    }

    /// Queue an error for the next invocation of `op`.
    pub fn fail_next(&self, op: RemoteOp, err: RemoteError) {
        self.tables
            .lock()
            .expect("tables poisoned")
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    pub fn seed_profile(&self, profile: Profile) {
        self.tables
            .lock()
            .expect("tables poisoned")
            .profiles
            .insert(profile.id, profile);
    }

    fn take_failure(tables: &mut Tables, op: RemoteOp) -> Result<(), RemoteError> {
        match tables.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn emit_list(&self, kind: ChangeKind, old: Option<List>, new: Option<List>) {
        let _ = self.list_events.send(ChangeEvent { kind, old, new });
    }

    fn emit_todo(&self, kind: ChangeKind, old: Option<Todo>, new: Option<Todo>) {
        let _ = self.todo_events.send(ChangeEvent { kind, old, new });
    }
}

/// Bridge a broadcast subscription into a `ChangeFeed`, detached from the
/// backend's own lifetime.
fn feed_from<T: Record>(mut rx: broadcast::Receiver<ChangeEvent<T>>) -> ChangeFeed<T> {
    let (tx, feed_rx) = mpsc::channel(EVENT_CAPACITY);
    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    ChangeFeed::with_closer(feed_rx, move || task.abort())
}

#[async_trait]
impl ListGateway for MemoryBackend {
    async fn fetch_all(&self) -> Result<Vec<List>, RemoteError> {
        let mut tables = self.tables.lock().expect("tables poisoned");
        Self::take_failure(&mut tables, RemoteOp::FetchLists)?;
        let mut rows: Vec<List> = tables.lists.values().cloned().collect();
        rows.sort_by_key(|l| l.created_at);
        Ok(rows)
    }

    async fn insert(&self, mut row: List) -> Result<List, RemoteError> {
        let stored = {
            let mut tables = self.tables.lock().expect("tables poisoned");
            Self::take_failure(&mut tables, RemoteOp::InsertList)?;
            if tables.lists.contains_key(&row.id.0) {
                return Err(RemoteError::Constraint(format!(
                    "duplicate list id {}",
                    row.id
                )));
            }
            if row.name.trim().is_empty() {
                return Err(RemoteError::Constraint("list name must not be empty".into()));
            }
            // Server timestamps are authoritative.
            let now = Utc::now();
            row.created_at = now;
            row.updated_at = now;
            tables.lists.insert(row.id.0, row.clone());
            row
        };
        self.emit_list(ChangeKind::Insert, None, Some(stored.clone()));
        Ok(stored)
    }

    async fn update(&self, id: ListId, patch: UpdateList) -> Result<List, RemoteError> {
        let (old, stored) = {
            let mut tables = self.tables.lock().expect("tables poisoned");
            Self::take_failure(&mut tables, RemoteOp::UpdateList)?;
            let row = tables
                .lists
                .get_mut(&id.0)
                .ok_or(RemoteError::NotFound(id.0))?;
            let old = row.clone();
            row.apply_patch(&patch);
            row.updated_at = Utc::now();
            (old, row.clone())
        };
        self.emit_list(ChangeKind::Update, Some(old), Some(stored.clone()));
        Ok(stored)
    }

    async fn delete(&self, id: ListId) -> Result<(), RemoteError> {
        let old = {
            let mut tables = self.tables.lock().expect("tables poisoned");
            Self::take_failure(&mut tables, RemoteOp::DeleteList)?;
            tables
                .lists
                .remove(&id.0)
                .ok_or(RemoteError::NotFound(id.0))?
        };
        self.emit_list(ChangeKind::Delete, Some(old), None);
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeFeed<List>, RemoteError> {
        Ok(feed_from(self.list_events.subscribe()))
    }
}

#[async_trait]
impl TodoGateway for MemoryBackend {
    async fn fetch_all(&self, scope: TodoScope) -> Result<Vec<Todo>, RemoteError> {
        let mut tables = self.tables.lock().expect("tables poisoned");
        Self::take_failure(&mut tables, RemoteOp::FetchTodos)?;
        let mut rows: Vec<Todo> = tables
            .todos
            .values()
            .filter(|t| scope.matches(t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(&self, mut row: Todo) -> Result<Todo, RemoteError> {
        let stored = {
            let mut tables = self.tables.lock().expect("tables poisoned");
            Self::take_failure(&mut tables, RemoteOp::InsertTodo)?;
            if tables.todos.contains_key(&row.id.0) {
                return Err(RemoteError::Constraint(format!(
                    "duplicate todo id {}",
                    row.id
                )));
            }
            if row.title.trim().is_empty() {
                return Err(RemoteError::Constraint("todo title must not be empty".into()));
            }
            if let Some(list_id) = row.list_id {
                if !tables.lists.contains_key(&list_id.0) {
                    return Err(RemoteError::Constraint(format!(
                        "todo references missing list {list_id}"
                    )));
                }
            }
            let now = Utc::now();
            row.created_at = now;
            row.updated_at = now;
            tables.todos.insert(row.id.0, row.clone());
            row
        };
        self.emit_todo(ChangeKind::Insert, None, Some(stored.clone()));
        Ok(stored)
    }

    async fn update(&self, id: TodoId, patch: UpdateTodo) -> Result<Todo, RemoteError> {
        let (old, stored) = {
            let mut tables = self.tables.lock().expect("tables poisoned");
            Self::take_failure(&mut tables, RemoteOp::UpdateTodo)?;
            let row = tables
                .todos
                .get_mut(&id.0)
                .ok_or(RemoteError::NotFound(id.0))?;
            if matches!(&patch.title, Some(t) if t.trim().is_empty()) {
                return Err(RemoteError::Constraint("todo title must not be empty".into()));
            }
            let old = row.clone();
            row.apply_patch(&patch);
            row.updated_at = Utc::now();
            (old, row.clone())
        };
        self.emit_todo(ChangeKind::Update, Some(old), Some(stored.clone()));
        Ok(stored)
    }

    async fn delete(&self, id: TodoId) -> Result<(), RemoteError> {
        let old = {
            let mut tables = self.tables.lock().expect("tables poisoned");
            Self::take_failure(&mut tables, RemoteOp::DeleteTodo)?;
            tables
                .todos
                .remove(&id.0)
                .ok_or(RemoteError::NotFound(id.0))?
        };
        self.emit_todo(ChangeKind::Delete, Some(old), None);
        Ok(())
    }

    async fn delete_in_list(&self, list_id: ListId) -> Result<(), RemoteError> {
        let removed = {
            let mut tables = self.tables.lock().expect("tables poisoned");
            Self::take_failure(&mut tables, RemoteOp::DeleteTodosInList)?;
            let doomed: Vec<Uuid> = tables
                .todos
                .values()
                .filter(|t| t.list_id == Some(list_id))
                .map(|t| t.id.0)
                .collect();
            doomed
                .into_iter()
                .filter_map(|id| tables.todos.remove(&id))
                .collect::<Vec<_>>()
        };
        for old in removed {
            self.emit_todo(ChangeKind::Delete, Some(old), None);
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeFeed<Todo>, RemoteError> {
        Ok(feed_from(self.todo_events.subscribe()))
    }
}

#[async_trait]
impl ProfileGateway for MemoryBackend {
    async fn fetch(&self, user_id: Uuid) -> Result<Option<Profile>, RemoteError> {
        let mut tables = self.tables.lock().expect("tables poisoned");
        Self::take_failure(&mut tables, RemoteOp::FetchProfile)?;
        Ok(tables.profiles.get(&user_id).cloned())
    }

    async fn update(&self, user_id: Uuid, patch: UpdateProfile) -> Result<Profile, RemoteError> {
        let mut tables = self.tables.lock().expect("tables poisoned");
        Self::take_failure(&mut tables, RemoteOp::UpdateProfile)?;
        let row = tables
            .profiles
            .get_mut(&user_id)
            .ok_or(RemoteError::NotFound(user_id))?;
        if let Some(full_name) = patch.full_name {
            row.full_name = full_name;
        }
        if let Some(display_name) = patch.display_name {
            row.display_name = display_name;
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

/// Fixed-session auth for the demo and the tests.
pub struct StaticAuth {
    user: Option<AuthUser>,
}

impl StaticAuth {
    pub fn signed_in(user: AuthUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn signed_out() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_user(&self) -> Option<AuthUser> {
        self.user.clone()
    }
}
