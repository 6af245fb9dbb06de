use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::RemoteError;
use super::list::{List, ListId, UpdateList};
use super::profile::{Profile, UpdateProfile};
use super::todo::{Todo, TodoId, TodoScope, UpdateTodo};

/// What happened to a row, as reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One push notification from the remote change subscription.
///
/// Row images are advisory: they are inspected for scope filtering and never
/// merged into local state. The only safe reaction to an event is a
/// re-fetch — the transport guarantees neither ordering nor exactly-once
/// delivery relative to this client's own writes.
#[derive(Debug, Clone)]
pub struct ChangeEvent<T> {
    pub kind: ChangeKind,
    pub old: Option<T>,
    pub new: Option<T>,
}

/// Live change subscription for one table. Dropping the feed (or calling
/// [`ChangeFeed::close`]) stops delivery and releases the push channel.
pub struct ChangeFeed<T> {
    rx: mpsc::Receiver<ChangeEvent<T>>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> ChangeFeed<T> {
    pub fn new(rx: mpsc::Receiver<ChangeEvent<T>>) -> Self {
        Self { rx, on_close: None }
    }

    /// A feed that runs `closer` once delivery should stop.
    pub fn with_closer(
        rx: mpsc::Receiver<ChangeEvent<T>>,
        closer: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            on_close: Some(Box::new(closer)),
        }
    }

    /// Next event; `None` once the remote side has gone away.
    pub async fn next(&mut self) -> Option<ChangeEvent<T>> {
        self.rx.recv().await
    }

    pub fn close(self) {}
}

impl<T> Drop for ChangeFeed<T> {
    fn drop(&mut self) {
        if let Some(closer) = self.on_close.take() {
            closer();
        }
    }
}

/// Remote operations on the lists table. The sole point of contact with the
/// backend for this entity; "no rows" is an empty `Vec`, never an error.
#[async_trait]
pub trait ListGateway: Send + Sync + 'static {
    async fn fetch_all(&self) -> Result<Vec<List>, RemoteError>;
    /// The payload carries the client-chosen id; the server echoes the full
    /// stored row, whose timestamps are authoritative.
    async fn insert(&self, row: List) -> Result<List, RemoteError>;
    async fn update(&self, id: ListId, patch: UpdateList) -> Result<List, RemoteError>;
    /// Deleting a missing id is an error, not a silent success.
    async fn delete(&self, id: ListId) -> Result<(), RemoteError>;
    async fn subscribe(&self) -> Result<ChangeFeed<List>, RemoteError>;
}

/// Remote operations on the todos table.
#[async_trait]
pub trait TodoGateway: Send + Sync + 'static {
    async fn fetch_all(&self, scope: TodoScope) -> Result<Vec<Todo>, RemoteError>;
    async fn insert(&self, row: Todo) -> Result<Todo, RemoteError>;
    async fn update(&self, id: TodoId, patch: UpdateTodo) -> Result<Todo, RemoteError>;
    async fn delete(&self, id: TodoId) -> Result<(), RemoteError>;
    /// Remove every todo filed under `list_id`. Runs ahead of a list delete
    /// so a failure leaves no orphans.
    async fn delete_in_list(&self, list_id: ListId) -> Result<(), RemoteError>;
    async fn subscribe(&self) -> Result<ChangeFeed<Todo>, RemoteError>;
}

/// Remote operations on the profiles table.
#[async_trait]
pub trait ProfileGateway: Send + Sync + 'static {
    /// `Ok(None)` when the user has no profile row yet.
    async fn fetch(&self, user_id: Uuid) -> Result<Option<Profile>, RemoteError>;
    async fn update(&self, user_id: Uuid, patch: UpdateProfile) -> Result<Profile, RemoteError>;
}
