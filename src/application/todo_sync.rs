use std::sync::{Arc, Weak};

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::domain::auth::AuthProvider;
use crate::domain::error::SyncError;
use crate::domain::gateway::{ChangeFeed, TodoGateway};
use crate::domain::todo::{CreateTodo, Todo, TodoId, TodoScope, UpdateTodo};

use super::bus::ChangeBus;
use super::sync_state::{SyncState, ViewState};

/// Owns the client-side view of one slice of the todos collection.
///
/// The scope fixes which rows are fetched and which remote change events are
/// acted on; it is set at mount time, and a view that switches lists mounts
/// a fresh instance. Mutation semantics mirror [`ListSync`]: optimistic
/// apply, reconcile on success, sequence-gated rollback on failure.
///
/// [`ListSync`]: super::list_sync::ListSync
pub struct TodoSync<G, A>
where
    G: TodoGateway,
    A: AuthProvider,
{
    scope: TodoScope,
    state: Arc<SyncState<Todo>>,
    gateway: Arc<G>,
    auth: Arc<A>,
    bus: ChangeBus,
    bus_task: JoinHandle<()>,
    feed_task: JoinHandle<()>,
}

impl<G, A> TodoSync<G, A>
where
    G: TodoGateway,
    A: AuthProvider,
{
    pub async fn mount(
        gateway: Arc<G>,
        auth: Arc<A>,
        bus: ChangeBus,
        scope: TodoScope,
    ) -> Result<Self, SyncError> {
        let state = Arc::new(SyncState::new());
        let feed = gateway.subscribe().await?;

        let bus_task = tokio::spawn(Self::run_bus_listener(
            bus.subscribe_todos(),
            Arc::downgrade(&state),
            gateway.clone(),
            scope,
        ));
        let feed_task = tokio::spawn(Self::run_feed(
            feed,
            Arc::downgrade(&state),
            gateway.clone(),
            scope,
        ));

        let sync = Self {
            scope,
            state,
            gateway,
            auth,
            bus,
            bus_task,
            feed_task,
        };
        let _ = sync.fetch_all().await;
        Ok(sync)
    }

    pub fn scope(&self) -> TodoScope {
        self.scope
    }

    /// Current `{records, loading, error}` as rendered by the UI.
    pub fn view(&self) -> ViewState<Todo> {
        self.state.view()
    }

    /// Ticks whenever the view changes; lets callers await convergence.
    pub fn changed(&self) -> watch::Receiver<u64> {
        self.state.changed()
    }

    /// Repopulate the store from the gateway. Concurrent calls are not
    /// coalesced.
    pub async fn fetch_all(&self) -> Result<(), SyncError> {
        Self::refresh(&self.state, &self.gateway, self.scope).await
    }

    pub async fn add(&self, input: CreateTodo) -> Result<Todo, SyncError> {
        let Some(user) = self.auth.current_user().await else {
            self.state.set_error(SyncError::NotAuthenticated.to_string());
            return Err(SyncError::NotAuthenticated);
        };

        let input = input.normalized();
        let now = Utc::now();
        let row = Todo {
            id: TodoId::new(),
            user_id: user.id,
            list_id: input.list.map(|l| l.id),
            title: input.title,
            description: input.description,
            completed: false,
            priority: input.priority,
            due_date: input.due_date,
            created_at: now,
            updated_at: now,
        };
        let id = row.id;
        let seq = self.state.mutate(|s| {
            s.optimistic_insert(row.clone());
            s.begin_mutation(id.0)
        });

        match self.gateway.insert(row).await {
            Ok(confirmed) => {
                self.state
                    .mutate(|s| s.reconcile_if_current(id.0, confirmed.clone(), seq));
                self.bus.publish_todos();
                Ok(confirmed)
            }
            Err(err) => {
                // No stable snapshot exists for an insert; a full refresh
                // discards the optimistic row.
                tracing::warn!(%id, error = %err, "todo insert failed");
                let _ = Self::refresh(&self.state, &self.gateway, self.scope).await;
                self.state.set_error(err.to_string());
                Err(err.into())
            }
        }
    }

    pub async fn update(&self, id: TodoId, patch: UpdateTodo) -> Result<Todo, SyncError> {
        let (snapshot, seq) = self.state.mutate(|s| {
            let snapshot = s.snapshot();
            s.optimistic_update(id.0, &patch);
            (snapshot, s.begin_mutation(id.0))
        });

        match self.gateway.update(id, patch).await {
            Ok(confirmed) => {
                self.state
                    .mutate(|s| s.reconcile_if_current(id.0, confirmed.clone(), seq));
                self.bus.publish_todos();
                Ok(confirmed)
            }
            Err(err) => {
                tracing::warn!(%id, error = %err, "todo update failed, rolling back");
                self.state.mutate(|s| s.roll_back(id.0, &snapshot, seq));
                self.state.set_error(err.to_string());
                Err(err.into())
            }
        }
    }

    pub async fn delete(&self, id: TodoId) -> Result<(), SyncError> {
        let (snapshot, seq) = self.state.mutate(|s| {
            let snapshot = s.snapshot();
            s.optimistic_delete(id.0);
            (snapshot, s.begin_mutation(id.0))
        });

        match self.gateway.delete(id).await {
            Ok(()) => {
                self.bus.publish_todos();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%id, error = %err, "todo delete failed, rolling back");
                self.state.mutate(|s| s.roll_back(id.0, &snapshot, seq));
                self.state.set_error(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Flip the completion flag. The flip is applied ahead of the generic
    /// update so the checkbox reacts with zero perceived latency; a failure
    /// converges through a full re-fetch.
    pub async fn toggle_completed(&self, id: TodoId, completed: bool) -> Result<Todo, SyncError> {
        let flip = UpdateTodo::completed(completed);
        self.state.mutate(|s| s.optimistic_update(id.0, &flip));

        match self.update(id, flip).await {
            Ok(confirmed) => Ok(confirmed),
            Err(err) => {
                let _ = Self::refresh(&self.state, &self.gateway, self.scope).await;
                self.state.set_error(err.to_string());
                Err(err)
            }
        }
    }

    /// Tear down the bus listener and the remote change feed. Dropping the
    /// synchronizer does the same.
    pub fn unmount(self) {}

    async fn refresh(
        state: &Arc<SyncState<Todo>>,
        gateway: &G,
        scope: TodoScope,
    ) -> Result<(), SyncError> {
        if state.read(|s| s.is_empty()) {
            state.set_loading(true);
        }
        match gateway.fetch_all(scope).await {
            Ok(rows) => {
                tracing::debug!(count = rows.len(), ?scope, "fetched todos");
                state.mutate(|s| s.replace_all(rows));
                state.clear_error();
                state.set_loading(false);
                Ok(())
            }
            Err(err) => {
                state.set_loading(false);
                state.set_error(err.to_string());
                Err(err.into())
            }
        }
    }

    async fn run_bus_listener(
        mut rx: broadcast::Receiver<()>,
        state: Weak<SyncState<Todo>>,
        gateway: Arc<G>,
        scope: TodoScope,
    ) {
        loop {
            match rx.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
            let Some(state) = state.upgrade() else { break };
            let _ = Self::refresh(&state, &gateway, scope).await;
        }
    }

    async fn run_feed(
        mut feed: ChangeFeed<Todo>,
        state: Weak<SyncState<Todo>>,
        gateway: Arc<G>,
        scope: TodoScope,
    ) {
        while let Some(event) = feed.next().await {
            if !scope.is_relevant(&event) {
                continue;
            }
            let Some(state) = state.upgrade() else { break };
            let _ = Self::refresh(&state, &gateway, scope).await;
        }
    }
}

impl<G, A> Drop for TodoSync<G, A>
where
    G: TodoGateway,
    A: AuthProvider,
{
    fn drop(&mut self) {
        self.bus_task.abort();
        self.feed_task.abort();
    }
}
