use std::sync::{Arc, Weak};

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::domain::auth::AuthProvider;
use crate::domain::error::SyncError;
use crate::domain::gateway::{ChangeFeed, ListGateway, TodoGateway};
use crate::domain::list::{CreateList, DEFAULT_COLOR, DEFAULT_ICON, List, ListId, UpdateList};

use super::bus::ChangeBus;
use super::sync_state::{SyncState, ViewState};

/// Owns the client-side view of the lists collection.
///
/// Every mutation lands in the local store immediately and is reconciled
/// with (or rolled back from) the server response afterwards. Mounting wires
/// an initial fetch, a bus listener and the remote change feed; dropping the
/// synchronizer tears all of them down.
pub struct ListSync<G, TG, A>
where
    G: ListGateway,
    TG: TodoGateway,
    A: AuthProvider,
{
    state: Arc<SyncState<List>>,
    gateway: Arc<G>,
    todos: Arc<TG>,
    auth: Arc<A>,
    bus: ChangeBus,
    bus_task: JoinHandle<()>,
    feed_task: JoinHandle<()>,
}

impl<G, TG, A> ListSync<G, TG, A>
where
    G: ListGateway,
    TG: TodoGateway,
    A: AuthProvider,
{
    pub async fn mount(
        gateway: Arc<G>,
        todos: Arc<TG>,
        auth: Arc<A>,
        bus: ChangeBus,
    ) -> Result<Self, SyncError> {
        let state = Arc::new(SyncState::new());
        let feed = gateway.subscribe().await?;

        let bus_task = tokio::spawn(Self::run_bus_listener(
            bus.subscribe_lists(),
            Arc::downgrade(&state),
            gateway.clone(),
        ));
        let feed_task = tokio::spawn(Self::run_feed(
            feed,
            Arc::downgrade(&state),
            gateway.clone(),
        ));

        let sync = Self {
            state,
            gateway,
            todos,
            auth,
            bus,
            bus_task,
            feed_task,
        };
        let _ = sync.fetch_all().await;
        Ok(sync)
    }

    /// Current `{records, loading, error}` as rendered by the UI.
    pub fn view(&self) -> ViewState<List> {
        self.state.view()
    }

    /// Ticks whenever the view changes; lets callers await convergence.
    pub fn changed(&self) -> watch::Receiver<u64> {
        self.state.changed()
    }

    /// Repopulate the store from the gateway. Concurrent calls are not
    /// coalesced.
    pub async fn fetch_all(&self) -> Result<(), SyncError> {
        Self::refresh(&self.state, &self.gateway).await
    }

    pub async fn add(&self, input: CreateList) -> Result<List, SyncError> {
        let Some(user) = self.auth.current_user().await else {
            self.state.set_error(SyncError::NotAuthenticated.to_string());
            return Err(SyncError::NotAuthenticated);
        };

        let now = Utc::now();
        let row = List {
            id: ListId::new(),
            user_id: user.id,
            name: input.name,
            kind: input.kind,
            color: input.color.unwrap_or_else(|| DEFAULT_COLOR.to_owned()),
            icon: input.icon.unwrap_or_else(|| DEFAULT_ICON.to_owned()),
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
                self.bus.publish_lists();
                Ok(confirmed)
            }
            Err(err) => {
                // No stable snapshot exists for an insert; a full refresh
                // discards the optimistic row.
                tracing::warn!(%id, error = %err, "list insert failed");
                let _ = Self::refresh(&self.state, &self.gateway).await;
                self.state.set_error(err.to_string());
                Err(err.into())
            }
        }
    }

    pub async fn update(&self, id: ListId, patch: UpdateList) -> Result<List, SyncError> {
        let (snapshot, seq) = self.state.mutate(|s| {
            let snapshot = s.snapshot();
            s.optimistic_update(id.0, &patch);
            (snapshot, s.begin_mutation(id.0))
        });

        match self.gateway.update(id, patch).await {
            Ok(confirmed) => {
                self.state
                    .mutate(|s| s.reconcile_if_current(id.0, confirmed.clone(), seq));
                self.bus.publish_lists();
                Ok(confirmed)
            }
            Err(err) => {
                tracing::warn!(%id, error = %err, "list update failed, rolling back");
                self.state.mutate(|s| s.roll_back(id.0, &snapshot, seq));
                self.state.set_error(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Delete a list and everything filed under it. Dependent todos are
    /// removed remotely first: if that fails the list delete is never
    /// attempted, so a partial failure cannot orphan todos.
    pub async fn delete(&self, id: ListId) -> Result<(), SyncError> {
        let (snapshot, seq) = self.state.mutate(|s| {
            let snapshot = s.snapshot();
            s.optimistic_delete(id.0);
            (snapshot, s.begin_mutation(id.0))
        });

        if let Err(source) = self.todos.delete_in_list(id).await {
            tracing::warn!(%id, error = %source, "todo cascade failed, keeping list");
            self.state.mutate(|s| s.roll_back(id.0, &snapshot, seq));
            let err = SyncError::CascadeDelete {
                list_id: id.0,
                source,
            };
            self.state.set_error(err.to_string());
            return Err(err);
        }

        match self.gateway.delete(id).await {
            Ok(()) => {
                self.bus.publish_lists();
                self.bus.publish_todos();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%id, error = %err, "list delete failed, rolling back");
                self.state.mutate(|s| s.roll_back(id.0, &snapshot, seq));
                self.state.set_error(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Tear down the bus listener and the remote change feed. Dropping the
    /// synchronizer does the same.
    pub fn unmount(self) {}

    async fn refresh(state: &Arc<SyncState<List>>, gateway: &G) -> Result<(), SyncError> {
        // Loading is surfaced only while the collection is empty, so a
        // background refresh never flickers an already-rendered view.
        if state.read(|s| s.is_empty()) {
            state.set_loading(true);
        }
        match gateway.fetch_all().await {
            Ok(rows) => {
                tracing::debug!(count = rows.len(), "fetched lists");
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
        state: Weak<SyncState<List>>,
        gateway: Arc<G>,
    ) {
        loop {
            match rx.recv().await {
                // A lagged receiver missed some signals; one refresh
                // covers them all.
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
            let Some(state) = state.upgrade() else { break };
            let _ = Self::refresh(&state, &gateway).await;
        }
    }

    async fn run_feed(
        mut feed: ChangeFeed<List>,
        state: Weak<SyncState<List>>,
        gateway: Arc<G>,
    ) {
        while let Some(_event) = feed.next().await {
            let Some(state) = state.upgrade() else { break };
            let _ = Self::refresh(&state, &gateway).await;
        }
    }
}

impl<G, TG, A> Drop for ListSync<G, TG, A>
where
    G: ListGateway,
    TG: TodoGateway,
    A: AuthProvider,
{
    fn drop(&mut self) {
        self.bus_task.abort();
        // Aborting the feed task drops the feed, which closes the remote
        // subscription.
        self.feed_task.abort();
    }
}
