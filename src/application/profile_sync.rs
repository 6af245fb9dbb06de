use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::domain::auth::AuthProvider;
use crate::domain::error::SyncError;
use crate::domain::gateway::ProfileGateway;
use crate::domain::profile::{Profile, UpdateProfile};

use super::bus::ChangeBus;

/// What the UI renders for the current user's profile.
#[derive(Debug, Clone)]
pub struct ProfileView {
    pub profile: Option<Profile>,
    pub loading: bool,
    pub error: Option<String>,
}

struct ProfileState {
    profile: Mutex<Option<Profile>>,
    loading: AtomicBool,
    error: Mutex<Option<String>>,
    version: watch::Sender<u64>,
}

impl ProfileState {
    fn new() -> Self {
        Self {
            profile: Mutex::new(None),
            loading: AtomicBool::new(false),
            error: Mutex::new(None),
            version: watch::channel(0).0,
        }
    }

    fn set_profile(&self, profile: Option<Profile>) {
        *self.profile.lock().expect("profile poisoned") = profile;
        self.bump();
    }

    fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::Relaxed);
        self.bump();
    }

    fn set_error(&self, message: String) {
        *self.error.lock().expect("error poisoned") = Some(message);
        self.bump();
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

/// Keeps the signed-in user's profile row in sync.
///
/// Simpler than the collection synchronizers: profile edits are rare and go
/// through a blocking dialog, so there is no optimistic step and no remote
/// change feed. A missing row is not an error — the view falls back to a
/// profile synthesized from auth metadata.
pub struct ProfileSync<G, A>
where
    G: ProfileGateway,
    A: AuthProvider,
{
    state: Arc<ProfileState>,
    gateway: Arc<G>,
    auth: Arc<A>,
    bus: ChangeBus,
    bus_task: JoinHandle<()>,
}

impl<G, A> ProfileSync<G, A>
where
    G: ProfileGateway,
    A: AuthProvider,
{
    pub async fn mount(gateway: Arc<G>, auth: Arc<A>, bus: ChangeBus) -> Self {
        let state = Arc::new(ProfileState::new());
        let bus_task = tokio::spawn(Self::run_bus_listener(
            bus.subscribe_profiles(),
            Arc::downgrade(&state),
            gateway.clone(),
            auth.clone(),
        ));
        let sync = Self {
            state,
            gateway,
            auth,
            bus,
            bus_task,
        };
        sync.fetch().await;
        sync
    }

    pub fn view(&self) -> ProfileView {
        ProfileView {
            profile: self.state.profile.lock().expect("profile poisoned").clone(),
            loading: self.state.loading.load(Ordering::Relaxed),
            error: self.state.error.lock().expect("error poisoned").clone(),
        }
    }

    pub fn changed(&self) -> watch::Receiver<u64> {
        self.state.version.subscribe()
    }

    pub async fn fetch(&self) {
        Self::refresh(&self.state, &self.gateway, &self.auth).await;
    }

    pub async fn update(&self, patch: UpdateProfile) -> Result<(), SyncError> {
        let Some(user) = self.auth.current_user().await else {
            self.state.set_error(SyncError::NotAuthenticated.to_string());
            return Err(SyncError::NotAuthenticated);
        };

        if let Err(err) = self.gateway.update(user.id, patch).await {
            self.state.set_error(err.to_string());
            return Err(err.into());
        }
        Self::refresh(&self.state, &self.gateway, &self.auth).await;
        self.bus.publish_profiles();
        Ok(())
    }

    async fn refresh(state: &Arc<ProfileState>, gateway: &G, auth: &A) {
        if state.profile.lock().expect("profile poisoned").is_none() {
            state.set_loading(true);
        }
        let Some(user) = auth.current_user().await else {
            state.set_profile(None);
            state.set_loading(false);
            return;
        };
        match gateway.fetch(user.id).await {
            Ok(Some(profile)) => state.set_profile(Some(profile)),
            // No row yet; synthesize one from auth metadata rather than
            // surfacing an error.
            Ok(None) => state.set_profile(Some(Profile::fallback_for(&user))),
            Err(err) => {
                tracing::warn!(error = %err, "profile fetch failed, using fallback");
                state.set_profile(Some(Profile::fallback_for(&user)));
            }
        }
        state.set_loading(false);
    }

    async fn run_bus_listener(
        mut rx: broadcast::Receiver<()>,
        state: Weak<ProfileState>,
        gateway: Arc<G>,
        auth: Arc<A>,
    ) {
        loop {
            match rx.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
            let Some(state) = state.upgrade() else { break };
            Self::refresh(&state, &gateway, &auth).await;
        }
    }
}

impl<G, A> Drop for ProfileSync<G, A>
where
    G: ProfileGateway,
    A: AuthProvider,
{
    fn drop(&mut self) {
        self.bus_task.abort();
    }
}
