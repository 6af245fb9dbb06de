use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 16;

/// In-process pub/sub keeping independently mounted synchronizer instances
/// converged: a mutation confirmed in one UI region broadcasts a payload-free
/// "re-check your data" signal that makes every sibling instance re-fetch,
/// ahead of the slower round trip through the remote change subscription.
///
/// Constructed once at application start and cloned into each synchronizer;
/// deliberately an injectable object rather than process-global state.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    lists: broadcast::Sender<()>,
    todos: broadcast::Sender<()>,
    profiles: broadcast::Sender<()>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self {
            lists: broadcast::channel(CHANNEL_CAPACITY).0,
            todos: broadcast::channel(CHANNEL_CAPACITY).0,
            profiles: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn publish_lists(&self) {
        let _ = self.lists.send(());
    }

    pub fn subscribe_lists(&self) -> broadcast::Receiver<()> {
        self.lists.subscribe()
    }

    pub fn publish_todos(&self) {
        let _ = self.todos.send(());
    }

    pub fn subscribe_todos(&self) -> broadcast::Receiver<()> {
        self.todos.subscribe()
    }

    pub fn publish_profiles(&self) {
        let _ = self.profiles.send(());
    }

    pub fn subscribe_profiles(&self) -> broadcast::Receiver<()> {
        self.profiles.subscribe()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
