use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use crate::domain::record::Record;

use super::record_store::RecordStore;

/// What the UI renders for one synchronized collection.
#[derive(Debug, Clone)]
pub struct ViewState<T> {
    pub records: Vec<T>,
    /// True only while the very first fetch of an empty collection runs;
    /// background refreshes are invisible.
    pub loading: bool,
    /// Message of the most recent failure, cleared by the next successful
    /// fetch.
    pub error: Option<String>,
}

/// Store plus the observable bits around it, shared between a synchronizer
/// and its background listeners.
///
/// Locks are only ever held for the duration of a closure, never across an
/// await point. The version channel ticks on every visible change so tests
/// and UIs can await convergence instead of polling.
pub(crate) struct SyncState<T: Record> {
    store: Mutex<RecordStore<T>>,
    loading: AtomicBool,
    error: Mutex<Option<String>>,
    version: watch::Sender<u64>,
}

impl<T: Record> SyncState<T> {
    pub(crate) fn new() -> Self {
        Self {
            store: Mutex::new(RecordStore::new()),
            loading: AtomicBool::new(false),
            error: Mutex::new(None),
            version: watch::channel(0).0,
        }
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&RecordStore<T>) -> R) -> R {
        f(&self.store.lock().expect("store poisoned"))
    }

    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut RecordStore<T>) -> R) -> R {
        let out = f(&mut self.store.lock().expect("store poisoned"));
        self.bump();
        out
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::Relaxed);
        self.bump();
    }

    pub(crate) fn set_error(&self, message: impl Into<String>) {
        *self.error.lock().expect("error poisoned") = Some(message.into());
        self.bump();
    }

    pub(crate) fn clear_error(&self) {
        *self.error.lock().expect("error poisoned") = None;
        self.bump();
    }

    pub(crate) fn view(&self) -> ViewState<T> {
        ViewState {
            records: self.read(|s| s.records().to_vec()),
            loading: self.loading.load(Ordering::Relaxed),
            error: self.error.lock().expect("error poisoned").clone(),
        }
    }

    pub(crate) fn changed(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
