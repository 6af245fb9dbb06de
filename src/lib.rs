//! Client-side optimistic synchronization core for a multi-user todo
//! service.
//!
//! All persistence lives in a hosted backend; this crate owns the in-memory
//! view of it. Every mutation is applied locally before the network round
//! trip, reconciled with the server-confirmed row on success and rolled back
//! on failure, while a per-table change subscription and an in-process bus
//! keep independently mounted views converged.
//!
//! # Modules
//!
//! - `domain`: entity types, gateway/auth traits, error taxonomy
//! - `application`: record store, change bus, synchronizers
//! - `infrastructure`: in-memory backend, hosted-backend REST/realtime gateway

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bus::ChangeBus;
pub use application::list_sync::ListSync;
pub use application::profile_sync::{ProfileSync, ProfileView};
pub use application::record_store::{RecordStore, Snapshot};
pub use application::sync_state::ViewState;
pub use application::todo_sync::TodoSync;
pub use domain::error::{RemoteError, SyncError};
