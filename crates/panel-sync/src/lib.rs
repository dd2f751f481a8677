//! panel-sync: storage-mode state machine and dirty-section sync for the MCM Panel.
//!
//! This crate provides the core functionality for:
//! - The panel document (section name -> JSON value) and its import/export format
//! - Choosing the authoritative backend for a session (remote, local or offline)
//! - Tracking dirty sections and flushing them to the authoritative backend
//! - `RemoteStore` and `LocalStore` trait abstractions with in-memory implementations
//!
//! Hosts (`panel-cli`, `panel-wasm`) supply real adapters and drive the
//! controller from their own event loop.

pub mod clock;
pub mod controller;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod events;
pub mod local;
pub mod remote;
pub mod tree;

pub use controller::{
    DEFAULT_AUTOSAVE_INTERVAL, FlushPlan, FlushTarget, HEALTH_PATH, InitStep, SaveStatus,
    StorageMode, SyncConfig, SyncController, connect_root,
};
pub use dispatch::{RemoteWriteOp, SectionWrite};
pub use document::{Document, DocumentError, SectionStatus};
pub use error::{FlushError, SyncError};
pub use events::{EventBus, PanelEvent, SharedEventBus, Subscription};
pub use local::{InMemoryLocal, LocalStore, LocalStoreError, STORAGE_KEY};
pub use remote::{
    InMemoryRemote, NoRemote, RecordedWrite, RemoteError, RemoteStore, RootSubscription,
    SnapshotResult, SnapshotSender, Unsubscribe,
};
