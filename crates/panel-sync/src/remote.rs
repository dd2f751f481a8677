//! RemoteStore trait abstraction for the realtime database.
//!
//! Implementations:
//! - `InMemoryRemote` - For testing
//! - `FirebaseRemote` (in panel-cli) - Realtime Database REST + Server-Sent Events
//! - `JsRemoteBridge` (in panel-wasm) - Firebase JS SDK via JS callbacks
//!
//! The adapter only moves data. Retry policy belongs to the controller.
//!
//! Uses `target_arch = "wasm32"` for conditional compilation instead of feature flags
//! to avoid Cargo's feature unification issues when building the workspace.

use crate::document::Document;
use crate::tree;
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("Remote database not configured")]
    NotConfigured,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Subscription closed before delivering data")]
    SubscriptionClosed,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// One item of a root subscription: a full snapshot or a subscription error.
pub type SnapshotResult = std::result::Result<Document, RemoteError>;

/// Sending half handed to adapters that feed a `RootSubscription`.
pub type SnapshotSender = mpsc::UnboundedSender<SnapshotResult>;

/// Teardown hook run when a subscription is dropped.
#[cfg(not(target_arch = "wasm32"))]
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Teardown hook run when a subscription is dropped.
#[cfg(target_arch = "wasm32")]
pub type Unsubscribe = Box<dyn FnOnce()>;

/// Live subscription to the remote root.
///
/// A `Stream` of full root snapshots: the first item arrives on connect,
/// then one per remote change (including changes made by other writers).
/// Dropping the subscription runs the adapter's teardown hook, which
/// releases the underlying connection.
pub struct RootSubscription {
    rx: mpsc::UnboundedReceiver<SnapshotResult>,
    unsubscribe: Option<Unsubscribe>,
}

impl RootSubscription {
    /// Create the channel pair for a new subscription.
    pub fn channel() -> (SnapshotSender, mpsc::UnboundedReceiver<SnapshotResult>) {
        mpsc::unbounded()
    }

    pub fn new(rx: mpsc::UnboundedReceiver<SnapshotResult>, unsubscribe: Unsubscribe) -> Self {
        Self {
            rx,
            unsubscribe: Some(unsubscribe),
        }
    }

    /// A subscription with nothing to tear down.
    pub fn detached(rx: mpsc::UnboundedReceiver<SnapshotResult>) -> Self {
        Self {
            rx,
            unsubscribe: None,
        }
    }

    /// Wait for the first snapshot.
    ///
    /// An error item or a stream that ends before any data counts as a
    /// failed connection.
    pub async fn first_snapshot(&mut self) -> Result<Document> {
        match self.next().await {
            Some(Ok(doc)) => Ok(doc),
            Some(Err(e)) => Err(e),
            None => Err(RemoteError::SubscriptionClosed),
        }
    }
}

impl Stream for RootSubscription {
    type Item = SnapshotResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_next_unpin(cx)
    }
}

impl Drop for RootSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

/// Path-addressed realtime database.
///
/// On native platforms, implementations must be `Send + Sync` for use across threads.
/// On WASM (wasm32), these bounds are relaxed since WASM is single-threaded.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg(not(target_arch = "wasm32"))]
pub trait RemoteStore: Send + Sync {
    /// Subscribe to the root of the tree.
    async fn subscribe_root(&self) -> Result<RootSubscription>;

    /// Replace the subtree at `path` (e.g. `/albums`) with `value`.
    async fn write_subtree(&self, path: &str, value: &Value) -> Result<()>;
}

/// Path-addressed realtime database (WASM version without Send + Sync).
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg(target_arch = "wasm32")]
pub trait RemoteStore {
    /// Subscribe to the root of the tree.
    async fn subscribe_root(&self) -> Result<RootSubscription>;

    /// Replace the subtree at `path` (e.g. `/albums`) with `value`.
    async fn write_subtree(&self, path: &str, value: &Value) -> Result<()>;
}

/// Placeholder for sessions without remote connectivity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemote;

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl RemoteStore for NoRemote {
    async fn subscribe_root(&self) -> Result<RootSubscription> {
        Err(RemoteError::NotConfigured)
    }

    async fn write_subtree(&self, _path: &str, _value: &Value) -> Result<()> {
        Err(RemoteError::NotConfigured)
    }
}

/// A write recorded by `InMemoryRemote`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub path: String,
    pub value: Value,
}

#[derive(Default)]
struct RemoteTree {
    root: Value,
    subscribers: Vec<(usize, SnapshotSender)>,
    next_id: usize,
    writes: Vec<RecordedWrite>,
    connect_error: Option<String>,
    write_error: Option<String>,
}

impl RemoteTree {
    fn broadcast(&mut self) {
        let snapshot = Document::from_remote_value(self.root.clone());
        self.subscribers
            .retain(|(_, tx)| tx.unbounded_send(Ok(snapshot.clone())).is_ok());
    }
}

/// In-memory realtime database for testing.
///
/// Clones share the same tree, so a test can keep a handle for inspection
/// while the controller owns another.
#[derive(Clone, Default)]
pub struct InMemoryRemote {
    inner: Arc<Mutex<RemoteTree>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing tree.
    pub fn with_root(doc: &Document) -> Self {
        let remote = Self::new();
        remote.lock().root = doc.to_value();
        remote
    }

    fn lock(&self) -> MutexGuard<'_, RemoteTree> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current tree as a document.
    pub fn root(&self) -> Document {
        Document::from_remote_value(self.lock().root.clone())
    }

    pub fn value_at(&self, path: &str) -> Option<Value> {
        tree::get_at(&self.lock().root, path).cloned()
    }

    /// Writes made through `write_subtree`, in order.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Make `subscribe_root` fail (unreachable host, bad credentials).
    pub fn set_connect_error(&self, error: Option<&str>) {
        self.lock().connect_error = error.map(str::to_string);
    }

    /// Make `write_subtree` fail (rules rejection, network drop).
    pub fn set_write_error(&self, error: Option<&str>) {
        self.lock().write_error = error.map(str::to_string);
    }

    /// A write by another client; notifies subscribers but is not recorded.
    pub fn external_write(&self, path: &str, value: Value) {
        let mut state = self.lock();
        tree::set_at(&mut state.root, path, value);
        state.broadcast();
    }

    /// Deliver an error to every open subscription and close them.
    pub fn fail_subscriptions(&self, message: &str) {
        let mut state = self.lock();
        for (_, tx) in state.subscribers.drain(..) {
            let _ = tx.unbounded_send(Err(RemoteError::PermissionDenied(message.to_string())));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn subscribe_now(&self) -> Result<RootSubscription> {
        let mut state = self.lock();
        if let Some(error) = &state.connect_error {
            return Err(RemoteError::ConnectionFailed(error.clone()));
        }

        let (tx, rx) = RootSubscription::channel();
        let snapshot = Document::from_remote_value(state.root.clone());
        let _ = tx.unbounded_send(Ok(snapshot));

        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.push((id, tx));
        debug!("In-memory remote: subscriber {} attached", id);

        let weak: Weak<Mutex<RemoteTree>> = Arc::downgrade(&self.inner);
        Ok(RootSubscription::new(
            rx,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut state = inner.lock().unwrap_or_else(|e| e.into_inner());
                    state.subscribers.retain(|(i, _)| *i != id);
                }
            }),
        ))
    }

    fn write_now(&self, path: &str, value: &Value) -> Result<()> {
        let mut state = self.lock();
        if let Some(error) = &state.write_error {
            return Err(RemoteError::WriteFailed(error.clone()));
        }
        tree::set_at(&mut state.root, path, value.clone());
        state.writes.push(RecordedWrite {
            path: path.to_string(),
            value: value.clone(),
        });
        state.broadcast();
        Ok(())
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl RemoteStore for InMemoryRemote {
    async fn subscribe_root(&self) -> Result<RootSubscription> {
        self.subscribe_now()
    }

    async fn write_subtree(&self, path: &str, value: &Value) -> Result<()> {
        self.write_now(path, value)
    }
}
