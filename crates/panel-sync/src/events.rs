//! Event infrastructure for panel-sync.
//!
//! `PanelEvent` is what the UI shows the user: the storage mode badge, the
//! save indicator and error toasts. The controller owns a `SharedEventBus`;
//! hosts subscribe and keep the returned `Subscription` alive for as long as
//! they want events. Native hosts get an `Arc`/`RwLock` bus, the browser
//! build an `Rc`/`RefCell` one.

use crate::controller::{SaveStatus, StorageMode};
use serde::Serialize;

/// Events emitted by the sync controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PanelEvent {
    /// The session's storage backend was chosen (or switched by an import).
    ModeSelected {
        mode: StorageMode,
        /// Milliseconds since Unix epoch.
        timestamp: f64,
    },
    /// A section editor submitted a new value.
    SectionUpdated {
        section: String,
        timestamp: f64,
    },
    /// Save indicator changed.
    SaveStatusChanged {
        status: SaveStatus,
        timestamp: f64,
    },
    /// A flush failed; pending sections are kept for retry.
    FlushFailed {
        /// "remote", "local" or "offline".
        backend: String,
        message: String,
        timestamp: f64,
    },
    /// A document was imported from a file.
    DocumentImported {
        sections: usize,
        timestamp: f64,
    },
    /// A remote snapshot replaced the in-memory document.
    RemoteSnapshotApplied {
        sections: usize,
        /// Sections with unsaved local edits that the snapshot overwrote.
        #[serde(rename = "overwrittenDirty")]
        overwritten_dirty: Vec<String>,
        timestamp: f64,
    },
    /// The remote subscription reported an error after initialization.
    RemoteError {
        message: String,
        timestamp: f64,
    },
}

// ---------- native ----------

#[cfg(not(target_arch = "wasm32"))]
mod platform {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, RwLock, Weak};

    pub type SharedEventBus = Arc<EventBus>;

    /// Registered listener; dropping it removes the callback.
    pub struct Subscription {
        bus: Weak<EventBus>,
        id: usize,
    }

    impl Drop for Subscription {
        fn drop(&mut self) {
            if let Some(bus) = self.bus.upgrade() {
                bus.unsubscribe(self.id);
            }
        }
    }

    /// Fan-out of `PanelEvent`s to listeners on any thread.
    pub struct EventBus {
        callbacks: RwLock<Vec<(usize, Arc<dyn Fn(PanelEvent) + Send + Sync>)>>,
        next_id: AtomicUsize,
    }

    impl Default for EventBus {
        fn default() -> Self {
            Self {
                callbacks: RwLock::new(Vec::new()),
                next_id: AtomicUsize::new(0),
            }
        }
    }

    impl EventBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn shared() -> SharedEventBus {
            Arc::new(Self::new())
        }

        /// Register `callback` until the returned handle is dropped.
        pub fn subscribe(
            self: &Arc<Self>,
            callback: impl Fn(PanelEvent) + Send + Sync + 'static,
        ) -> Subscription {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            self.callbacks
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .push((id, Arc::new(callback)));
            Subscription {
                bus: Arc::downgrade(self),
                id,
            }
        }

        fn unsubscribe(&self, id: usize) {
            // try_write: Drop may run during unwinding while emit holds a read lock.
            if let Ok(mut guard) = self.callbacks.try_write() {
                guard.retain(|(i, _)| *i != id);
            }
        }

        /// Deliver `event` to every listener, in subscription order.
        pub fn emit(&self, event: PanelEvent) {
            // Clone the list so a callback may subscribe without deadlocking.
            let callbacks: Vec<_> = self
                .callbacks
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .map(|(_, cb)| Arc::clone(cb))
                .collect();

            for callback in callbacks {
                callback(event.clone());
            }
        }
    }
}

// ---------- wasm32 ----------

#[cfg(target_arch = "wasm32")]
mod platform {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::{Rc, Weak};

    pub type SharedEventBus = Rc<EventBus>;

    /// Registered listener; dropping it removes the callback.
    pub struct Subscription {
        bus: Weak<EventBus>,
        id: usize,
    }

    impl Drop for Subscription {
        fn drop(&mut self) {
            if let Some(bus) = self.bus.upgrade() {
                bus.unsubscribe(self.id);
            }
        }
    }

    /// Fan-out of `PanelEvent`s on the browser's single thread.
    pub struct EventBus {
        callbacks: RefCell<Vec<(usize, Rc<dyn Fn(PanelEvent)>)>>,
        next_id: Cell<usize>,
    }

    impl Default for EventBus {
        fn default() -> Self {
            Self {
                callbacks: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }
        }
    }

    impl EventBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn shared() -> SharedEventBus {
            Rc::new(Self::new())
        }

        /// Register `callback` until the returned handle is dropped.
        pub fn subscribe(self: &Rc<Self>, callback: impl Fn(PanelEvent) + 'static) -> Subscription {
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            self.callbacks.borrow_mut().push((id, Rc::new(callback)));
            Subscription {
                bus: Rc::downgrade(self),
                id,
            }
        }

        fn unsubscribe(&self, id: usize) {
            if let Ok(mut callbacks) = self.callbacks.try_borrow_mut() {
                callbacks.retain(|(i, _)| *i != id);
            }
        }

        /// Deliver `event` to every listener, in subscription order.
        pub fn emit(&self, event: PanelEvent) {
            let callbacks: Vec<_> = self
                .callbacks
                .borrow()
                .iter()
                .map(|(_, cb)| Rc::clone(cb))
                .collect();

            for callback in callbacks {
                callback(event.clone());
            }
        }
    }
}

pub use platform::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[cfg(not(target_arch = "wasm32"))]
    use std::sync::Arc;

    fn saved() -> PanelEvent {
        PanelEvent::SaveStatusChanged {
            status: SaveStatus::Saved,
            timestamp: 1000.0,
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_subscribe_and_emit() {
        let bus = EventBus::shared();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let _sub = bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit(saved());
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = EventBus::shared();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        {
            let _sub = bus.subscribe(move |_event| {
                count_clone.fetch_add(1, Ordering::Relaxed);
            });
            bus.emit(saved());
        }

        bus.emit(saved());
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_panel_event_serialization() {
        let event = PanelEvent::RemoteSnapshotApplied {
            sections: 3,
            overwritten_dirty: vec!["albums".into()],
            timestamp: 1234567890.0,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"remoteSnapshotApplied\""));
        assert!(json.contains("\"overwrittenDirty\":[\"albums\"]"));

        let json = serde_json::to_string(&PanelEvent::ModeSelected {
            mode: StorageMode::Local,
            timestamp: 1.0,
        })
        .unwrap();
        assert!(json.contains("\"mode\":\"local\""));
    }
}
