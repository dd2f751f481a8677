//! WASM bindings for panel-sync.
//!
//! Exposes the sync controller to the TypeScript panel.
//!
//! # Architecture
//!
//! ```text
//! TypeScript                    WASM (Rust)
//! ──────────                    ───────────
//! localStorage ──callbacks──> JsLocalStorageBridge ──┐
//! Firebase SDK ──callbacks──> JsRemoteBridge ────────┤
//!                                                     ▼
//!                            SyncController<JsLocalStorageBridge, JsRemoteBridge>
//!                                                     │
//!                                                     ▼
//!                                       WasmPanel (exposed to JS)
//! ```
//!
//! The controller lives in a `RefCell`; borrows are never held across an
//! `.await`, so remote pushes and the autosave timer can interleave with
//! calls from the UI.
//!
//! **Note**: This crate only compiles for `wasm32` targets. When building for native
//! targets (e.g., during `cargo check --workspace`), this crate provides no exports.

#[cfg(target_arch = "wasm32")]
mod bridge;

#[cfg(target_arch = "wasm32")]
pub use bridge::{JsLocalStorageBridge, JsRemoteBridge};

#[cfg(target_arch = "wasm32")]
mod wasm_impl {
    use super::bridge::{self, JsLocalStorageBridge, JsRemoteBridge};
    use futures::StreamExt;
    use futures::future::{AbortHandle, abortable};
    use panel_sync::controller::{HEALTH_PATH, connect_root};
    use panel_sync::{
        FlushError, FlushTarget, InitStep, RemoteError, RemoteStore, RootSubscription,
        StorageMode, SyncConfig, SyncController, SyncError, clock, dispatch,
    };
    use serde::Serialize;
    use std::cell::RefCell;
    use std::rc::{Rc, Weak};
    use std::time::Duration;
    use tracing::{debug, info, warn};
    use tracing_subscriber::layer::SubscriberExt;
    use wasm_bindgen::prelude::*;

    type Controller = SyncController<JsLocalStorageBridge, JsRemoteBridge>;

    fn js_error(e: impl std::fmt::Display) -> JsError {
        JsError::new(&e.to_string())
    }

    // ========== Callback Logger Layer ==========

    thread_local! {
        static LOGGER_CALLBACK: RefCell<Option<js_sys::Function>> = const { RefCell::new(None) };
    }

    /// Forwards every tracing event to the JS logger callback.
    struct JsCallbackLayer;

    impl<S> tracing_subscriber::Layer<S> for JsCallbackLayer
    where
        S: tracing::Subscriber,
    {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            LOGGER_CALLBACK.with(|cb| {
                let Some(callback) = cb.borrow().clone() else {
                    return;
                };
                let metadata = event.metadata();
                let mut visitor = MessageVisitor::default();
                event.record(&mut visitor);

                let log = LogEvent {
                    level: metadata.level().as_str(),
                    target: metadata.target(),
                    message: visitor.message,
                    timestamp: clock::now_millis() as f64,
                };
                if let Ok(js_event) = bridge::to_js(&log) {
                    let _ = callback.call1(&JsValue::NULL, &js_event);
                }
            });
        }
    }

    #[derive(Serialize)]
    struct LogEvent<'a> {
        level: &'a str,
        target: &'a str,
        message: String,
        timestamp: f64,
    }

    /// Collects the `message` field, then any other fields as `name=value`.
    #[derive(Default)]
    struct MessageVisitor {
        message: String,
    }

    impl MessageVisitor {
        fn push_field(&mut self, name: &str, value: String) {
            if name == "message" {
                self.message = if self.message.is_empty() {
                    value
                } else {
                    format!("{} {}", value, self.message)
                };
            } else {
                if !self.message.is_empty() {
                    self.message.push(' ');
                }
                self.message.push_str(&format!("{}={}", name, value));
            }
        }
    }

    impl tracing::field::Visit for MessageVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.push_field(field.name(), format!("{:?}", value));
        }

        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            self.push_field(field.name(), value.to_string());
        }
    }

    /// Initialize the WASM module (panic hook and tracing).
    ///
    /// - `init()` - console-only logging
    /// - `init({ logger: (event) => {...} })` - callback + console logging
    ///
    /// The logger callback receives `{ level, target, message, timestamp }`.
    #[wasm_bindgen]
    pub fn init(config: Option<js_sys::Object>) {
        console_error_panic_hook::set_once();

        let callback = config
            .as_ref()
            .and_then(|cfg| js_sys::Reflect::get(cfg, &"logger".into()).ok())
            .and_then(|v| v.dyn_into::<js_sys::Function>().ok());

        let console_config = tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(tracing::Level::DEBUG)
            .build();

        match callback {
            Some(cb) => {
                LOGGER_CALLBACK.with(|cell| *cell.borrow_mut() = Some(cb));
                let subscriber = tracing_subscriber::registry()
                    .with(JsCallbackLayer)
                    .with(tracing_wasm::WASMLayer::new(console_config));
                tracing::subscriber::set_global_default(subscriber).ok();
            }
            None => tracing_wasm::set_as_global_default_with_config(console_config),
        }

        info!("panel-wasm {} initialized", env!("CARGO_PKG_VERSION"));
    }

    /// Get version string
    #[wasm_bindgen]
    pub fn version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(js_name = setInterval)]
        fn set_interval(handler: &js_sys::Function, timeout: u32) -> JsValue;

        #[wasm_bindgen(js_name = clearInterval)]
        fn clear_interval(id: &JsValue);
    }

    /// A running `setInterval`; cleared on drop.
    struct IntervalHandle {
        id: JsValue,
        _closure: Closure<dyn FnMut()>,
    }

    impl IntervalHandle {
        fn start(period: Duration, tick: impl FnMut() + 'static) -> Self {
            let closure = Closure::<dyn FnMut()>::new(tick);
            let millis = u32::try_from(period.as_millis()).unwrap_or(u32::MAX);
            let id = set_interval(closure.as_ref().unchecked_ref(), millis);
            Self {
                id,
                _closure: closure,
            }
        }
    }

    impl Drop for IntervalHandle {
        fn drop(&mut self) {
            clear_interval(&self.id);
        }
    }

    // ========== WASM Subscription Handle ==========

    /// Subscription handle exposed to JavaScript.
    ///
    /// Call `dispose()` to unsubscribe, or let the JS garbage collector
    /// collect it (the Rust Drop will run via FinalizationRegistry).
    #[wasm_bindgen]
    pub struct WasmSubscription {
        inner: RefCell<Option<panel_sync::Subscription>>,
    }

    #[wasm_bindgen]
    impl WasmSubscription {
        /// Unsubscribe from events. Safe to call multiple times.
        pub fn dispose(&self) {
            self.inner.borrow_mut().take();
        }
    }

    struct Shared {
        ctrl: RefCell<Controller>,
        /// Second handle to the remote so I/O never needs a controller borrow.
        remote: Option<JsRemoteBridge>,
        pump: RefCell<Option<AbortHandle>>,
        autosave: RefCell<Option<IntervalHandle>>,
    }

    impl Shared {
        /// Flush split around the backend I/O.
        async fn flush(&self) -> Result<(), FlushError> {
            let plan = self.ctrl.borrow_mut().begin_flush();
            let result = match plan.target() {
                FlushTarget::Nothing => Ok(()),
                FlushTarget::Remote(ops) => match &self.remote {
                    Some(remote) => dispatch::write_remote_ops(remote, ops).await,
                    None => Err(FlushError::Offline),
                },
                FlushTarget::Local(doc) => self.ctrl.borrow().write_local(doc),
                FlushTarget::Offline => Err(FlushError::Offline),
            };
            self.ctrl.borrow_mut().finish_flush(plan, result)
        }

        /// Fold remote snapshots into the controller until aborted.
        fn start_pump(this: &Rc<Shared>, mut subscription: RootSubscription) {
            let weak: Weak<Shared> = Rc::downgrade(this);
            let (task, handle) = abortable(async move {
                while let Some(item) = subscription.next().await {
                    let Some(shared) = weak.upgrade() else {
                        break;
                    };
                    shared.ctrl.borrow_mut().handle_remote_item(item);
                }
                debug!("Remote pump finished");
            });
            wasm_bindgen_futures::spawn_local(async move {
                let _ = task.await;
            });
            *this.pump.borrow_mut() = Some(handle);
        }

        fn stop(&self) {
            if let Some(handle) = self.pump.borrow_mut().take() {
                handle.abort();
            }
            self.autosave.borrow_mut().take();
            self.ctrl.borrow_mut().shutdown();
        }
    }

    #[derive(Serialize)]
    struct InitResult<'a> {
        mode: StorageMode,
        document: &'a panel_sync::Document,
    }

    /// The panel's sync session, exposed to TypeScript.
    #[wasm_bindgen]
    pub struct WasmPanel {
        shared: Rc<Shared>,
    }

    #[wasm_bindgen]
    impl WasmPanel {
        /// Create a session. Pass `null` for `remote` when Firebase is not configured.
        #[wasm_bindgen(constructor)]
        pub fn new(
            local: JsLocalStorageBridge,
            remote: Option<JsRemoteBridge>,
            autosave_ms: Option<u32>,
        ) -> WasmPanel {
            let mut config = SyncConfig::default();
            if let Some(ms) = autosave_ms.filter(|ms| *ms > 0) {
                config.autosave_interval = Duration::from_millis(u64::from(ms));
            }
            let ctrl = SyncController::new(local, remote.clone(), config);
            WasmPanel {
                shared: Rc::new(Shared {
                    ctrl: RefCell::new(ctrl),
                    remote,
                    pump: RefCell::new(None),
                    autosave: RefCell::new(None),
                }),
            }
        }

        /// Choose the storage mode and load the document.
        ///
        /// Returns `{ mode, document }`. In remote mode, later remote changes
        /// are folded in automatically.
        #[wasm_bindgen]
        pub async fn initialize(&self) -> Result<JsValue, JsError> {
            let step = self.shared.ctrl.borrow_mut().begin_initialize().map_err(js_error)?;
            let mode = match step {
                InitStep::Done(mode) => mode,
                InitStep::ConnectRemote => {
                    let connected = match &self.shared.remote {
                        Some(remote) => connect_root(remote).await,
                        None => Err(RemoteError::NotConfigured),
                    };
                    self.shared.ctrl.borrow_mut().finish_initialize(connected)
                }
            };

            let subscription = self.shared.ctrl.borrow_mut().take_subscription();
            if let Some(subscription) = subscription {
                Shared::start_pump(&self.shared, subscription);
            }

            let ctrl = self.shared.ctrl.borrow();
            bridge::to_js(&InitResult {
                mode,
                document: ctrl.document(),
            })
            .map_err(js_error)
        }

        /// Replace a section (the section editor's `onUpdate`). Returns the document.
        #[wasm_bindgen(js_name = updateSection)]
        pub fn update_section(&self, name: &str, value: JsValue) -> Result<JsValue, JsError> {
            let value: serde_json::Value = serde_wasm_bindgen::from_value(value)
                .map_err(|e| js_error(SyncError::InvalidSection {
                    name: name.to_string(),
                    reason: e.to_string(),
                }))?;
            let mut ctrl = self.shared.ctrl.borrow_mut();
            let doc = ctrl.update_section(name, value).map_err(js_error)?;
            bridge::to_js(doc).map_err(js_error)
        }

        /// Flush unsaved sections now.
        #[wasm_bindgen(js_name = forceSave)]
        pub async fn force_save(&self) -> Result<(), JsError> {
            self.shared.flush().await.map_err(js_error)
        }

        /// Import a backup file's text. Returns the new document.
        #[wasm_bindgen(js_name = importJson)]
        pub fn import_json(&self, text: &str) -> Result<JsValue, JsError> {
            let mut ctrl = self.shared.ctrl.borrow_mut();
            let doc = ctrl.import_document(text.as_bytes()).map_err(js_error)?;
            bridge::to_js(doc).map_err(js_error)
        }

        /// Mark every section unsaved (publish an import in remote mode).
        #[wasm_bindgen(js_name = markAllDirty)]
        pub fn mark_all_dirty(&self) {
            self.shared.ctrl.borrow_mut().mark_all_dirty();
        }

        /// Pretty-printed document for download.
        #[wasm_bindgen(js_name = exportJson)]
        pub fn export_json(&self) -> Result<String, JsError> {
            let bytes = self.shared.ctrl.borrow().export_document().map_err(js_error)?;
            String::from_utf8(bytes).map_err(js_error)
        }

        /// Download name for `exportJson`, dated today.
        #[wasm_bindgen(js_name = backupFilename)]
        pub fn backup_filename(&self) -> String {
            self.shared.ctrl.borrow().backup_filename(clock::now_millis())
        }

        /// Current document.
        #[wasm_bindgen]
        pub fn document(&self) -> Result<JsValue, JsError> {
            bridge::to_js(self.shared.ctrl.borrow().document()).map_err(js_error)
        }

        /// "remote", "local" or "offline".
        #[wasm_bindgen]
        pub fn mode(&self) -> String {
            self.shared.ctrl.borrow().mode().to_string()
        }

        /// "idle", "saving", "saved" or "error".
        #[wasm_bindgen(js_name = saveStatus)]
        pub fn save_status(&self) -> JsValue {
            bridge::to_js(&self.shared.ctrl.borrow().save_status()).unwrap_or(JsValue::NULL)
        }

        #[wasm_bindgen(js_name = isDirty)]
        pub fn is_dirty(&self) -> bool {
            self.shared.ctrl.borrow().is_dirty()
        }

        #[wasm_bindgen(js_name = dirtySections)]
        pub fn dirty_sections(&self) -> Vec<String> {
            self.shared.ctrl.borrow().dirty_sections()
        }

        /// "active" or "empty", for the sidebar.
        #[wasm_bindgen(js_name = sectionStatus)]
        pub fn section_status(&self, name: &str) -> JsValue {
            bridge::to_js(&self.shared.ctrl.borrow().section_status(name)).unwrap_or(JsValue::NULL)
        }

        /// Write a timestamp to `/__health` to verify remote write access.
        #[wasm_bindgen(js_name = checkConnection)]
        pub async fn check_connection(&self) -> Result<(), JsError> {
            let mode = self.shared.ctrl.borrow().mode();
            let remote = match (&self.shared.remote, mode) {
                (Some(remote), StorageMode::Remote) => remote,
                _ => return Err(js_error(SyncError::NotRemote)),
            };
            remote
                .write_subtree(HEALTH_PATH, &serde_json::json!({ "t": clock::now_millis() }))
                .await
                .map_err(|e| js_error(SyncError::HealthCheck(e)))?;
            info!("Remote health check passed");
            Ok(())
        }

        /// Start the periodic autosave (remote mode only; replaces a running timer).
        ///
        /// `interval_ms` defaults to the interval given to the constructor.
        #[wasm_bindgen(js_name = startAutosave)]
        pub fn start_autosave(&self, interval_ms: Option<u32>) {
            let period = match interval_ms.filter(|ms| *ms > 0) {
                Some(ms) => Duration::from_millis(u64::from(ms)),
                None => self.shared.ctrl.borrow().config().autosave_interval,
            };

            let weak = Rc::downgrade(&self.shared);
            let handle = IntervalHandle::start(period, move || {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if !shared.ctrl.borrow().autosave_due() {
                    return;
                }
                wasm_bindgen_futures::spawn_local(async move {
                    if let Err(e) = shared.flush().await {
                        warn!("Autosave failed, will retry: {}", e);
                    }
                });
            });
            debug!("Autosave every {:?}", period);
            *self.shared.autosave.borrow_mut() = Some(handle);
        }

        /// Stop the periodic autosave.
        #[wasm_bindgen(js_name = stopAutosave)]
        pub fn stop_autosave(&self) {
            self.shared.autosave.borrow_mut().take();
        }

        /// Subscribe to panel events (mode, save status, remote errors).
        ///
        /// Events are delivered on a microtask, so handlers may call back
        /// into the panel.
        #[wasm_bindgen]
        pub fn subscribe(&self, callback: js_sys::Function) -> WasmSubscription {
            let rust_closure = move |event: panel_sync::PanelEvent| {
                let callback = callback.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    if let Ok(js_event) = bridge::to_js(&event) {
                        let _ = callback.call1(&JsValue::NULL, &js_event);
                    }
                });
            };
            let subscription = self.shared.ctrl.borrow().events().subscribe(rust_closure);
            WasmSubscription {
                inner: RefCell::new(Some(subscription)),
            }
        }

        /// End the session: stop autosave and close the remote subscription.
        #[wasm_bindgen]
        pub fn dispose(&self) {
            self.shared.stop();
        }
    }
}

// Re-export wasm_impl contents at crate root for wasm32 targets
#[cfg(target_arch = "wasm32")]
pub use wasm_impl::*;
