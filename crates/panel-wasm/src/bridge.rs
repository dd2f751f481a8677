//! JavaScript storage bridges for WASM.
//!
//! The TypeScript panel passes plain callbacks; the bridges adapt them to
//! the `LocalStore` and `RemoteStore` traits.
//!
//! # Example (TypeScript side)
//!
//! ```typescript
//! const local = new JsLocalStorageBridge(
//!   () => localStorage.getItem("mcm-panel-data"),
//!   (blob) => localStorage.setItem("mcm-panel-data", blob),
//!   () => localStorage.removeItem("mcm-panel-data"),
//!   () => storageAvailable(),
//! );
//! const remote = new JsRemoteBridge(
//!   (emit, fail) => onValue(ref(db, "/"), (s) => emit(s.val()), fail),
//!   (path, value) => set(ref(db, path), value),
//! );
//! ```

use async_trait::async_trait;
use panel_sync::local::{self, LocalStoreError};
use panel_sync::remote::{Result as RemoteResult, SnapshotSender};
use panel_sync::{Document, LocalStore, RemoteError, RemoteStore, RootSubscription};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

/// `localStorage` access through synchronous JS callbacks.
#[wasm_bindgen]
pub struct JsLocalStorageBridge {
    get_fn: js_sys::Function,
    set_fn: js_sys::Function,
    remove_fn: js_sys::Function,
    available_fn: js_sys::Function,
}

#[wasm_bindgen]
impl JsLocalStorageBridge {
    /// `get() -> string | null`, `set(blob)`, `remove()`, `available() -> boolean`.
    /// All callbacks are synchronous and may throw.
    #[wasm_bindgen(constructor)]
    pub fn new(
        get_fn: js_sys::Function,
        set_fn: js_sys::Function,
        remove_fn: js_sys::Function,
        available_fn: js_sys::Function,
    ) -> Self {
        Self {
            get_fn,
            set_fn,
            remove_fn,
            available_fn,
        }
    }
}

/// Best-effort message from a thrown JS value.
pub(crate) fn js_err_message(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| {
            js_sys::Reflect::get(err, &"message".into())
                .ok()
                .and_then(|v| v.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", err))
}

fn js_err_to_local_err(err: JsValue) -> LocalStoreError {
    let msg = js_err_message(&err);
    let is_quota = js_sys::Reflect::get(&err, &"name".into())
        .ok()
        .and_then(|v| v.as_string())
        .is_some_and(|name| name == "QuotaExceededError");
    if is_quota || msg.to_lowercase().contains("quota") {
        LocalStoreError::QuotaExceeded(msg)
    } else {
        LocalStoreError::Unavailable(msg)
    }
}

impl LocalStore for JsLocalStorageBridge {
    fn get(&self) -> local::Result<Option<Document>> {
        let blob = self
            .get_fn
            .call0(&JsValue::NULL)
            .map_err(js_err_to_local_err)?;
        Ok(blob.as_string().as_deref().and_then(local::decode_blob))
    }

    fn set(&self, doc: &Document) -> local::Result<()> {
        let blob = doc
            .to_compact_json()
            .map_err(|e| LocalStoreError::Serialization(e.to_string()))?;
        self.set_fn
            .call1(&JsValue::NULL, &JsValue::from_str(&blob))
            .map_err(js_err_to_local_err)?;
        Ok(())
    }

    fn remove(&self) -> local::Result<()> {
        self.remove_fn
            .call0(&JsValue::NULL)
            .map_err(js_err_to_local_err)?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available_fn
            .call0(&JsValue::NULL)
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Realtime database access through the Firebase JS SDK.
#[wasm_bindgen]
#[derive(Clone)]
pub struct JsRemoteBridge {
    subscribe_fn: js_sys::Function,
    write_fn: js_sys::Function,
}

#[wasm_bindgen]
impl JsRemoteBridge {
    /// `subscribe(onValue, onError) -> unsubscribe` listens on the root;
    /// `write(path, value) -> Promise` replaces a subtree.
    #[wasm_bindgen(constructor)]
    pub fn new(subscribe_fn: js_sys::Function, write_fn: js_sys::Function) -> Self {
        Self {
            subscribe_fn,
            write_fn,
        }
    }
}

/// Helper to call a JS function and await its Promise result.
async fn call_js_async(func: &js_sys::Function, args: &[JsValue]) -> Result<JsValue, JsValue> {
    let js_args = js_sys::Array::new();
    for arg in args {
        js_args.push(arg);
    }
    let promise = func.apply(&JsValue::NULL, &js_args)?;
    JsFuture::from(js_sys::Promise::resolve(&promise)).await
}

fn js_err_to_remote_err(err: JsValue, write: bool) -> RemoteError {
    let msg = js_err_message(&err);
    let lower = msg.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        RemoteError::PermissionDenied(msg)
    } else if write {
        RemoteError::WriteFailed(msg)
    } else {
        RemoteError::ConnectionFailed(msg)
    }
}

/// Plain JSON objects on the JS side, never `Map`s.
pub(crate) fn to_js<T: Serialize + ?Sized>(
    value: &T,
) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

fn snapshot_callback(tx: SnapshotSender) -> Closure<dyn FnMut(JsValue)> {
    Closure::new(move |value: JsValue| {
        let item = if value.is_null() || value.is_undefined() {
            Ok(Document::new())
        } else {
            serde_wasm_bindgen::from_value::<Value>(value)
                .map(Document::from_remote_value)
                .map_err(|e| RemoteError::Protocol(e.to_string()))
        };
        let _ = tx.unbounded_send(item);
    })
}

fn error_callback(tx: SnapshotSender) -> Closure<dyn FnMut(JsValue)> {
    Closure::new(move |err: JsValue| {
        let _ = tx.unbounded_send(Err(js_err_to_remote_err(err, false)));
    })
}

#[async_trait(?Send)]
impl RemoteStore for JsRemoteBridge {
    async fn subscribe_root(&self) -> RemoteResult<RootSubscription> {
        let (tx, rx) = RootSubscription::channel();
        let on_value = snapshot_callback(tx.clone());
        let on_error = error_callback(tx);

        let unsubscribe = self
            .subscribe_fn
            .call2(&JsValue::NULL, on_value.as_ref(), on_error.as_ref())
            .map_err(|e| js_err_to_remote_err(e, false))?;

        // The closures must outlive the JS listener; they are dropped with it.
        Ok(RootSubscription::new(
            rx,
            Box::new(move || {
                if let Some(unsubscribe) = unsubscribe.dyn_ref::<js_sys::Function>() {
                    let _ = unsubscribe.call0(&JsValue::NULL);
                }
                drop(on_value);
                drop(on_error);
            }),
        ))
    }

    async fn write_subtree(&self, path: &str, value: &Value) -> RemoteResult<()> {
        let js_value = to_js(value).map_err(|e| RemoteError::Protocol(e.to_string()))?;
        call_js_async(&self.write_fn, &[path.into(), js_value])
            .await
            .map_err(|e| js_err_to_remote_err(e, true))?;
        Ok(())
    }
}
