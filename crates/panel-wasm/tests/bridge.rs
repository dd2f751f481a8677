//! Browser-side tests for the storage bridges.
//!
//! Run with `wasm-pack test --headless --chrome crates/panel-wasm`.

#![cfg(target_arch = "wasm32")]

use js_sys::Function;
use panel_sync::{Document, LocalStore, LocalStoreError};
use panel_wasm::JsLocalStorageBridge;
use serde_json::json;
use wasm_bindgen_test::*;

fn memory_bridge(key: &str) -> JsLocalStorageBridge {
    JsLocalStorageBridge::new(
        Function::new_no_args(&format!("return globalThis['{key}'] ?? null")),
        Function::new_with_args("blob", &format!("globalThis['{key}'] = blob")),
        Function::new_no_args(&format!("delete globalThis['{key}']")),
        Function::new_no_args("return true"),
    )
}

#[wasm_bindgen_test]
fn test_local_bridge_roundtrip() {
    let store = memory_bridge("__mcm_roundtrip");
    assert!(store.get().unwrap().is_none());

    let mut doc = Document::new();
    doc.insert("albums", json!({"data": ["Pascua"]}));
    store.set(&doc).unwrap();
    assert_eq!(store.get().unwrap(), Some(doc));

    store.remove().unwrap();
    assert!(store.get().unwrap().is_none());
}

#[wasm_bindgen_test]
fn test_local_bridge_quota_error() {
    let store = JsLocalStorageBridge::new(
        Function::new_no_args("return null"),
        Function::new_no_args(
            "const e = new Error('Setting the value exceeded the quota.'); \
             e.name = 'QuotaExceededError'; throw e;",
        ),
        Function::new_no_args(""),
        Function::new_no_args("return true"),
    );
    assert!(matches!(
        store.set(&Document::new()),
        Err(LocalStoreError::QuotaExceeded(_))
    ));
}

#[wasm_bindgen_test]
fn test_local_bridge_unavailable() {
    let store = JsLocalStorageBridge::new(
        Function::new_no_args("throw new Error('SecurityError')"),
        Function::new_no_args(""),
        Function::new_no_args(""),
        Function::new_no_args("return false"),
    );
    assert!(!store.is_available());
    assert!(matches!(store.get(), Err(LocalStoreError::Unavailable(_))));
}
