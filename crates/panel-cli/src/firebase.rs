//! Firebase Realtime Database adapter over the REST API.
//!
//! - Root subscription: `GET /.json` with `Accept: text/event-stream`. The
//!   stream sends `put` and `patch` events relative to the root; they are
//!   folded into a local mirror and every change is forwarded as a full
//!   snapshot.
//! - Writes: `PUT /<path>.json` with the JSON value as body.
//!
//! `auth` is passed as the `auth` query parameter (database secret or ID token).

use async_trait::async_trait;
use futures::StreamExt;
use panel_sync::remote::{Result, SnapshotSender};
use panel_sync::{Document, RemoteError, RemoteStore, RootSubscription, tree};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::sse::{SseEvent, SseParser};

#[derive(Clone)]
pub struct FirebaseRemote {
    client: reqwest::Client,
    base_url: String,
    auth: Option<String>,
}

impl FirebaseRemote {
    /// `database_url` is the database root, e.g. `https://mcm-panel.firebaseio.com`.
    pub fn new(database_url: &str, auth: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: database_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// REST URL for a tree path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, tree::segments(path).join("/"))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.auth {
            Some(token) => builder.query(&[("auth", token)]),
            None => builder,
        }
    }
}

fn status_error(status: StatusCode, body: String) -> RemoteError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::PermissionDenied(message),
        _ => RemoteError::ConnectionFailed(message),
    }
}

#[async_trait]
impl RemoteStore for FirebaseRemote {
    async fn subscribe_root(&self) -> Result<RootSubscription> {
        let response = self
            .request(reqwest::Method::GET, "/")
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| RemoteError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        info!("Subscribed to {}", self.base_url);
        let (tx, rx) = RootSubscription::channel();
        let handle = tokio::spawn(pump_events(response, tx));
        Ok(RootSubscription::new(rx, Box::new(move || handle.abort())))
    }

    async fn write_subtree(&self, path: &str, value: &Value) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, path)
            .json(value)
            .send()
            .await
            .map_err(|e| RemoteError::WriteFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status_error(status, body) {
                RemoteError::ConnectionFailed(message) => RemoteError::WriteFailed(message),
                other => other,
            });
        }
        debug!("PUT {} ok", path);
        Ok(())
    }
}

/// Read the event stream until it ends or the subscriber goes away.
async fn pump_events(response: reqwest::Response, tx: SnapshotSender) {
    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut mirror = Value::Null;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.unbounded_send(Err(RemoteError::ConnectionFailed(e.to_string())));
                return;
            }
        };

        for event in parser.push(&chunk) {
            let item = match apply_event(&mut mirror, &event) {
                Ok(Some(doc)) => Ok(doc),
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            let fatal = item.is_err();
            if tx.unbounded_send(item).is_err() || fatal {
                return;
            }
        }
    }
    debug!("Event stream ended");
}

#[derive(Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

/// Fold one stream event into the mirror.
///
/// Returns the new snapshot when the tree changed, `None` for events that
/// carry no data, and an error for events that end the stream.
pub fn apply_event(mirror: &mut Value, event: &SseEvent) -> Result<Option<Document>> {
    match event.event.as_str() {
        "put" => {
            let put: PathData = parse_payload(&event.data)?;
            tree::set_at(mirror, &put.path, put.data);
        }
        "patch" => {
            let patch: PathData = parse_payload(&event.data)?;
            let children: Map<String, Value> = match patch.data {
                Value::Object(map) => map,
                other => {
                    return Err(RemoteError::Protocol(format!(
                        "patch data must be an object, got {}",
                        other
                    )));
                }
            };
            tree::merge_at(mirror, &patch.path, children);
        }
        "keep-alive" => return Ok(None),
        "cancel" => return Err(RemoteError::PermissionDenied(event.data.clone())),
        "auth_revoked" => {
            return Err(RemoteError::PermissionDenied("auth credential revoked".into()));
        }
        other => {
            warn!("Ignoring unknown stream event {:?}", other);
            return Ok(None);
        }
    }
    Ok(Some(Document::from_remote_value(mirror.clone())))
}

fn parse_payload(data: &str) -> Result<PathData> {
    serde_json::from_str(data).map_err(|e| RemoteError::Protocol(e.to_string()))
}
