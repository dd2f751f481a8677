//! SyncController: owns the panel document and decides who persists it.
//!
//! Session lifecycle:
//!
//! 1. `initialize` picks the storage mode once: a stored local document wins,
//!    then the remote database (if configured), then offline.
//! 2. Section editors call `update_section`. Local mode writes through
//!    immediately; remote mode defers to the next flush; offline keeps the
//!    edit in memory only.
//! 3. `force_save` (or the host's periodic `autosave_tick`) flushes dirty
//!    sections to the authoritative backend.
//! 4. In remote mode the host folds incoming root snapshots with
//!    `handle_remote_item`. Snapshots replace the document wholesale
//!    (last writer wins), even over unsaved edits.
//!
//! Flushes and initialization are split into synchronous begin/finish steps
//! around the backend I/O, so a single-threaded host can release the
//! controller while a write is in flight.

use crate::clock;
use crate::dispatch::{self, RemoteWriteOp};
use crate::document::{self, Document, SectionStatus};
use crate::error::{FlushError, Result, SyncError};
use crate::events::{EventBus, PanelEvent, SharedEventBus};
use crate::local::LocalStore;
use crate::remote::{self, NoRemote, RemoteError, RemoteStore, RootSubscription};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default interval between automatic flushes in remote mode.
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(10);

/// Remote path written by `check_connection`.
pub const HEALTH_PATH: &str = "/__health";

/// Which backend is authoritative for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageMode {
    Remote,
    Local,
    Offline,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Remote => "remote",
            StorageMode::Local => "local",
            StorageMode::Offline => "offline",
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the last flush attempt, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
    Error,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval the host should use for `autosave_tick`.
    pub autosave_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
        }
    }
}

/// Next step of a split initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    /// Mode chosen without touching the network.
    Done(StorageMode),
    /// No local document; the host must connect to the remote root and
    /// pass the outcome to `finish_initialize`.
    ConnectRemote,
}

/// Where a flush goes.
#[derive(Debug, Clone)]
pub enum FlushTarget {
    /// Nothing dirty.
    Nothing,
    /// Remote writes, in order.
    Remote(Vec<RemoteWriteOp>),
    /// Full document snapshot for local storage.
    Local(Document),
    /// No backend can take the data.
    Offline,
}

/// Snapshot of a flush taken by `begin_flush`.
#[derive(Debug, Clone)]
pub struct FlushPlan {
    target: FlushTarget,
    /// Dirty generation of each section at planning time.
    generations: BTreeMap<String, u64>,
    /// Counted in `flushes_in_flight` until finished.
    started: bool,
}

impl FlushPlan {
    pub fn target(&self) -> &FlushTarget {
        &self.target
    }

    /// Sections this flush covers.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.generations.keys().map(String::as_str)
    }
}

/// The session's sync state.
///
/// Owned by the host session and lent to section editors; there is no
/// global instance.
pub struct SyncController<L, R> {
    local: L,
    remote: Option<R>,
    config: SyncConfig,
    document: Document,
    mode: StorageMode,
    initialized: bool,
    /// Dirty sections with the generation of their latest edit.
    dirty: BTreeMap<String, u64>,
    generation: u64,
    save_status: SaveStatus,
    flushes_in_flight: usize,
    subscription: Option<RootSubscription>,
    events: SharedEventBus,
}

fn now_ts() -> f64 {
    clock::now_millis() as f64
}

/// Open the remote root and wait for its first snapshot.
pub async fn connect_root<R: RemoteStore + ?Sized>(
    remote: &R,
) -> std::result::Result<(Document, RootSubscription), RemoteError> {
    let mut subscription = remote.subscribe_root().await?;
    let doc = subscription.first_snapshot().await?;
    Ok((doc, subscription))
}

impl<L: LocalStore, R: RemoteStore> SyncController<L, R> {
    /// Create a controller. `remote` is `None` when no database is configured.
    pub fn new(local: L, remote: Option<R>, config: SyncConfig) -> Self {
        Self {
            local,
            remote,
            config,
            document: Document::new(),
            mode: StorageMode::Offline,
            initialized: false,
            dirty: BTreeMap::new(),
            generation: 0,
            save_status: SaveStatus::Idle,
            flushes_in_flight: 0,
            subscription: None,
            events: EventBus::shared(),
        }
    }

    // ========== Accessors ==========

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn section(&self, name: &str) -> Option<&serde_json::Value> {
        self.document.get(name)
    }

    pub fn section_status(&self, name: &str) -> SectionStatus {
        self.document.section_status(name)
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn save_status(&self) -> SaveStatus {
        self.save_status
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty_sections(&self) -> Vec<String> {
        self.dirty.keys().cloned().collect()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn remote(&self) -> Option<&R> {
        self.remote.as_ref()
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    /// Event bus carrying status changes for display.
    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    // ========== Initialization ==========

    /// Choose the storage mode for this session.
    ///
    /// Order: stored local document, then remote root, then a second look
    /// at local storage, then offline. The decision is final for the
    /// session.
    pub async fn initialize(&mut self) -> Result<(Document, StorageMode)> {
        let mode = match self.begin_initialize()? {
            InitStep::Done(mode) => mode,
            InitStep::ConnectRemote => {
                let connected = match self.remote.as_ref() {
                    Some(remote) => connect_root(remote).await,
                    None => Err(RemoteError::NotConfigured),
                };
                self.finish_initialize(connected)
            }
        };
        Ok((self.document.clone(), mode))
    }

    /// First half of `initialize`: everything that needs no network.
    pub fn begin_initialize(&mut self) -> Result<InitStep> {
        if self.initialized {
            return Err(SyncError::AlreadyInitialized);
        }
        self.initialized = true;

        if let Some(doc) = self.read_local() {
            info!("Loaded document from local storage ({} sections)", doc.len());
            self.select_mode(doc, StorageMode::Local);
            return Ok(InitStep::Done(StorageMode::Local));
        }

        if self.remote.is_none() {
            info!("Remote database not configured, data will be kept in local storage");
            self.select_mode(Document::new(), StorageMode::Local);
            return Ok(InitStep::Done(StorageMode::Local));
        }

        Ok(InitStep::ConnectRemote)
    }

    /// Second half of `initialize`, given the outcome of `connect_root`.
    pub fn finish_initialize(
        &mut self,
        connected: std::result::Result<(Document, RootSubscription), RemoteError>,
    ) -> StorageMode {
        match connected {
            Ok((doc, subscription)) => {
                info!("Connected to remote database ({} sections)", doc.len());
                self.subscription = Some(subscription);
                self.select_mode(doc, StorageMode::Remote);
            }
            Err(e) => {
                let err = SyncError::RemoteConnect(e);
                warn!("{}", err);
                self.events.emit(PanelEvent::RemoteError {
                    message: err.to_string(),
                    timestamp: now_ts(),
                });

                match self.read_local() {
                    Some(doc) => {
                        info!("Falling back to local storage");
                        self.select_mode(doc, StorageMode::Local);
                    }
                    None => {
                        warn!("No local data either; running offline (import a file to start)");
                        self.select_mode(Document::new(), StorageMode::Offline);
                    }
                }
            }
        }
        self.mode
    }

    fn read_local(&self) -> Option<Document> {
        if !self.local.is_available() {
            warn!("Local storage unavailable");
            return None;
        }
        match self.local.get() {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Failed to read local storage: {}", e);
                None
            }
        }
    }

    fn select_mode(&mut self, doc: Document, mode: StorageMode) {
        self.document = doc;
        self.set_mode(mode);
    }

    fn set_mode(&mut self, mode: StorageMode) {
        self.mode = mode;
        self.events.emit(PanelEvent::ModeSelected {
            mode,
            timestamp: now_ts(),
        });
    }

    // ========== Editing ==========

    /// Replace a section with a new value from its editor.
    ///
    /// The value is stamped with `updatedAt` and the section is marked
    /// dirty. In local mode the document is written through before
    /// returning; a failed write keeps the edit in memory and returns the
    /// error.
    pub fn update_section(&mut self, name: &str, value: serde_json::Value) -> Result<&Document> {
        if name.trim().is_empty() {
            return Err(SyncError::InvalidSection {
                name: name.to_string(),
                reason: "section name is empty".into(),
            });
        }

        let updated_at = clock::iso_timestamp(clock::now_millis());
        let stamped =
            document::stamp_section(value, &updated_at).map_err(|e| SyncError::InvalidSection {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        self.document.insert(name, stamped);
        self.mark_dirty(name);
        debug!("Section {} updated ({} mode)", name, self.mode);
        self.events.emit(PanelEvent::SectionUpdated {
            section: name.to_string(),
            timestamp: now_ts(),
        });

        if self.mode == StorageMode::Local {
            self.flush_local_now()?;
        }
        Ok(&self.document)
    }

    fn mark_dirty(&mut self, name: &str) {
        self.generation += 1;
        self.dirty.insert(name.to_string(), self.generation);
    }

    /// Mark every present section dirty.
    ///
    /// Used to save an imported document explicitly in remote mode.
    pub fn mark_all_dirty(&mut self) {
        let names: Vec<String> = self.document.sections().map(str::to_string).collect();
        for name in names {
            self.mark_dirty(&name);
        }
    }

    // ========== Flushing ==========

    /// Flush all dirty sections to the authoritative backend.
    ///
    /// On failure the dirty set is kept so the next call retries the same
    /// sections. Writes already made before a failing one are not undone.
    pub async fn force_save(&mut self) -> std::result::Result<(), FlushError> {
        let plan = self.begin_flush();
        let result = match plan.target() {
            FlushTarget::Nothing => Ok(()),
            FlushTarget::Remote(ops) => match self.remote.as_ref() {
                Some(remote) => dispatch::write_remote_ops(remote, ops).await,
                None => Err(FlushError::Offline),
            },
            FlushTarget::Local(doc) => self.write_local(doc),
            FlushTarget::Offline => Err(FlushError::Offline),
        };
        self.finish_flush(plan, result)
    }

    /// Snapshot what needs flushing and mark the flush in flight.
    ///
    /// Overlapping flushes are allowed; each must be passed to
    /// `finish_flush`.
    pub fn begin_flush(&mut self) -> FlushPlan {
        self.plan_flush(self.mode, false)
    }

    /// With `snapshot` set, local mode writes the whole document even when
    /// nothing is dirty.
    fn plan_flush(&mut self, mode: StorageMode, snapshot: bool) -> FlushPlan {
        if self.dirty.is_empty() && !(snapshot && mode == StorageMode::Local) {
            return FlushPlan {
                target: FlushTarget::Nothing,
                generations: BTreeMap::new(),
                started: false,
            };
        }

        let target = match mode {
            StorageMode::Remote => FlushTarget::Remote(
                self.dirty
                    .keys()
                    .flat_map(|name| dispatch::section_writes(name, self.document.get(name)))
                    .collect(),
            ),
            StorageMode::Local => FlushTarget::Local(self.document.clone()),
            StorageMode::Offline => FlushTarget::Offline,
        };

        self.flushes_in_flight += 1;
        self.set_save_status(SaveStatus::Saving);
        FlushPlan {
            target,
            generations: self.dirty.clone(),
            started: true,
        }
    }

    /// Write a snapshot to local storage.
    pub fn write_local(&self, doc: &Document) -> std::result::Result<(), FlushError> {
        self.local.set(doc).map_err(FlushError::LocalQuotaOrAccess)
    }

    /// Record the outcome of a flush started with `begin_flush`.
    ///
    /// On success the flushed sections leave the dirty set, unless they
    /// were edited again while the flush was in flight.
    pub fn finish_flush(
        &mut self,
        plan: FlushPlan,
        result: std::result::Result<(), FlushError>,
    ) -> std::result::Result<(), FlushError> {
        if plan.started {
            self.flushes_in_flight = self.flushes_in_flight.saturating_sub(1);
        }
        match result {
            Ok(()) => {
                for (name, generation) in &plan.generations {
                    if self.dirty.get(name) == Some(generation) {
                        self.dirty.remove(name);
                    }
                }
                if !plan.generations.is_empty() {
                    debug!("Flushed {} section(s) to {}", plan.generations.len(), self.mode);
                }
                if self.flushes_in_flight == 0 {
                    self.set_save_status(SaveStatus::Saved);
                }
                Ok(())
            }
            Err(e) => {
                error!("Save failed ({}): {}", e.backend(), e);
                self.set_save_status(SaveStatus::Error);
                self.events.emit(PanelEvent::FlushFailed {
                    backend: e.backend().to_string(),
                    message: e.to_string(),
                    timestamp: now_ts(),
                });
                Err(e)
            }
        }
    }

    fn flush_local_now(&mut self) -> std::result::Result<(), FlushError> {
        self.save_local(false)
    }

    fn save_local(&mut self, snapshot: bool) -> std::result::Result<(), FlushError> {
        let plan = self.plan_flush(StorageMode::Local, snapshot);
        let result = match plan.target() {
            FlushTarget::Local(doc) => self.write_local(doc),
            _ => Ok(()),
        };
        self.finish_flush(plan, result)
    }

    fn set_save_status(&mut self, status: SaveStatus) {
        self.save_status = status;
        self.events.emit(PanelEvent::SaveStatusChanged {
            status,
            timestamp: now_ts(),
        });
    }

    /// Whether the periodic timer should flush now.
    pub fn autosave_due(&self) -> bool {
        self.mode == StorageMode::Remote && !self.dirty.is_empty() && self.flushes_in_flight == 0
    }

    /// Body of the periodic autosave timer.
    ///
    /// Returns `None` when nothing was due. Failures are logged and left
    /// for the next tick.
    pub async fn autosave_tick(&mut self) -> Option<std::result::Result<(), FlushError>> {
        if !self.autosave_due() {
            return None;
        }
        debug!("Autosave: {} dirty section(s)", self.dirty.len());
        let result = self.force_save().await;
        if let Err(e) = &result {
            warn!("Autosave failed, will retry: {}", e);
        }
        Some(result)
    }

    // ========== Import / export ==========

    /// Replace the document with an imported file.
    ///
    /// Malformed input leaves everything unchanged. In remote mode the
    /// import is only a local view until saved explicitly; otherwise it is
    /// written to local storage at once and the session becomes local.
    pub fn import_document(&mut self, bytes: &[u8]) -> Result<&Document> {
        let doc = Document::from_json_bytes(bytes).map_err(|e| {
            warn!("Rejected import: {}", e);
            SyncError::ImportParse(e.to_string())
        })?;
        self.replace_document(doc)
    }

    /// Import an already-parsed document.
    pub fn replace_document(&mut self, doc: Document) -> Result<&Document> {
        info!("Importing document with {} sections", doc.len());
        self.document = doc;
        self.events.emit(PanelEvent::DocumentImported {
            sections: self.document.len(),
            timestamp: now_ts(),
        });

        match self.mode {
            StorageMode::Remote => {
                info!("Import held in memory; save explicitly to publish it");
            }
            StorageMode::Local | StorageMode::Offline => {
                // An empty import must still replace the stored document.
                self.mark_all_dirty();
                self.save_local(true)?;
                if self.mode != StorageMode::Local {
                    info!("Import saved locally, switching to local storage");
                    self.set_mode(StorageMode::Local);
                }
            }
        }
        Ok(&self.document)
    }

    /// Pretty-printed JSON of the whole document, for backup downloads.
    pub fn export_document(&self) -> Result<Vec<u8>> {
        Ok(self.document.to_pretty_json()?)
    }

    /// Suggested download name: `<prefix>-<YYYY-MM-DD>.json`.
    pub fn backup_filename(&self, now_millis: u64) -> String {
        let prefix = match self.mode {
            StorageMode::Local => "backup-local",
            StorageMode::Remote | StorageMode::Offline => "mcm-data",
        };
        format!("{}-{}.json", prefix, clock::iso_date(now_millis))
    }

    /// Delete the local storage entry.
    pub fn clear_local(&self) -> Result<()> {
        self.local.remove()?;
        info!("Cleared local storage");
        Ok(())
    }

    // ========== Remote subscription ==========

    /// Fold a remote snapshot into the session.
    ///
    /// Only applies in remote mode. The snapshot replaces the document
    /// wholesale; unsaved local edits are overwritten in memory and stay
    /// marked dirty. Returns whether the snapshot was applied.
    pub fn apply_remote_snapshot(&mut self, doc: Document) -> bool {
        if self.mode != StorageMode::Remote {
            debug!("Ignoring remote snapshot in {} mode", self.mode);
            return false;
        }

        let overwritten: Vec<String> = self.dirty_sections();
        if !overwritten.is_empty() {
            warn!(
                "Remote snapshot replaced unsaved sections {:?} (last writer wins)",
                overwritten
            );
        }

        self.document = doc;
        self.events.emit(PanelEvent::RemoteSnapshotApplied {
            sections: self.document.len(),
            overwritten_dirty: overwritten,
            timestamp: now_ts(),
        });
        true
    }

    /// Handle one item from the root subscription.
    ///
    /// Errors after initialization are reported but never change the mode.
    pub fn handle_remote_item(&mut self, item: remote::SnapshotResult) {
        match item {
            Ok(doc) => {
                self.apply_remote_snapshot(doc);
            }
            Err(e) => {
                warn!("Remote subscription error: {}", e);
                self.events.emit(PanelEvent::RemoteError {
                    message: e.to_string(),
                    timestamp: now_ts(),
                });
            }
        }
    }

    /// Move the subscription out so the host can poll it in its own loop.
    pub fn take_subscription(&mut self) -> Option<RootSubscription> {
        self.subscription.take()
    }

    /// Wait for and fold the next remote item.
    ///
    /// Returns `false` when there is no subscription or it has ended.
    pub async fn next_remote_event(&mut self) -> bool {
        let item = match self.subscription.as_mut() {
            Some(subscription) => subscription.next().await,
            None => return false,
        };
        match item {
            Some(item) => {
                self.handle_remote_item(item);
                true
            }
            None => {
                info!("Remote subscription ended");
                self.subscription = None;
                false
            }
        }
    }

    /// Write a timestamp to `/__health` to verify remote write access.
    pub async fn check_connection(&self) -> Result<()> {
        if self.mode != StorageMode::Remote {
            return Err(SyncError::NotRemote);
        }
        let remote = self.remote.as_ref().ok_or(SyncError::NotRemote)?;
        remote
            .write_subtree(HEALTH_PATH, &json!({ "t": clock::now_millis() }))
            .await
            .map_err(SyncError::HealthCheck)?;
        info!("Remote health check passed");
        Ok(())
    }

    /// End the session: release the remote subscription.
    pub fn shutdown(&mut self) {
        if self.subscription.take().is_some() {
            info!("Remote subscription closed");
        }
    }
}

impl<L: LocalStore> SyncController<L, NoRemote> {
    /// A controller with no remote database configured.
    pub fn local_only(local: L) -> Self {
        Self::new(local, None, SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::InMemoryLocal;
    use crate::remote::InMemoryRemote;
    use serde_json::json;

    fn sample_doc() -> Document {
        Document::from_value(json!({
            "albums": {"data": [{"title": "Pascua"}]},
            "songs": {"data": []},
        }))
        .unwrap()
    }

    fn remote_session(remote: &InMemoryRemote) -> SyncController<InMemoryLocal, InMemoryRemote> {
        SyncController::new(InMemoryLocal::new(), Some(remote.clone()), SyncConfig::default())
    }

    #[tokio::test]
    async fn test_initialize_twice_fails() {
        let mut ctrl = SyncController::local_only(InMemoryLocal::new());
        ctrl.initialize().await.unwrap();
        assert!(matches!(
            ctrl.initialize().await,
            Err(SyncError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_split_flush_keeps_sections_edited_in_flight() {
        let remote = InMemoryRemote::new();
        let mut ctrl = remote_session(&remote);
        ctrl.initialize().await.unwrap();
        assert_eq!(ctrl.mode(), StorageMode::Remote);

        ctrl.update_section("albums", json!({"data": [1]})).unwrap();
        let plan = ctrl.begin_flush();
        assert_eq!(ctrl.save_status(), SaveStatus::Saving);
        assert!(!ctrl.autosave_due());

        // Edit lands while the write is in flight
        ctrl.update_section("albums", json!({"data": [1, 2]})).unwrap();

        let FlushTarget::Remote(ops) = plan.target().clone() else {
            panic!("expected remote plan");
        };
        dispatch::write_remote_ops(&remote, &ops).await.unwrap();
        ctrl.finish_flush(plan, Ok(())).unwrap();

        assert_eq!(ctrl.save_status(), SaveStatus::Saved);
        assert_eq!(ctrl.dirty_sections(), vec!["albums".to_string()]);
    }

    #[tokio::test]
    async fn test_overlapping_flushes_hold_autosave_until_both_finish() {
        let remote = InMemoryRemote::new();
        let mut ctrl = remote_session(&remote);
        ctrl.initialize().await.unwrap();

        ctrl.update_section("albums", json!({"data": [1]})).unwrap();
        let autosave = ctrl.begin_flush();
        ctrl.update_section("songs", json!({"data": ["Pescador"]}))
            .unwrap();
        let manual = ctrl.begin_flush();

        ctrl.finish_flush(manual, Ok(())).unwrap();
        assert!(!ctrl.is_dirty());
        assert_eq!(ctrl.save_status(), SaveStatus::Saving);

        // Edit while the first write is still pending
        ctrl.update_section("songs", json!({"data": []})).unwrap();
        assert!(!ctrl.autosave_due());

        ctrl.finish_flush(autosave, Ok(())).unwrap();
        assert_eq!(ctrl.save_status(), SaveStatus::Saved);
        assert!(ctrl.autosave_due());
    }

    #[tokio::test]
    async fn test_autosave_only_in_remote_mode() {
        let mut ctrl = SyncController::new(
            InMemoryLocal::with_document(&sample_doc()),
            Some(InMemoryRemote::new()),
            SyncConfig::default(),
        );
        ctrl.initialize().await.unwrap();
        assert_eq!(ctrl.mode(), StorageMode::Local);

        ctrl.update_section("albums", json!({"data": []})).unwrap();
        assert!(ctrl.autosave_tick().await.is_none());
    }

    #[tokio::test]
    async fn test_autosave_retries_after_failure() {
        let remote = InMemoryRemote::new();
        let mut ctrl = remote_session(&remote);
        ctrl.initialize().await.unwrap();

        ctrl.update_section("songs", json!({"data": ["Alabaré"]}))
            .unwrap();
        remote.set_write_error(Some("network down"));
        assert!(matches!(ctrl.autosave_tick().await, Some(Err(_))));
        assert_eq!(ctrl.save_status(), SaveStatus::Error);

        remote.set_write_error(None);
        assert!(matches!(ctrl.autosave_tick().await, Some(Ok(()))));
        assert!(!ctrl.is_dirty());
        assert!(ctrl.autosave_tick().await.is_none());
    }

    #[tokio::test]
    async fn test_update_rejects_empty_name_and_scalars() {
        let mut ctrl = SyncController::local_only(InMemoryLocal::new());
        ctrl.initialize().await.unwrap();

        assert!(matches!(
            ctrl.update_section("  ", json!({})),
            Err(SyncError::InvalidSection { .. })
        ));
        assert!(matches!(
            ctrl.update_section("albums", json!("text")),
            Err(SyncError::InvalidSection { .. })
        ));
        assert!(!ctrl.is_dirty());
    }

    #[tokio::test]
    async fn test_unknown_section_accepted() {
        let mut ctrl = SyncController::local_only(InMemoryLocal::new());
        ctrl.initialize().await.unwrap();

        ctrl.update_section("retreats", json!({"data": []})).unwrap();
        assert!(ctrl.section("retreats").is_some());
    }

    #[tokio::test]
    async fn test_backup_filename_prefix() {
        let millis = 1_704_164_645_678;

        let mut local = SyncController::local_only(InMemoryLocal::new());
        local.initialize().await.unwrap();
        assert_eq!(local.backup_filename(millis), "backup-local-2024-01-02.json");

        let mut remote = remote_session(&InMemoryRemote::new());
        remote.initialize().await.unwrap();
        assert_eq!(remote.backup_filename(millis), "mcm-data-2024-01-02.json");
    }

    #[tokio::test]
    async fn test_health_check_requires_remote_mode() {
        let mut ctrl = SyncController::local_only(InMemoryLocal::new());
        ctrl.initialize().await.unwrap();
        assert!(matches!(
            ctrl.check_connection().await,
            Err(SyncError::NotRemote)
        ));

        let remote = InMemoryRemote::new();
        let mut ctrl = remote_session(&remote);
        ctrl.initialize().await.unwrap();
        ctrl.check_connection().await.unwrap();
        assert!(remote.value_at("/__health/t").is_some());
    }

    #[tokio::test]
    async fn test_shutdown_releases_subscription() {
        let remote = InMemoryRemote::new();
        let mut ctrl = remote_session(&remote);
        ctrl.initialize().await.unwrap();
        assert_eq!(remote.subscriber_count(), 1);

        ctrl.shutdown();
        assert_eq!(remote.subscriber_count(), 0);
        assert!(!ctrl.next_remote_event().await);
    }
}
