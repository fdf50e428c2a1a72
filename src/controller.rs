//! The report automation controller: one instance per session, owning the
//! report config, the live artifact and the download cycle state.
//!
//! Cycle: `request_download` → extension reports `DOWNLOAD_COMPLETED` →
//! (auto) wait for the write to settle, read the file from the permitted
//! folder, or (manual) wait for `process_file`. Both end in the same
//! extract → emit pipeline.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::artifact::{Artifact, ArtifactRef, ArtifactSlot};
use crate::bridge::{BridgeError, ExtensionBridge, ExtensionEvent, ExtensionStatus, ListenerHandle, Outbound};
use crate::extract::{Extractor, SelectorError};
use crate::permission::{GrantOutcome, PermissionGate, PermissionStatus};
use crate::report::ReportConfig;
use crate::root::{self, AcquireError, StorageRoot};
use crate::settings::Settings;
use crate::store::StorageError;
use crate::xlsx::{self, EmitError, XLSX_MIME};

const EVENT_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    AwaitingExtensionDownload,
    AutoProcessing,
    AwaitingManualSelection,
    Processed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub kind: StatusKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ControllerEvent {
    Status { kind: StatusKind, message: String },
    StatusHidden,
    Extension { status: ExtensionStatus },
    Permission { status: PermissionStatus },
    Processed { records: usize, artifact: ArtifactRef },
    NoData,
    ArtifactDownloaded { path: PathBuf },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub phase: Phase,
    pub status: Option<Status>,
    pub extension: ExtensionStatus,
    pub download_enabled: bool,
    pub processing: bool,
    pub artifact: Option<ArtifactRef>,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub records: usize,
    pub artifact: ArtifactRef,
    pub downloaded: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("no examiner data found in the report")]
    NoData,
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Emit(EmitError),
    #[error("failed to save spreadsheet: {0}")]
    Save(String),
    #[error("no spreadsheet available to download")]
    NoArtifact,
    #[error("a newer download request superseded this one")]
    Stale,
}

impl ProcessError {
    pub fn code(&self) -> &'static str {
        match self {
            ProcessError::NoData => "no_data",
            ProcessError::Read { .. } => "read_failed",
            ProcessError::Emit(_) => "emit_failed",
            ProcessError::Save(_) => "save_failed",
            ProcessError::NoArtifact => "no_artifact",
            ProcessError::Stale => "stale",
        }
    }
}

struct State {
    phase: Phase,
    status: Option<Status>,
    extension: ExtensionStatus,
    config: ReportConfig,
    artifact: ArtifactSlot,
    generation: u64,
    processing: bool,
}

struct Inner {
    bridge: ExtensionBridge,
    gate: PermissionGate,
    extractor: Extractor,
    settle_delay: Duration,
    probe_timeout: Duration,
    output_dir: PathBuf,
    output_file_name: String,
    state: Mutex<State>,
    events: broadcast::Sender<ControllerEvent>,
    listener: Mutex<Option<ListenerHandle>>,
}

#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    pub fn new(
        settings: &Settings,
        bridge: ExtensionBridge,
        gate: PermissionGate,
    ) -> Result<Self, SelectorError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                bridge,
                gate,
                extractor: Extractor::new(&settings.markers)?,
                settle_delay: settings.settle_delay(),
                probe_timeout: settings.probe_timeout(),
                output_dir: settings.output_dir.clone(),
                output_file_name: settings.output_file_name.clone(),
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    status: None,
                    extension: ExtensionStatus::Unknown,
                    config: ReportConfig::default(),
                    artifact: ArtifactSlot::new(),
                    generation: 0,
                    processing: false,
                }),
                events,
                listener: Mutex::new(None),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.inner.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.inner.events.subscribe()
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.inner.gate
    }

    /// Registers the session-long extension listener. Calling it again is a no-op.
    pub fn start(&self) {
        let mut slot = self.inner.listener.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = self.inner.bridge.on_message(move |ev| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let ctrl = Controller { inner };
            tokio::spawn(async move { ctrl.handle_extension_event(ev).await });
        });
        *slot = Some(handle);
        drop(slot);
        tracing::debug!("extension listener registered");
        self.hide_status();
    }

    pub fn snapshot(&self) -> Snapshot {
        let st = self.state();
        Snapshot {
            phase: st.phase,
            status: st.status.clone(),
            extension: st.extension.clone(),
            download_enabled: st.artifact.live_count() > 0 && !st.processing,
            processing: st.processing,
            artifact: st.artifact.current().map(|(r, _)| r.clone()),
            generation: st.generation,
        }
    }

    // ---- status ---------------------------------------------------------

    /// Replaces the current status; statuses never accumulate.
    pub fn set_status(&self, kind: StatusKind, message: impl Into<String>) {
        let message = message.into();
        self.state().status = Some(Status {
            kind,
            message: message.clone(),
        });
        match kind {
            StatusKind::Error => tracing::warn!(%message, "status"),
            _ => tracing::info!(%message, "status"),
        }
        self.emit(ControllerEvent::Status { kind, message });
    }

    pub fn hide_status(&self) {
        self.state().status = None;
        self.emit(ControllerEvent::StatusHidden);
    }

    // ---- report config --------------------------------------------------

    pub fn config(&self) -> ReportConfig {
        self.state().config.clone()
    }

    pub fn set_config(&self, config: ReportConfig) {
        self.state().config = config;
    }

    pub fn update_config<R>(&self, f: impl FnOnce(&mut ReportConfig) -> R) -> R {
        f(&mut self.state().config)
    }

    // ---- extension & permission ----------------------------------------

    /// Asks the extension for its version. A timeout never marks it installed,
    /// and never downgrades an extension that already answered once.
    pub async fn probe_extension(&self) -> ExtensionStatus {
        let probed = self.inner.bridge.probe_version(self.inner.probe_timeout).await;
        let status = {
            let mut st = self.state();
            let known = matches!(st.extension, ExtensionStatus::Installed { .. });
            match probed {
                ExtensionStatus::Installed { .. } => st.extension = probed,
                _ if known => {}
                _ => st.extension = ExtensionStatus::NotInstalled,
            }
            st.extension.clone()
        };
        self.emit(ControllerEvent::Extension {
            status: status.clone(),
        });
        status
    }

    /// Re-derives the permission status (startup, focus regain) and publishes it.
    pub async fn refresh_permission(&self) -> PermissionStatus {
        let status = self.inner.gate.status().await;
        if let PermissionStatus::Expired { name } = &status {
            tracing::warn!(folder = %name, "download folder permission expired");
            self.set_status(
                StatusKind::Warning,
                format!("Toestemming voor de downloadmap {name} is verlopen. Kies de map opnieuw."),
            );
        }
        self.emit(ControllerEvent::Permission {
            status: status.clone(),
        });
        status
    }

    pub async fn grant_permission(&self, dir: &Path) -> Result<GrantOutcome, StorageError> {
        let outcome = self.inner.gate.grant(dir).await?;
        self.refresh_permission().await;
        Ok(outcome)
    }

    // ---- download cycle -------------------------------------------------

    /// Starts a new cycle and asks the extension to fetch the report.
    pub fn request_download(&self) -> Result<u64, BridgeError> {
        let (generation, config) = {
            let mut st = self.state();
            st.generation += 1;
            st.phase = Phase::AwaitingExtensionDownload;
            (st.generation, st.config.clone())
        };
        self.set_status(
            StatusKind::Info,
            "Bezig met automatisch downloaden van rapport via de Osiris extensie...",
        );
        if let Err(e) = self
            .inner
            .bridge
            .send(&Outbound::NavigateAndOpenReport(config))
        {
            self.state().phase = Phase::Idle;
            self.set_status(StatusKind::Error, format!("Fout bij versturen naar extensie: {e}"));
            return Err(e);
        }
        tracing::info!(generation, "download requested");
        Ok(generation)
    }

    pub async fn handle_extension_event(&self, event: ExtensionEvent) {
        match event {
            ExtensionEvent::DownloadCompleted { filename } => {
                self.on_download_completed(filename).await
            }
            ExtensionEvent::DownloadError { error } => self.on_download_error(error),
            ExtensionEvent::Version(v) => {
                tracing::debug!(version = %v, "version reply outside a probe")
            }
            ExtensionEvent::Unknown(payload) => {
                tracing::debug!(%payload, "unknown message from extension relay")
            }
        }
    }

    /// Moves out of `AwaitingExtensionDownload` exactly once per cycle.
    fn claim_completion(&self, next: Phase) -> Option<u64> {
        let mut st = self.state();
        if st.phase != Phase::AwaitingExtensionDownload {
            tracing::warn!(phase = ?st.phase, "extension result without a pending request, ignored");
            return None;
        }
        st.phase = next;
        Some(st.generation)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state().generation == generation
    }

    fn on_download_error(&self, error: Option<String>) {
        if self.claim_completion(Phase::Idle).is_none() {
            return;
        }
        self.set_status(
            StatusKind::Error,
            format!(
                "Fout bij downloaden via extensie: {}",
                error.as_deref().unwrap_or("Onbekende fout")
            ),
        );
    }

    async fn on_download_completed(&self, filename: Option<String>) {
        let Some(filename) = filename else {
            if self.claim_completion(Phase::AwaitingManualSelection).is_some() {
                self.set_status(
                    StatusKind::Error,
                    "Download voltooid, maar bestandsnaam niet ontvangen. Controleer je downloadmap.",
                );
            }
            return;
        };
        let Some(generation) = self.claim_completion(Phase::AutoProcessing) else {
            return;
        };

        let root = self.inner.gate.granted_root().await;
        if !self.is_current(generation) {
            return;
        }
        let Some(root) = root else {
            self.state().phase = Phase::AwaitingManualSelection;
            self.set_status(
                StatusKind::Info,
                format!("Download van {filename} voltooid. Selecteer het bestand handmatig."),
            );
            return;
        };

        self.set_status(StatusKind::Success, format!("Download van {filename} voltooid."));
        tokio::time::sleep(self.inner.settle_delay).await;
        if !self.is_current(generation) {
            tracing::debug!(generation, "settled download superseded by a newer request");
            return;
        }
        self.auto_process(root, &filename, generation).await;
    }

    async fn auto_process(&self, root: Arc<dyn StorageRoot>, reported: &str, generation: u64) {
        match root::acquire(root.as_ref(), Some(reported)).await {
            Ok((name, bytes)) => {
                tracing::info!(file = %name, bytes = bytes.len(), "picked up report from download folder");
                // Failures are already reported through the status.
                let _ = self.run_pipeline(&bytes, Some(generation)).await;
            }
            Err(e) => {
                if !self.is_current(generation) {
                    return;
                }
                tracing::warn!(error = %e, code = e.code(), "automatic pickup failed");
                self.state().phase = Phase::Idle;
                self.set_status(StatusKind::Error, acquire_message(&e));
            }
        }
    }

    // ---- processing -----------------------------------------------------

    /// Manual selection: process a report the user picked.
    pub async fn process_file(&self, path: &Path) -> Result<ProcessOutcome, ProcessError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(source) => {
                let e = ProcessError::Read {
                    path: path.to_string_lossy().to_string(),
                    source,
                };
                self.fail_processing(&e);
                return Err(e);
            }
        };
        self.run_pipeline(&bytes, None).await
    }

    pub async fn process_bytes(&self, bytes: &[u8]) -> Result<ProcessOutcome, ProcessError> {
        self.run_pipeline(bytes, None).await
    }

    async fn run_pipeline(
        &self,
        bytes: &[u8],
        generation: Option<u64>,
    ) -> Result<ProcessOutcome, ProcessError> {
        self.state().processing = true;

        let text = String::from_utf8_lossy(bytes);
        let records = self.inner.extractor.extract(&text);
        let workbook = match xlsx::emit(&records) {
            Ok(b) => b,
            Err(_) if self.state().superseded(generation) => return Err(ProcessError::Stale),
            Err(EmitError::NoData) => {
                self.reset_ui(Phase::Idle);
                self.set_status(StatusKind::Error, "Geen gegevens gevonden in het rapport.");
                self.emit(ControllerEvent::NoData);
                return Err(ProcessError::NoData);
            }
            Err(e) => {
                let e = ProcessError::Emit(e);
                self.fail_processing(&e);
                return Err(e);
            }
        };

        let artifact = {
            let mut st = self.state();
            if st.superseded(generation) {
                return Err(ProcessError::Stale);
            }
            let r = st.artifact.replace(Artifact::new(
                self.inner.output_file_name.clone(),
                XLSX_MIME,
                workbook,
            ));
            st.leave_phase(Phase::Processed);
            st.processing = false;
            r
        };
        self.set_status(
            StatusKind::Success,
            format!("Rapport verwerkt: {} regels.", records.len()),
        );
        self.emit(ControllerEvent::Processed {
            records: records.len(),
            artifact: artifact.clone(),
        });

        let mut downloaded = None;
        if self.inner.gate.is_auto_capable().await {
            match self.download_artifact().await {
                Ok(path) => downloaded = Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, "automatic download failed");
                    self.set_status(StatusKind::Error, format!("Automatisch downloaden mislukt: {e}"));
                }
            }
        }

        Ok(ProcessOutcome {
            records: records.len(),
            artifact,
            downloaded,
        })
    }

    /// Saves the live spreadsheet into the output directory.
    pub async fn download_artifact(&self) -> Result<PathBuf, ProcessError> {
        let artifact = self.state().artifact.current().map(|(_, a)| a.clone());
        let artifact = artifact.ok_or(ProcessError::NoArtifact)?;
        let path = artifact
            .save_to(&self.inner.output_dir)
            .await
            .map_err(|e| ProcessError::Save(format!("{e:#}")))?;
        tracing::info!(path = %path.to_string_lossy(), "spreadsheet written");
        self.emit(ControllerEvent::ArtifactDownloaded { path: path.clone() });
        Ok(path)
    }

    fn fail_processing(&self, e: &ProcessError) {
        tracing::error!(error = %e, "processing failed");
        self.reset_ui(Phase::Idle);
        self.set_status(
            StatusKind::Error,
            format!("Fout bij verwerken van het bestand: {e}"),
        );
    }

    /// Back to a ready state: no artifact, download disabled, indicator hidden.
    fn reset_ui(&self, phase: Phase) {
        let mut st = self.state();
        if let Some(old) = st.artifact.release() {
            tracing::debug!(artifact = %old, "released artifact");
        }
        st.processing = false;
        st.leave_phase(phase);
    }
}

impl State {
    /// True when an automatic run belongs to a superseded cycle. Such a run
    /// must leave phase, status and artifact to the newer cycle.
    fn superseded(&mut self, generation: Option<u64>) -> bool {
        if generation.is_some_and(|g| g != self.generation) {
            self.processing = false;
            tracing::debug!(?generation, current = self.generation, "dropping superseded result");
            return true;
        }
        false
    }

    /// Processing never ends a pending extension request; only the
    /// extension's own completion or error message does.
    fn leave_phase(&mut self, next: Phase) {
        if self.phase != Phase::AwaitingExtensionDownload {
            self.phase = next;
        }
    }
}

fn acquire_message(e: &AcquireError) -> String {
    match e {
        AcquireError::MissingName => {
            "Download voltooid, maar bestandsnaam niet ontvangen. Controleer je downloadmap.".to_string()
        }
        AcquireError::NotFound(name) => format!(
            "Bestand {name} niet gevonden in de downloadmap. Selecteer het bestand handmatig."
        ),
        AcquireError::UnsupportedType(name) => format!(
            "Bestand {name} is geen HTML-rapport. Selecteer het bestand handmatig."
        ),
        AcquireError::AccessDenied => {
            "Geen toegang tot de downloadmap. Geef opnieuw toestemming of selecteer het bestand handmatig.".to_string()
        }
        AcquireError::Read { name, source } => format!(
            "Bestand {name} kon niet worden gelezen ({source}). Selecteer het bestand handmatig."
        ),
    }
}
