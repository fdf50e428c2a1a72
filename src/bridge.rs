//! Message protocol between the page side and the browser extension.
//!
//! Both directions travel one broadcast channel as `{source, payload}`
//! envelopes. The source tag (plus an optional session token) is the only
//! thing that separates extension traffic from everything else on it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::report::ReportConfig;

pub const MSG_VERSION: &str = "VERSION";
pub const MSG_NAVIGATE_AND_OPEN_REPORT: &str = "NAVIGATE_AND_OPEN_REPORT";
pub const MSG_DOWNLOAD_COMPLETED: &str = "DOWNLOAD_COMPLETED";
pub const MSG_DOWNLOAD_ERROR: &str = "DOWNLOAD_ERROR";

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// Commands the page sends to the extension.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Version,
    NavigateAndOpenReport(ReportConfig),
}

impl Outbound {
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Version => MSG_VERSION,
            Outbound::NavigateAndOpenReport(_) => MSG_NAVIGATE_AND_OPEN_REPORT,
        }
    }

    fn to_payload(&self) -> Result<Value, BridgeError> {
        Ok(match self {
            Outbound::Version => json!({ "type": MSG_VERSION }),
            Outbound::NavigateAndOpenReport(cfg) => json!({
                "type": MSG_NAVIGATE_AND_OPEN_REPORT,
                "reportConfig": serde_json::to_value(cfg)?,
            }),
        })
    }
}

/// Events received from the extension.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionEvent {
    Version(String),
    DownloadCompleted { filename: Option<String> },
    DownloadError { error: Option<String> },
    Unknown(Value),
}

impl ExtensionEvent {
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let obj = payload.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };
        Some(match obj.get("type").and_then(|v| v.as_str()) {
            Some(MSG_DOWNLOAD_COMPLETED) => ExtensionEvent::DownloadCompleted {
                filename: text("filename"),
            },
            Some(MSG_DOWNLOAD_ERROR) => ExtensionEvent::DownloadError {
                error: text("error"),
            },
            // Older relays answer the probe with a bare `{version}`.
            Some(MSG_VERSION) | None => match text("version") {
                Some(v) => ExtensionEvent::Version(v),
                None => ExtensionEvent::Unknown(payload.clone()),
            },
            Some(_) => ExtensionEvent::Unknown(payload.clone()),
        })
    }
}

/// The probe only cares whether a reply names a version, whatever its type.
fn version_of(payload: &Value) -> Option<String> {
    payload
        .get("version")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ExtensionStatus {
    Unknown,
    Installed { version: String },
    NotInstalled,
}

/// The shared message bus. Everyone can post, everyone sees everything.
#[derive(Clone)]
pub struct MessageChannel {
    tx: broadcast::Sender<Envelope>,
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn post(&self, envelope: Envelope) {
        // No subscribers just means nobody is listening; posting stays fire-and-forget.
        let _ = self.tx.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub page_source: String,
    pub extension_source: String,
    pub require_session: bool,
}

#[derive(Clone)]
pub struct ExtensionBridge {
    channel: MessageChannel,
    config: BridgeConfig,
    session: String,
}

/// A running inbound listener. Dropping the handle leaves it running.
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl ExtensionBridge {
    pub fn new(channel: MessageChannel, config: BridgeConfig) -> Self {
        Self {
            channel,
            config,
            session: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub fn send(&self, msg: &Outbound) -> Result<(), BridgeError> {
        let payload = msg.to_payload()?;
        tracing::debug!(kind = msg.kind(), "posting message to extension");
        self.channel.post(Envelope {
            source: self.config.page_source.clone(),
            session: Some(self.session.clone()),
            payload,
        });
        Ok(())
    }

    /// True for traffic that claims to come from the extension.
    pub fn accepts(&self, envelope: &Envelope) -> bool {
        if envelope.source != self.config.extension_source {
            return false;
        }
        if self.config.require_session {
            return envelope.session.as_deref() == Some(self.session.as_str());
        }
        true
    }

    /// Registers a persistent listener for extension events.
    pub fn on_message<F>(&self, handler: F) -> ListenerHandle
    where
        F: Fn(ExtensionEvent) + Send + Sync + 'static,
    {
        let mut rx = self.channel.subscribe();
        let bridge = self.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(env) => {
                        if !bridge.accepts(&env) {
                            continue;
                        }
                        match ExtensionEvent::from_payload(&env.payload) {
                            Some(ev) => handler(ev),
                            None => tracing::debug!("ignoring extension message without payload"),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "extension listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        ListenerHandle { task }
    }

    /// Sends `VERSION` and waits for the first reply. Whichever comes first,
    /// reply or timeout, wins; the other side is dropped.
    pub async fn probe_version(&self, timeout: Duration) -> ExtensionStatus {
        let mut rx = self.channel.subscribe();
        if let Err(e) = self.send(&Outbound::Version) {
            tracing::warn!(error = %e, "version probe not sent");
            return ExtensionStatus::NotInstalled;
        }

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(env) if self.accepts(&env) => {
                        if let Some(v) = version_of(&env.payload) {
                            return Some(v);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Some(version)) => {
                tracing::info!(%version, "extension responded");
                ExtensionStatus::Installed { version }
            }
            Ok(None) | Err(_) => {
                tracing::warn!("no response from extension, assuming it is not installed");
                ExtensionStatus::NotInstalled
            }
        }
    }
}
