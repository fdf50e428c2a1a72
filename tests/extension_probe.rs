use examinatord::bridge::{
    BridgeConfig, Envelope, ExtensionBridge, ExtensionEvent, ExtensionStatus, MessageChannel, Outbound,
};
use examinatord::report::ReportConfig;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

const PROBE_TIMEOUT: Duration = Duration::from_millis(200);

fn bridge(require_session: bool) -> ExtensionBridge {
    ExtensionBridge::new(
        MessageChannel::new(),
        BridgeConfig {
            page_source: "osiris-web".to_string(),
            extension_source: "osiris-extension".to_string(),
            require_session,
        },
    )
}

/// Answers every VERSION request on the channel with `source`, optionally
/// echoing the session token.
fn fake_extension(channel: &MessageChannel, source: &'static str, echo_session: bool) {
    let mut rx = channel.subscribe();
    let tx = channel.clone();
    tokio::spawn(async move {
        while let Ok(env) = rx.recv().await {
            if env.source != "osiris-web" || env.payload["type"] != "VERSION" {
                continue;
            }
            tx.post(Envelope {
                source: source.to_string(),
                session: if echo_session { env.session.clone() } else { None },
                payload: json!({ "version": "1.4.2" }),
            });
        }
    });
}

#[tokio::test]
async fn silent_channel_means_not_installed() {
    let b = bridge(false);
    assert_eq!(b.probe_version(PROBE_TIMEOUT).await, ExtensionStatus::NotInstalled);
}

#[tokio::test]
async fn reply_marks_extension_installed() {
    let b = bridge(false);
    fake_extension(b.channel(), "osiris-extension", false);
    assert_eq!(
        b.probe_version(PROBE_TIMEOUT).await,
        ExtensionStatus::Installed {
            version: "1.4.2".to_string()
        }
    );
}

#[tokio::test]
async fn replies_from_other_sources_are_ignored() {
    let b = bridge(false);
    fake_extension(b.channel(), "some-other-script", false);
    assert_eq!(b.probe_version(PROBE_TIMEOUT).await, ExtensionStatus::NotInstalled);
}

#[tokio::test]
async fn session_token_is_enforced_when_required() {
    let strict = bridge(true);
    fake_extension(strict.channel(), "osiris-extension", false);
    assert_eq!(strict.probe_version(PROBE_TIMEOUT).await, ExtensionStatus::NotInstalled);

    let strict = bridge(true);
    fake_extension(strict.channel(), "osiris-extension", true);
    assert!(matches!(
        strict.probe_version(PROBE_TIMEOUT).await,
        ExtensionStatus::Installed { .. }
    ));
}

#[tokio::test]
async fn download_request_carries_report_config() {
    let b = bridge(false);
    let mut rx = b.channel().subscribe();
    b.send(&Outbound::NavigateAndOpenReport(ReportConfig::default()))
        .expect("send");
    let env = rx.recv().await.expect("envelope");
    assert_eq!(env.source, "osiris-web");
    assert_eq!(env.session.as_deref(), Some(b.session()));
    assert_eq!(env.payload["type"], "NAVIGATE_AND_OPEN_REPORT");
    assert_eq!(env.payload["reportConfig"]["reportname"], "9.1.06");
    assert_eq!(env.payload["reportConfig"]["filters"][0]["tab"], "docent");
}

#[tokio::test]
async fn listener_sees_only_extension_events() {
    let b = bridge(false);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = b.on_message(move |ev| {
        let _ = tx.send(ev);
    });

    let channel = b.channel().clone();
    channel.post(Envelope {
        source: "osiris-web".to_string(),
        session: None,
        payload: json!({ "type": "DOWNLOAD_COMPLETED", "filename": "ignored.html" }),
    });
    channel.post(Envelope {
        source: "osiris-extension".to_string(),
        session: None,
        payload: json!({ "type": "DOWNLOAD_ERROR" }),
    });
    channel.post(Envelope {
        source: "osiris-extension".to_string(),
        session: None,
        payload: json!({ "type": "DOWNLOAD_COMPLETED", "filename": "rapport.html" }),
    });

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("first event")
        .expect("channel open");
    assert_eq!(first, ExtensionEvent::DownloadError { error: None });
    let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("second event")
        .expect("channel open");
    assert_eq!(
        second,
        ExtensionEvent::DownloadCompleted {
            filename: Some("rapport.html".to_string())
        }
    );
    handle.abort();
}

#[test]
fn payload_classification() {
    assert_eq!(
        ExtensionEvent::from_payload(&json!({ "type": "VERSION", "version": "2.0" })),
        Some(ExtensionEvent::Version("2.0".to_string()))
    );
    assert_eq!(
        ExtensionEvent::from_payload(&json!({ "type": "DOWNLOAD_COMPLETED", "filename": "" })),
        Some(ExtensionEvent::DownloadCompleted { filename: None })
    );
    assert_eq!(
        ExtensionEvent::from_payload(&json!({ "version": "1.0" })),
        Some(ExtensionEvent::Version("1.0".to_string()))
    );
    assert!(matches!(
        ExtensionEvent::from_payload(&json!({ "type": "PING" })),
        Some(ExtensionEvent::Unknown(_))
    ));
    assert!(matches!(
        ExtensionEvent::from_payload(&json!({ "type": "PING", "version": "1.0" })),
        Some(ExtensionEvent::Unknown(_))
    ));
    assert_eq!(ExtensionEvent::from_payload(&json!("VERSION")), None);
}

#[test]
fn completion_that_also_names_a_version_stays_a_completion() {
    assert_eq!(
        ExtensionEvent::from_payload(&json!({
            "type": "DOWNLOAD_COMPLETED",
            "filename": "r.html",
            "version": "1.4.2"
        })),
        Some(ExtensionEvent::DownloadCompleted {
            filename: Some("r.html".to_string())
        })
    );
    assert_eq!(
        ExtensionEvent::from_payload(&json!({ "type": "DOWNLOAD_ERROR", "version": "1.4.2" })),
        Some(ExtensionEvent::DownloadError { error: None })
    );
}

#[tokio::test]
async fn typed_reply_with_version_still_answers_the_probe() {
    let b = bridge(false);
    let mut rx = b.channel().subscribe();
    let tx = b.channel().clone();
    tokio::spawn(async move {
        while let Ok(env) = rx.recv().await {
            if env.source == "osiris-web" && env.payload["type"] == "VERSION" {
                tx.post(Envelope {
                    source: "osiris-extension".to_string(),
                    session: None,
                    payload: json!({ "type": "VERSION_RESPONSE", "version": "2.0.1" }),
                });
            }
        }
    });
    assert_eq!(
        b.probe_version(PROBE_TIMEOUT).await,
        ExtensionStatus::Installed {
            version: "2.0.1".to_string()
        }
    );
}
