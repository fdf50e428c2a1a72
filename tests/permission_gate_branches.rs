use async_trait::async_trait;
use examinatord::permission::{GrantOutcome, PermissionGate, PermissionStatus};
use examinatord::root::{
    AcquireError, DirectoryHandle, FsRootProvider, PermissionState, RootProvider, StorageRoot,
};
use examinatord::store::{DirectoryPermissionRecord, HandleStore};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Directory whose permission state the test flips at will.
struct FakeRoot {
    state: Arc<Mutex<Option<PermissionState>>>,
}

#[async_trait]
impl StorageRoot for FakeRoot {
    fn name(&self) -> String {
        "Downloads".to_string()
    }

    async fn check_access(&self) -> anyhow::Result<PermissionState> {
        match *self.state.lock().unwrap() {
            Some(s) => Ok(s),
            None => anyhow::bail!("handle revoked"),
        }
    }

    async fn resolve(&self, file_name: &str) -> Result<Vec<u8>, AcquireError> {
        Err(AcquireError::NotFound(file_name.to_string()))
    }
}

struct FakeProvider {
    state: Arc<Mutex<Option<PermissionState>>>,
}

impl RootProvider for FakeProvider {
    fn supports_directory_access(&self) -> bool {
        true
    }

    fn open(&self, _handle: &DirectoryHandle) -> Arc<dyn StorageRoot> {
        Arc::new(FakeRoot {
            state: self.state.clone(),
        })
    }
}

async fn gate_with(state: Option<PermissionState>) -> (PermissionGate, Arc<Mutex<Option<PermissionState>>>) {
    let shared = Arc::new(Mutex::new(state));
    let provider = Arc::new(FakeProvider {
        state: shared.clone(),
    });
    let store = HandleStore::in_memory().await.expect("store");
    (PermissionGate::new(store, provider, "osiris.hu.nl"), shared)
}

#[tokio::test]
async fn unsupported_runtime_is_never_auto_capable() {
    let store = HandleStore::in_memory().await.expect("store");
    let record = DirectoryPermissionRecord::new(DirectoryHandle::fs("/tmp"), "osiris.hu.nl");
    store.put("osiris.hu.nl", &record).await.expect("put");
    let gate = PermissionGate::new(store, Arc::new(FsRootProvider::new(false)), "osiris.hu.nl");

    assert!(!gate.is_auto_capable().await);
    assert_eq!(gate.status().await, PermissionStatus::Unsupported);
    assert_eq!(
        gate.grant(Path::new("/tmp")).await.expect("grant"),
        GrantOutcome::Unsupported
    );
}

#[tokio::test]
async fn nothing_stored_means_not_selected() {
    let (gate, _) = gate_with(Some(PermissionState::Granted)).await;
    assert!(!gate.is_auto_capable().await);
    assert_eq!(gate.status().await, PermissionStatus::NotSelected);
}

#[tokio::test]
async fn stored_grant_is_rechecked_every_time() {
    let (gate, state) = gate_with(Some(PermissionState::Granted)).await;
    match gate.grant(Path::new("/home/a/Downloads")).await.expect("grant") {
        GrantOutcome::Granted(record) => assert_eq!(record.name, "Downloads"),
        other => panic!("expected grant, got {:?}", other),
    }
    assert!(gate.is_auto_capable().await);
    assert!(matches!(gate.status().await, PermissionStatus::Granted { .. }));

    *state.lock().unwrap() = Some(PermissionState::Prompt);
    assert!(!gate.is_auto_capable().await);
    assert_eq!(
        gate.status().await,
        PermissionStatus::Expired {
            name: "Downloads".to_string()
        }
    );

    *state.lock().unwrap() = None;
    assert!(gate.granted_root().await.is_none());

    *state.lock().unwrap() = Some(PermissionState::Granted);
    assert!(gate.is_auto_capable().await);
}

#[tokio::test]
async fn denied_request_is_not_persisted() {
    let (gate, state) = gate_with(Some(PermissionState::Denied)).await;
    assert_eq!(
        gate.grant(Path::new("/home/a/Downloads")).await.expect("grant"),
        GrantOutcome::Denied(PermissionState::Denied)
    );
    *state.lock().unwrap() = Some(PermissionState::Granted);
    assert_eq!(gate.status().await, PermissionStatus::NotSelected);
}

#[tokio::test]
async fn filesystem_root_reads_exact_names_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("rapport.html"), "<html></html>").expect("write report");
    let store = HandleStore::in_memory().await.expect("store");
    let gate = PermissionGate::new(store, Arc::new(FsRootProvider::new(true)), "localhost");
    assert!(matches!(
        gate.grant(dir.path()).await.expect("grant"),
        GrantOutcome::Granted(_)
    ));

    let root = gate.granted_root().await.expect("granted root");
    let (name, bytes) = examinatord::root::acquire(root.as_ref(), Some("C:\\Users\\a\\Downloads\\rapport.html?x=1"))
        .await
        .expect("acquire");
    assert_eq!(name, "rapport.html");
    assert_eq!(bytes, b"<html></html>");

    let missing = examinatord::root::acquire(root.as_ref(), Some("../rapport.html/other.html")).await;
    assert!(matches!(missing, Err(AcquireError::NotFound(n)) if n == "other.html"));
    let wrong = examinatord::root::acquire(root.as_ref(), Some("rapport.pdf")).await;
    assert!(matches!(wrong, Err(AcquireError::UnsupportedType(_))));
    let none = examinatord::root::acquire(root.as_ref(), None).await;
    assert!(matches!(none, Err(AcquireError::MissingName)));
}
