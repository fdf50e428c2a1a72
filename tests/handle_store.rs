use examinatord::root::DirectoryHandle;
use examinatord::store::{store_key, DirectoryPermissionRecord, HandleStore};

#[test]
fn key_is_scoped_by_origin() {
    assert_eq!(store_key("osiris.hu.nl"), "downloadFolder_osiris.hu.nl");
}

#[tokio::test]
async fn put_overwrites_and_get_reads_back() {
    let store = HandleStore::in_memory().await.expect("open store");
    assert_eq!(store.get("osiris.hu.nl").await.expect("get"), None);

    let first = DirectoryPermissionRecord::new(DirectoryHandle::fs("/home/a/Downloads"), "osiris.hu.nl");
    store.put("osiris.hu.nl", &first).await.expect("put first");
    let second = DirectoryPermissionRecord::new(DirectoryHandle::fs("/home/a/Rapporten"), "osiris.hu.nl");
    store.put("osiris.hu.nl", &second).await.expect("put second");

    let got = store.get("osiris.hu.nl").await.expect("get").expect("record");
    assert_eq!(got, second);
    assert_eq!(got.name, "Rapporten");
    assert_eq!(store.get("other.example").await.expect("get other"), None);
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("data").join("handles.sqlite3");
    let record = DirectoryPermissionRecord::new(DirectoryHandle::fs(dir.path()), "localhost");
    {
        let store = HandleStore::open(&path).await.expect("open store");
        store.put("localhost", &record).await.expect("put");
    }
    let reopened = HandleStore::open(&path).await.expect("reopen store");
    let got = reopened.get("localhost").await.expect("get").expect("record");
    assert_eq!(got.handle, record.handle);
    assert_eq!(got.created_at, record.created_at);
    assert_eq!(got.origin, "localhost");
}
