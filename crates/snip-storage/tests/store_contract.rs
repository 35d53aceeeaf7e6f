//! Behaviour every backend must share, checked against the backends that
//! need no external service.

use snip_core::{NewLink, OwnerId, ShortCode};
use snip_storage::{FileStore, LinkStore, MemoryStore, StorageError};
use tempfile::TempDir;

fn code(url: &str) -> ShortCode {
    ShortCode::from_url(url)
}

async fn idempotent_save<S: LinkStore>(store: &S) {
    let first = store
        .save("https://ya.ru", &code("https://ya.ru"), Some(&OwnerId::random()))
        .await
        .unwrap();
    let second = store
        .save("https://ya.ru", &code("https://ya.ru"), Some(&OwnerId::random()))
        .await
        .unwrap_err();

    assert_eq!(first.as_str(), "6YGS4ZUF");
    assert_eq!(second.conflict_code(), Some(first.as_str()));
}

async fn symmetric_lookup<S: LinkStore>(store: &S) {
    let urls = [
        "https://example.com",
        "https://example.com/path?query=1",
        "http://localhost:8080/a/b",
    ];
    for url in urls {
        store.save(url, &code(url), None).await.unwrap();
    }

    for url in urls {
        let short = store.get(url).await.unwrap().expect("code for url");
        assert_eq!(short, code(url).as_str());
        assert_eq!(store.get(&short).await.unwrap().as_deref(), Some(url));
    }
}

async fn soft_delete<S: LinkStore>(store: &S) {
    let owner = OwnerId::random();
    let stranger = OwnerId::random();
    let url = "https://delete.example";
    store.save(url, &code(url), Some(&owner)).await.unwrap();

    // someone else's codes are left alone, silently
    assert_eq!(store.delete_batch(&stranger, &[code(url)]).await.unwrap(), 0);
    assert_eq!(store.get(url).await.unwrap().as_deref(), Some(code(url).as_str()));

    assert_eq!(store.delete_batch(&owner, &[code(url)]).await.unwrap(), 1);
    assert!(matches!(
        store.get(code(url).as_str()).await,
        Err(StorageError::AlreadyDeleted(_))
    ));

    // a second delete changes nothing
    assert_eq!(store.delete_batch(&owner, &[code(url)]).await.unwrap(), 0);
    assert!(matches!(
        store.get(code(url).as_str()).await,
        Err(StorageError::AlreadyDeleted(_))
    ));
    assert_eq!(store.stats().await.unwrap().urls, 0);
}

async fn batch_atomicity<S: LinkStore>(store: &S) {
    let owner = OwnerId::random();
    let links = vec![
        NewLink::new(code("https://one.example"), "https://one.example"),
        NewLink::new(code("https://two.example"), "https://two.example"),
        NewLink::new(code("https://one.example"), "https://one.example"),
    ];

    assert!(store.save_batch(&links, Some(&owner)).await.is_err());

    assert!(store.get("https://one.example").await.unwrap().is_none());
    assert!(store.get("https://two.example").await.unwrap().is_none());
    assert!(store.get_all_by_owner(&owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn memory_store_idempotent_save() {
    idempotent_save(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_store_symmetric_lookup() {
    symmetric_lookup(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_store_soft_delete() {
    soft_delete(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_store_batch_atomicity() {
    batch_atomicity(&MemoryStore::new()).await;
}

async fn file_store(dir: &TempDir) -> FileStore {
    FileStore::open(dir.path().join("storage").join("urls.json"))
        .await
        .unwrap()
}

#[tokio::test]
async fn file_store_idempotent_save() {
    let dir = TempDir::new().unwrap();
    idempotent_save(&file_store(&dir).await).await;
}

#[tokio::test]
async fn file_store_symmetric_lookup() {
    let dir = TempDir::new().unwrap();
    symmetric_lookup(&file_store(&dir).await).await;
}

#[tokio::test]
async fn file_store_soft_delete() {
    let dir = TempDir::new().unwrap();
    soft_delete(&file_store(&dir).await).await;
}

#[tokio::test]
async fn file_store_batch_atomicity() {
    let dir = TempDir::new().unwrap();
    batch_atomicity(&file_store(&dir).await).await;
}
