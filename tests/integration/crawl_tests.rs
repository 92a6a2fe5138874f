//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run full crawl
//! cycles end-to-end against a real SQLite database.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use tidemark::archive::{BlobStore, ContentDigest, FsBlobStore, MemoryBlobStore};
use tidemark::config::{parse_config, Config};
use tidemark::crawler::Coordinator;
use tidemark::storage::{
    now_seconds, LinkStore, SnapshotStore, SqliteStorage, UrlRecord, UrlStore,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHARED_BODY: &str = "<html><body>Same bytes on two URLs</body></html>";

/// Creates a test configuration crawling `seed`, storing under `dir`
fn create_test_config(seed: &str, dir: &TempDir, max_cycles: u32) -> Config {
    let toml = format!(
        r#"
[crawler]
max-concurrent-fetches = 4
fetch-timeout-secs = 5
cycle-interval-secs = 1
max-cycles = {max_cycles}

[frontier]
stale-duration-secs = 3600
batch-size = 2
seeds = ["{seed}"]

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{db}"
blob-path = "{blobs}"
"#,
        max_cycles = max_cycles,
        seed = seed,
        db = dir.path().join("archive.db").display(),
        blobs = dir.path().join("blobs").display(),
    );

    parse_config(&toml).expect("test config should be valid")
}

async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(
                    r##"<html><head><title>Home</title></head><body>
                    <a href="/page1">Page 1</a>
                    <a href="page2">Page 2</a>
                    <a href="#top">Top</a>
                    <a href="mailto:someone@example.com">Mail</a>
                    </body></html>"##,
                    "text/html; charset=utf-8",
                ),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(SHARED_BODY, "text/html"),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(SHARED_BODY, "text/plain"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_archives_and_links() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/", server.uri());
    let config = create_test_config(&seed, &dir, 2);

    let blobs = Arc::new(MemoryBlobStore::new());
    let store: Arc<dyn BlobStore> = blobs.clone();
    let storage = SqliteStorage::new(&dir.path().join("archive.db")).unwrap();
    let coordinator = Coordinator::with_parts(config, storage, store).unwrap();

    // First cycle fetches the seed, second fetches what it discovered
    coordinator.run().await.unwrap();

    let page1 = format!("{}/page1", server.uri());
    let page2 = format!("{}/page2", server.uri());

    let storage = coordinator.storage();
    let storage = storage.lock().unwrap();

    assert_eq!(storage.count_urls().unwrap(), 3);
    assert_eq!(storage.count_fetched_urls().unwrap(), 3);
    assert_eq!(storage.count_snapshots().unwrap(), 3);
    assert_eq!(storage.count_failed_snapshots().unwrap(), 0);

    let home = storage.get_url(&seed).unwrap();
    assert_eq!(home.title, "Home");
    assert_eq!(home.status, Some(200));
    assert!(home.content_type.starts_with("text/html"));

    // Self link from the fragment-only href, mailto skipped
    assert_eq!(
        storage.outbound_link_urls(&seed).unwrap(),
        vec![seed.clone(), page1.clone(), page2.clone()]
    );
    assert_eq!(storage.count_links().unwrap(), 3);

    // Identical bodies share one blob and one hash
    let shared = ContentDigest::compute(SHARED_BODY.as_bytes());
    assert_eq!(blobs.len(), 2);
    assert!(blobs.keys().contains(&shared.blob_key().to_string()));
    assert_eq!(storage.urls_for_hash(&shared).unwrap(), vec![page1.clone(), page2.clone()]);

    let page1_snapshots = storage.snapshots_for_url(&page1).unwrap();
    let page2_snapshots = storage.snapshots_for_url(&page2).unwrap();
    assert_eq!(page1_snapshots[0].hash, page2_snapshots[0].hash);
    assert_eq!(page1_snapshots[0].hash, Some(shared));

    // Plain text is archived but not parsed
    assert_eq!(storage.get_url(&page2).unwrap().title, "");
    assert!(storage.outbound_link_urls(&page2).unwrap().is_empty());
}

#[tokio::test]
async fn test_fresh_urls_are_not_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><title>Only</title></html>", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/", server.uri());
    let coordinator = Coordinator::new(create_test_config(&seed, &dir, 1)).unwrap();

    let first = coordinator.run_cycle().await.unwrap();
    let second = coordinator.run_cycle().await.unwrap();

    assert_eq!(first.dispatched, 1);
    assert_eq!(first.succeeded, 1);
    assert_eq!(second.dispatched, 0);

    // Seeded and fetched within one second: no follow-up HEAD either
    {
        let storage = coordinator.storage();
        let storage = storage.lock().unwrap();
        let seeded = storage.get_url(&seed).unwrap();
        assert!(seeded.updated > seeded.created);
        assert_eq!(seeded.status, Some(200));
        assert_eq!(seeded.title, "Only");

        let snapshots = storage.snapshots_for_url(&seed).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].status, Some(200));
    }

    // Content landed on disk under its blob key
    let digest = ContentDigest::compute(b"<html><title>Only</title></html>");
    let on_disk = FsBlobStore::new(dir.path().join("blobs")).unwrap();
    assert!(on_disk.exists(digest.blob_key()).unwrap());
    assert_eq!(
        coordinator.archiver().retrieve(&digest).unwrap(),
        b"<html><title>Only</title></html>"
    );
}

#[tokio::test]
async fn test_connection_failure_leaves_record_and_logs_snapshot() {
    let dir = TempDir::new().unwrap();
    let seed = "http://127.0.0.1:1/";
    let coordinator = Coordinator::new(create_test_config(seed, &dir, 1)).unwrap();

    let before = coordinator.storage().lock().unwrap().get_url(seed).unwrap();

    let summary = coordinator.run_cycle().await.unwrap();
    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.failed, 1);

    {
        let storage = coordinator.storage();
        let storage = storage.lock().unwrap();

        assert_eq!(storage.get_url(seed).unwrap(), before);

        let snapshots = storage.snapshots_for_url(seed).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].status, None);
        assert_eq!(snapshots[0].hash, None);
        assert_eq!(storage.count_failed_snapshots().unwrap(), 1);
    }

    // Still never fetched, so the next cycle retries it
    let retry = coordinator.run_cycle().await.unwrap();
    assert_eq!(retry.dispatched, 1);
}

#[tokio::test]
async fn test_stale_metadata_triggers_head_only() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/doc"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let doc_url = format!("{}/doc", server.uri());
    let now = now_seconds();

    // Recently retrieved, but its metadata has not been checked for hours
    let mut storage = SqliteStorage::new(&dir.path().join("archive.db")).unwrap();
    let mut record = UrlRecord::discovered(&Url::parse(&doc_url).unwrap(), now - Duration::days(2));
    record.last_get = Some(now - Duration::minutes(5));
    record.updated = now - Duration::hours(3);
    record.title = "Kept".to_string();
    storage.insert_url(&record).unwrap();

    let mut config = create_test_config(&doc_url, &dir, 1);
    config.frontier.seeds.clear();
    let coordinator =
        Coordinator::with_parts(config, storage, Arc::new(MemoryBlobStore::new())).unwrap();

    let summary = coordinator.run_cycle().await.unwrap();
    assert_eq!(summary.dispatched, 1);

    let storage = coordinator.storage();
    let storage = storage.lock().unwrap();
    let refreshed = storage.get_url(&doc_url).unwrap();

    assert_eq!(refreshed.content_type, "application/pdf");
    assert_eq!(refreshed.last_get, record.last_get);
    assert_eq!(refreshed.title, "Kept");
    assert!(refreshed.updated > record.updated);
    assert!(refreshed.updated <= Utc::now());

    let snapshots = storage.snapshots_for_url(&doc_url).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].status, Some(200));
    assert_eq!(snapshots[0].hash, None);
}

#[tokio::test]
async fn test_link_rediscovery_updates_existing_edge() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(
                    r#"<a href="/next">next</a><a href="/next">again</a>"#,
                    "text/html",
                ),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/", server.uri());
    let next = format!("{}/next", server.uri());
    let coordinator = Coordinator::new(create_test_config(&seed, &dir, 1)).unwrap();

    let summary = coordinator.run_cycle().await.unwrap();
    assert_eq!(summary.links, 2);

    let storage = coordinator.storage();
    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_links().unwrap(), 1);

    let link = storage.get_link(&seed, &next).unwrap();
    assert!(link.updated >= link.created);

    // The destination was discovered but not fetched yet
    let discovered = storage.get_url(&next).unwrap();
    assert_eq!(discovered.created, discovered.updated);
    assert!(!discovered.is_fetched());
    assert_eq!(storage.inbound_link_urls(&next).unwrap(), vec![seed.clone()]);
}
