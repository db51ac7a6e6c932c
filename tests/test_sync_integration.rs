//! End-to-end sync tests: query façade + engine + SQLite cache
//!
//! Integration points tested:
//! - Full-history sync populating the cache and a repeat call hitting the
//!   probe short-circuit
//! - Offset-stable page reads while the live feed appends at the head
//! - Cache survival across store reopen (a restart, effectively)

use async_trait::async_trait;
use polyflow::sync::error::FetchError;
use polyflow::sync::query::{QueryOptions, QueryService};
use polyflow::sync::source::{ActivitySource, PageRequest};
use polyflow::sync::store::{ActivityStore, SqliteActivityStore};
use polyflow::sync::types::ActivityRecord;
use polyflow::sync::{SyncEngine, SyncSettings};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const OWNER: &str = "0x45deaad70997b2998fbb9433b1819178e34b409c";

fn record(tx: &str, timestamp: i64) -> ActivityRecord {
    ActivityRecord::from_value(&json!({
        "transactionHash": tx,
        "conditionId": "0xcond",
        "timestamp": timestamp,
        "type": "TRADE",
    }))
}

/// Source whose pages can be swapped out mid-test to simulate a moving feed
struct MutableSource {
    pages: Mutex<HashMap<u32, Vec<ActivityRecord>>>,
    fetches: AtomicUsize,
}

impl MutableSource {
    fn new(pages: Vec<(u32, Vec<ActivityRecord>)>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().collect()),
            fetches: AtomicUsize::new(0),
        }
    }

    fn set_pages(&self, pages: Vec<(u32, Vec<ActivityRecord>)>) {
        *self.pages.lock().unwrap() = pages.into_iter().collect();
    }
}

#[async_trait]
impl ActivitySource for MutableSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<ActivityRecord>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&request.offset)
            .cloned()
            .unwrap_or_default())
    }
}

fn service(
    source: Arc<MutableSource>,
    db_path: &std::path::Path,
) -> (QueryService, Arc<SqliteActivityStore>) {
    let store = Arc::new(SqliteActivityStore::open(db_path).unwrap());
    let engine = Arc::new(SyncEngine::new(
        source,
        store.clone(),
        SyncSettings::default(),
    ));
    (QueryService::new(engine, 100), store)
}

#[tokio::test]
async fn test_full_history_then_probe_short_circuit() {
    let now = chrono::Utc::now().timestamp();
    let temp = tempfile::NamedTempFile::new().unwrap();

    let source = Arc::new(MutableSource::new(vec![
        (0, vec![record("0xa", now - 10), record("0xb", now - 20)]),
        (2, vec![record("0xc", now - 30)]),
        (4, vec![]),
    ]));
    let (query, store) = service(source.clone(), temp.path());

    let options = QueryOptions::default();
    let cancel = CancellationToken::new();

    // 1. Cold sync walks every page and fills the cache
    let first = query
        .full_history(OWNER, Some(2), None, &options, &cancel)
        .await
        .unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(store.stats(Some(OWNER)).await.unwrap().total_count, 3);

    // 2. Warm sync: the probe page is already fully cached, so exactly one
    //    more fetch happens and the result is identical
    let before = source.fetches.load(Ordering::SeqCst);
    let second = query
        .full_history(OWNER, Some(2), None, &options, &cancel)
        .await
        .unwrap();
    assert_eq!(source.fetches.load(Ordering::SeqCst), before + 1);

    let first_hashes: Vec<_> = first.iter().map(|r| r.tx_hash.clone()).collect();
    let second_hashes: Vec<_> = second.iter().map(|r| r.tx_hash.clone()).collect();
    assert_eq!(first_hashes, second_hashes);
}

#[tokio::test]
async fn test_page_offsets_stable_while_feed_grows() {
    let now = chrono::Utc::now().timestamp();
    let temp = tempfile::NamedTempFile::new().unwrap();

    let source = Arc::new(MutableSource::new(vec![(
        0,
        vec![
            record("0xc", now - 30),
            record("0xd", now - 40),
            record("0xe", now - 50),
        ],
    )]));
    let (query, _store) = service(source.clone(), temp.path());

    let options = QueryOptions::default();
    let cancel = CancellationToken::new();

    // Page 0 before the feed grows
    let page0 = query.page(OWNER, 2, 0, &options, &cancel).await.unwrap();
    assert_eq!(page0[0].tx_hash, "0xc");

    // Two new records land at the head of the live feed
    source.set_pages(vec![(
        0,
        vec![
            record("0xa", now - 10),
            record("0xb", now - 20),
            record("0xc", now - 30),
            record("0xd", now - 40),
            record("0xe", now - 50),
        ],
    )]);

    // Page 1 is served from the cache: it continues where page 0 left off
    // instead of re-slicing the shifted live window
    let page1 = query.page(OWNER, 2, 2, &options, &cancel).await.unwrap();
    let hashes: Vec<_> = page1.iter().map(|r| r.tx_hash.as_str()).collect();
    assert_eq!(hashes, vec!["0xc", "0xd"]);

    // No record was skipped between consecutive pages
    let again0 = query.page(OWNER, 2, 0, &options, &cancel).await.unwrap();
    assert_eq!(again0[0].tx_hash, "0xa");
    assert_eq!(again0[1].tx_hash, "0xb");
}

#[tokio::test]
async fn test_cache_survives_reopen() {
    let now = chrono::Utc::now().timestamp();
    let temp = tempfile::NamedTempFile::new().unwrap();

    let source = Arc::new(MutableSource::new(vec![(
        0,
        vec![record("0xa", now - 10), record("0xb", now - 20)],
    )]));

    {
        let (query, _store) = service(source.clone(), temp.path());
        query
            .full_history(OWNER, Some(100), None, &QueryOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
    }

    // Reopen the same database file with a source that now fails
    struct DeadSource;
    #[async_trait]
    impl ActivitySource for DeadSource {
        async fn fetch_page(
            &self,
            _request: &PageRequest,
        ) -> Result<Vec<ActivityRecord>, FetchError> {
            Err(FetchError::Connection("gone".to_string()))
        }
    }

    let store = Arc::new(SqliteActivityStore::open(temp.path()).unwrap());
    let engine = Arc::new(SyncEngine::new(
        Arc::new(DeadSource),
        store,
        SyncSettings::default(),
    ));
    let query = QueryService::new(engine, 100);

    // Upstream is down, cached data still serves
    let result = query
        .full_history(OWNER, Some(100), None, &QueryOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.len(), 2);

    let page = query
        .page(OWNER, 1, 0, &QueryOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].tx_hash, "0xa");
}

#[tokio::test]
async fn test_clear_and_stats_roundtrip() {
    let now = chrono::Utc::now().timestamp();
    let temp = tempfile::NamedTempFile::new().unwrap();

    let source = Arc::new(MutableSource::new(vec![(
        0,
        vec![record("0xa", now - 10)],
    )]));
    let (query, _store) = service(source, temp.path());

    query
        .full_history(OWNER, Some(100), None, &QueryOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let stats = query.cache_stats(Some(OWNER)).await.unwrap();
    assert_eq!(stats.total_count, 1);

    let global = query.cache_stats(None).await.unwrap();
    assert_eq!(global.owner_count, Some(1));

    let removed = query.clear_cache(OWNER).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(query.cache_stats(Some(OWNER)).await.unwrap().total_count, 0);
}
