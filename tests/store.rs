mod common;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use gih_overlay::kv_store::{FileStore, KvStore, MemoryStore, load_json};
use gih_overlay::release_dates::{RELEASE_DATES_KEY, ReleaseDateCache};
use gih_overlay::stats::{
    CachedSnapshot, LoadOutcome, SNAPSHOT_KEY, StatisticsStore, StatisticsTable,
};

use common::{StubSets, StubStats, fetched, record, table};

const HOUR_MS: i64 = 60 * 60 * 1000;
const NOW_MS: i64 = 1_750_000_000_000;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
}

struct BrokenStore;

impl KvStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(anyhow!("disk unavailable"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(anyhow!("disk full"))
    }
}

#[test]
fn ingestion_keeps_exact_win_rate_and_drops_nulls() {
    let t = StatisticsTable::ingest(vec![
        fetched("1", "Bolt", Some(0.55)),
        fetched("2", "Dud", None),
        fetched("3", "Broken", Some(1.7)),
    ]);
    assert_eq!(t.len(), 1);
    assert_eq!(t.get("1").and_then(|r| r.win_rate), Some(0.55));
    assert!(t.get("2").is_none());
}

#[test]
fn snapshot_freshness_boundary() {
    let stale = CachedSnapshot::new(StatisticsTable::new(), "FIN", NOW_MS - 25 * HOUR_MS);
    let fresh = CachedSnapshot::new(StatisticsTable::new(), "FIN", NOW_MS - HOUR_MS);
    assert!(!stale.usable_for("FIN", NOW_MS));
    assert!(fresh.usable_for("FIN", NOW_MS));
    assert!(!fresh.usable_for("DSK", NOW_MS));
}

#[test]
fn successful_load_replaces_and_persists() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let mut store = StatisticsStore::new(kv.clone());
    let mut dates = ReleaseDateCache::load(kv.clone());
    let provider = StubStats::ok(vec![fetched("1", "Bolt", Some(0.6))]);
    let sets = StubSets::with_date("2025-06-13");

    let outcome = store.load("FIN", "PremierDraft", &provider, &mut dates, &sets, today(), NOW_MS);
    assert_eq!(outcome, LoadOutcome::Fresh(1));
    assert_eq!(store.expansion(), Some("FIN"));

    let query = provider.queries.borrow()[0].clone();
    assert_eq!(query.format, "PremierDraft");
    let window = query.window.expect("release date bounds the query");
    assert_eq!(window.start, NaiveDate::from_ymd_opt(2025, 6, 13).unwrap());
    assert_eq!(window.end, today());

    let snapshot: CachedSnapshot = load_json(kv.as_ref(), SNAPSHOT_KEY).expect("snapshot written");
    assert_eq!(snapshot.expansion, "FIN");
    assert_eq!(snapshot.timestamp_ms, NOW_MS);
    assert_eq!(snapshot.table.len(), 1);
}

#[test]
fn expansion_switch_leaves_no_old_records() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let mut store = StatisticsStore::new(kv.clone());
    let mut dates = ReleaseDateCache::load(kv.clone());
    let sets = StubSets::with_date("2025-01-01");

    let set1 = StubStats::ok(vec![fetched("1", "Old Card", Some(0.5))]);
    store.load("SET1", "PremierDraft", &set1, &mut dates, &sets, today(), NOW_MS);
    store.reset();
    assert!(store.table().is_empty());

    let set2 = StubStats::ok(vec![fetched("9", "New Card", Some(0.52))]);
    store.load("SET2", "PremierDraft", &set2, &mut dates, &sets, today(), NOW_MS);
    assert!(store.lookup("Old Card").is_none());
    assert!(store.table().get("1").is_none());
    assert!(store.lookup("New Card").is_some());
}

#[test]
fn failed_fetch_falls_back_to_fresh_snapshot_of_same_expansion() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let snapshot = CachedSnapshot::new(
        table(vec![record("1", "Bolt", 0.6, 600)]),
        "FIN",
        NOW_MS - HOUR_MS,
    );
    kv.set(SNAPSHOT_KEY, &serde_json::to_string(&snapshot).unwrap())
        .unwrap();

    let mut store = StatisticsStore::new(kv.clone());
    let mut dates = ReleaseDateCache::load(kv.clone());
    let sets = StubSets::with_date("2025-06-13");
    let outcome = store.load("FIN", "PremierDraft", &StubStats::failing(), &mut dates, &sets, today(), NOW_MS);
    assert_eq!(outcome, LoadOutcome::Cached(1));
    assert!(store.lookup("Bolt").is_some());

    let mut other = StatisticsStore::new(kv.clone());
    let outcome = other.load("DSK", "PremierDraft", &StubStats::failing(), &mut dates, &sets, today(), NOW_MS);
    assert_eq!(outcome, LoadOutcome::Unchanged);
    assert!(other.table().is_empty());
}

#[test]
fn stale_snapshot_is_not_restored() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let snapshot = CachedSnapshot::new(
        table(vec![record("1", "Bolt", 0.6, 600)]),
        "FIN",
        NOW_MS - 25 * HOUR_MS,
    );
    kv.set(SNAPSHOT_KEY, &serde_json::to_string(&snapshot).unwrap())
        .unwrap();
    let mut store = StatisticsStore::new(kv);
    assert!(!store.restore_snapshot("FIN", NOW_MS));
    assert!(store.table().is_empty());
}

#[test]
fn failed_fetch_without_snapshot_keeps_previous_table() {
    let mut store = StatisticsStore::new(Arc::new(MemoryStore::new()));
    store.replace("FIN", table(vec![record("1", "Bolt", 0.6, 600)]));
    let outcome = store.apply_fetch("FIN", Err(anyhow!("timeout")), NOW_MS);
    assert_eq!(outcome, LoadOutcome::Unchanged);
    assert_eq!(store.table().len(), 1);
}

#[test]
fn corrupt_snapshot_is_a_cache_miss() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    kv.set(SNAPSHOT_KEY, "{not json").unwrap();
    let mut store = StatisticsStore::new(kv);
    assert!(!store.restore_snapshot("FIN", NOW_MS));
}

#[test]
fn persistence_failures_are_not_fatal() {
    let kv: Arc<dyn KvStore> = Arc::new(BrokenStore);
    let mut store = StatisticsStore::new(kv.clone());
    let mut dates = ReleaseDateCache::load(kv.clone());
    let sets = StubSets::with_date("2025-06-13");
    let provider = StubStats::ok(vec![fetched("1", "Bolt", Some(0.6))]);
    let outcome = store.load("FIN", "PremierDraft", &provider, &mut dates, &sets, today(), NOW_MS);
    assert_eq!(outcome, LoadOutcome::Fresh(1));
    assert!(!store.persist(NOW_MS));
    assert!(!store.restore_snapshot("FIN", NOW_MS));
}

#[test]
fn release_dates_are_looked_up_once_and_persisted() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let sets = StubSets::with_date("2025-06-13");
    let mut cache = ReleaseDateCache::load(kv.clone());
    let expected = NaiveDate::from_ymd_opt(2025, 6, 13);
    assert_eq!(cache.get("fin", &sets), expected);
    assert_eq!(cache.get("FIN", &sets), expected);
    assert_eq!(sets.calls.get(), 1);

    let raw = kv.get(RELEASE_DATES_KEY).unwrap().unwrap();
    assert!(raw.contains("\"FIN\":\"2025-06-13\""));

    let reloaded = ReleaseDateCache::load(kv);
    assert_eq!(reloaded.cached("FIN"), expected);
}

#[test]
fn unknown_release_date_omits_query_bounds() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let mut store = StatisticsStore::new(kv.clone());
    let mut dates = ReleaseDateCache::load(kv.clone());
    let sets = StubSets::failing();
    let provider = StubStats::ok(vec![fetched("1", "Bolt", Some(0.6))]);
    let outcome = store.load("FIN", "PremierDraft", &provider, &mut dates, &sets, today(), NOW_MS);
    assert_eq!(outcome, LoadOutcome::Fresh(1));
    assert_eq!(provider.queries.borrow()[0].window, None);
    assert!(dates.is_empty());

    let missing = StubSets {
        date: None,
        fail: false,
        calls: Default::default(),
    };
    assert_eq!(dates.get("FIN", &missing), None);
    assert!(kv.get(RELEASE_DATES_KEY).unwrap().is_none());
}

#[test]
fn file_store_round_trips_and_treats_absent_keys_as_miss() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("cache"));
    assert_eq!(store.get(SNAPSHOT_KEY).unwrap(), None);
    store.set(SNAPSHOT_KEY, "{\"a\":1}").unwrap();
    assert_eq!(store.get(SNAPSHOT_KEY).unwrap().as_deref(), Some("{\"a\":1}"));
    assert!(!dir.path().join("cache").join("gih_wr_snapshot.json.tmp").exists());
}

#[test]
fn restored_snapshot_keeps_first_match_order() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let mut store = StatisticsStore::new(kv.clone());
    store.replace(
        "FIN",
        table(vec![
            record("Plains", "Plains", 0.40, 900),
            record("10", "Plains", 0.60, 900),
            record("9", "Plains", 0.50, 900),
        ]),
    );
    assert_eq!(store.lookup("Plains").map(|r| r.id.as_str()), Some("9"));
    assert!(store.persist(NOW_MS));

    let mut restored = StatisticsStore::new(kv);
    assert!(restored.restore_snapshot("FIN", NOW_MS));
    let ids: Vec<&str> = restored.table().iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["9", "10", "Plains"]);
    assert_eq!(restored.lookup("Plains").map(|r| r.id.as_str()), Some("9"));
}
