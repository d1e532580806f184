use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::identity::NameIndex;
use crate::kv_store::{KvStore, load_json, save_json};
use crate::providers::{SetMetadata, StatsProvider, StatsQuery};
use crate::release_dates::ReleaseDateCache;

pub const SNAPSHOT_KEY: &str = "gih_wr_snapshot";
pub const SNAPSHOT_TTL_MS: i64 = 24 * 60 * 60 * 1000;
const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardStatRecord {
    pub id: String,
    pub name: String,
    pub win_rate: Option<f64>,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub sample_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub win_rate: Option<f64>,
    pub color: Option<String>,
    pub rarity: Option<String>,
    pub sample_size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<CardStatRecord>", into = "Vec<CardStatRecord>")]
pub struct StatisticsTable {
    records: HashMap<String, CardStatRecord>,
    // Integer-like keys iterate in ascending numeric order, the rest in
    // first-insertion order.
    numeric: BTreeMap<u32, String>,
    named: Vec<String>,
}

impl StatisticsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(rows: impl IntoIterator<Item = FetchedRecord>) -> Self {
        let mut table = Self::new();
        for row in rows {
            let Some(name) = row.name.filter(|n| !n.trim().is_empty()) else {
                continue;
            };
            let Some(win_rate) = row.win_rate.filter(|w| w.is_finite() && (0.0..=1.0).contains(w))
            else {
                continue;
            };
            let key = row.id.filter(|id| !id.is_empty()).unwrap_or_else(|| name.clone());
            table.insert(CardStatRecord {
                id: key,
                name,
                win_rate: Some(win_rate),
                color: row.color.unwrap_or_default(),
                rarity: row.rarity.unwrap_or_default(),
                sample_size: row.sample_size.unwrap_or(0),
            });
        }
        table
    }

    /// Adds or replaces a record. A replaced record keeps its position.
    pub fn insert(&mut self, record: CardStatRecord) {
        let key = record.id.clone();
        if self.records.insert(key.clone(), record).is_some() {
            return;
        }
        match index_key(&key) {
            Some(index) => {
                self.numeric.insert(index, key);
            }
            None => self.named.push(key),
        }
    }

    pub fn get(&self, key: &str) -> Option<&CardStatRecord> {
        self.records.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CardStatRecord)> {
        self.numeric
            .values()
            .chain(self.named.iter())
            .filter_map(|key| self.records.get_key_value(key))
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|(_, r)| r.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<CardStatRecord>> for StatisticsTable {
    fn from(records: Vec<CardStatRecord>) -> Self {
        let mut table = Self::new();
        for record in records {
            table.insert(record);
        }
        table
    }
}

impl From<StatisticsTable> for Vec<CardStatRecord> {
    fn from(table: StatisticsTable) -> Self {
        let StatisticsTable {
            mut records,
            numeric,
            named,
        } = table;
        numeric
            .into_values()
            .chain(named)
            .filter_map(|key| records.remove(&key))
            .collect()
    }
}

// Canonical decimal form of a `u32` below `u32::MAX`.
fn index_key(key: &str) -> Option<u32> {
    let index: u32 = key.parse().ok()?;
    (index != u32::MAX && index.to_string() == key).then_some(index)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSnapshot {
    version: u32,
    pub table: StatisticsTable,
    pub expansion: String,
    pub timestamp_ms: i64,
}

impl CachedSnapshot {
    pub fn new(table: StatisticsTable, expansion: &str, timestamp_ms: i64) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            table,
            expansion: expansion.to_string(),
            timestamp_ms,
        }
    }

    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp_ms) < SNAPSHOT_TTL_MS
    }

    pub fn usable_for(&self, expansion: &str, now_ms: i64) -> bool {
        self.version == SNAPSHOT_VERSION && self.expansion == expansion && self.is_fresh(now_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Fresh(usize),
    Cached(usize),
    Unchanged,
}

pub fn fetch_table(
    expansion: &str,
    format: &str,
    provider: &dyn StatsProvider,
    release_dates: &mut ReleaseDateCache,
    sets: &dyn SetMetadata,
    today: NaiveDate,
) -> Result<StatisticsTable> {
    let window = release_dates.window(expansion, sets, today);
    if window.is_none() {
        warn!("no release date for {expansion}; querying without date bounds");
    }
    let query = StatsQuery {
        expansion: expansion.to_string(),
        format: format.to_string(),
        window,
    };
    let rows = provider.fetch_ratings(&query)?;
    let fetched = rows.len();
    let table = StatisticsTable::ingest(rows);
    info!(
        "fetched {fetched} rows for {expansion}, kept {} with a win rate",
        table.len()
    );
    Ok(table)
}

pub struct StatisticsStore {
    table: StatisticsTable,
    expansion: Option<String>,
    index: NameIndex,
    store: Arc<dyn KvStore>,
}

impl StatisticsStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            table: StatisticsTable::new(),
            expansion: None,
            index: NameIndex::default(),
            store,
        }
    }

    pub fn table(&self) -> &StatisticsTable {
        &self.table
    }

    pub fn expansion(&self) -> Option<&str> {
        self.expansion.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        !self.table.is_empty()
    }

    pub fn lookup(&self, name: &str) -> Option<&CardStatRecord> {
        self.index.resolve(&self.table, name)
    }

    pub fn replace(&mut self, expansion: &str, table: StatisticsTable) {
        self.index = NameIndex::build(&table);
        self.table = table;
        self.expansion = Some(expansion.to_string());
    }

    pub fn reset(&mut self) {
        self.table = StatisticsTable::new();
        self.index = NameIndex::default();
        self.expansion = None;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn load(
        &mut self,
        expansion: &str,
        format: &str,
        provider: &dyn StatsProvider,
        release_dates: &mut ReleaseDateCache,
        sets: &dyn SetMetadata,
        today: NaiveDate,
        now_ms: i64,
    ) -> LoadOutcome {
        let result = fetch_table(expansion, format, provider, release_dates, sets, today);
        self.apply_fetch(expansion, result, now_ms)
    }

    pub fn apply_fetch(
        &mut self,
        expansion: &str,
        result: Result<StatisticsTable>,
        now_ms: i64,
    ) -> LoadOutcome {
        match result {
            Ok(table) => {
                let count = table.len();
                self.replace(expansion, table);
                self.persist(now_ms);
                info!("loaded {count} cards for {expansion}");
                LoadOutcome::Fresh(count)
            }
            Err(err) => {
                warn!("statistics fetch for {expansion} failed: {err:#}");
                if self.restore_snapshot(expansion, now_ms) {
                    LoadOutcome::Cached(self.table.len())
                } else {
                    LoadOutcome::Unchanged
                }
            }
        }
    }

    pub fn persist(&self, now_ms: i64) -> bool {
        let Some(expansion) = self.expansion.as_deref() else {
            return false;
        };
        let snapshot = CachedSnapshot::new(self.table.clone(), expansion, now_ms);
        save_json(self.store.as_ref(), SNAPSHOT_KEY, &snapshot)
    }

    pub fn restore_snapshot(&mut self, expansion: &str, now_ms: i64) -> bool {
        let Some(snapshot) = load_json::<CachedSnapshot>(self.store.as_ref(), SNAPSHOT_KEY) else {
            return false;
        };
        if !snapshot.usable_for(expansion, now_ms) {
            info!(
                "cached snapshot for {} not usable for {expansion}",
                snapshot.expansion
            );
            return false;
        }
        info!(
            "restored {} cards for {expansion} from cache",
            snapshot.table.len()
        );
        self.replace(expansion, snapshot.table);
        true
    }
}
