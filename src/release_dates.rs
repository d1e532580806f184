use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::kv_store::{KvStore, load_json, save_json};
use crate::providers::SetMetadata;

pub const RELEASE_DATES_KEY: &str = "set_release_dates";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Expansion code -> release date. Entries are never expired.
pub struct ReleaseDateCache {
    dates: BTreeMap<String, NaiveDate>,
    store: Arc<dyn KvStore>,
}

impl ReleaseDateCache {
    pub fn load(store: Arc<dyn KvStore>) -> Self {
        let raw = load_json::<BTreeMap<String, String>>(store.as_ref(), RELEASE_DATES_KEY)
            .unwrap_or_default();
        let dates: BTreeMap<String, NaiveDate> = raw
            .into_iter()
            .filter_map(|(code, date)| parse_release_date(&date).map(|d| (code, d)))
            .collect();
        if !dates.is_empty() {
            info!("loaded {} cached release dates", dates.len());
        }
        Self { dates, store }
    }

    pub fn cached(&self, expansion: &str) -> Option<NaiveDate> {
        self.dates.get(&normalize(expansion)).copied()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn get(&mut self, expansion: &str, sets: &dyn SetMetadata) -> Option<NaiveDate> {
        let code = normalize(expansion);
        if let Some(date) = self.dates.get(&code) {
            return Some(*date);
        }
        let raw = match sets.release_date(&code) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!("set metadata for {code} has no release date");
                return None;
            }
            Err(err) => {
                warn!("release date lookup for {code} failed: {err:#}");
                return None;
            }
        };
        let Some(date) = parse_release_date(&raw) else {
            warn!("unparseable release date {raw:?} for {code}");
            return None;
        };
        self.dates.insert(code.clone(), date);
        self.persist();
        info!("release date for {code}: {date}");
        Some(date)
    }

    pub fn window(
        &mut self,
        expansion: &str,
        sets: &dyn SetMetadata,
        today: NaiveDate,
    ) -> Option<DateWindow> {
        let start = self.get(expansion, sets)?;
        Some(DateWindow { start, end: today })
    }

    fn persist(&self) {
        let raw: BTreeMap<&str, String> = self
            .dates
            .iter()
            .map(|(code, date)| (code.as_str(), date.format("%Y-%m-%d").to_string()))
            .collect();
        save_json(self.store.as_ref(), RELEASE_DATES_KEY, &raw);
    }
}

fn normalize(expansion: &str) -> String {
    expansion.trim().to_uppercase()
}

fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
