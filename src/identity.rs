use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::providers::CardDatabase;
use crate::stats::{CardStatRecord, StatisticsTable};

pub const FACE_SEPARATOR: &str = " // ";
pub const MAPPING_BATCH_SIZE: usize = 75;
pub const MAPPING_BATCH_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardKey {
    Name(String),
    Opaque(String),
}

#[derive(Debug, Clone, Default)]
pub struct NameMap {
    names: HashMap<String, String>,
}

impl NameMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.names.get(key).map(String::as_str)
    }

    pub fn merge(&mut self, names: HashMap<String, String>) {
        self.names.extend(names);
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn missing(&self, keys: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut seen = HashSet::new();
        keys.into_iter()
            .filter(|k| !k.is_empty() && !self.names.contains_key(k))
            .filter(|k| seen.insert(k.clone()))
            .collect()
    }

    pub fn name_of<'a>(&'a self, key: &'a CardKey) -> Option<&'a str> {
        match key {
            CardKey::Name(name) => Some(name.as_str()),
            CardKey::Opaque(id) => self.get(id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingOutcome {
    pub names: HashMap<String, String>,
    pub requested: usize,
    pub complete: bool,
}

/// Maps opaque keys to names in batches of `MAPPING_BATCH_SIZE`, pausing
/// `delay` between batches. A failed batch keeps what earlier batches
/// returned and stops.
pub fn resolve_names(keys: &[String], db: &dyn CardDatabase, delay: Duration) -> MappingOutcome {
    let mut outcome = MappingOutcome {
        names: HashMap::new(),
        requested: keys.len(),
        complete: true,
    };
    let batches: Vec<&[String]> = keys.chunks(MAPPING_BATCH_SIZE).collect();
    for (i, batch) in batches.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            thread::sleep(delay);
        }
        match db.names_for(batch) {
            Ok(names) => outcome.names.extend(names),
            Err(err) => {
                warn!(
                    "name mapping batch {}/{} failed, mapping incomplete: {err:#}",
                    i + 1,
                    batches.len()
                );
                outcome.complete = false;
                break;
            }
        }
    }
    info!(
        "mapped {} of {} card ids",
        outcome.names.len(),
        outcome.requested
    );
    outcome
}

pub fn front_face(name: &str) -> Option<&str> {
    name.split_once(FACE_SEPARATOR).map(|(front, _)| front)
}

/// Name lookups over one table: exact, front face of the query, and query
/// as the front face of a stored split card. First record in table order
/// wins for each key.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    by_name: HashMap<String, String>,
    by_split_front: HashMap<String, String>,
}

impl NameIndex {
    pub fn build(table: &StatisticsTable) -> Self {
        let mut index = Self::default();
        for (key, record) in table.iter() {
            index
                .by_name
                .entry(record.name.clone())
                .or_insert_with(|| key.clone());
            if let Some(front) = front_face(&record.name) {
                index
                    .by_split_front
                    .entry(front.to_string())
                    .or_insert_with(|| key.clone());
            }
        }
        index
    }

    pub fn resolve<'t>(&self, table: &'t StatisticsTable, name: &str) -> Option<&'t CardStatRecord> {
        let key = match self.by_name.get(name) {
            Some(key) => key,
            None => match front_face(name) {
                Some(front) => self.by_name.get(front)?,
                None => self.by_split_front.get(name)?,
            },
        };
        table.get(key)
    }
}
