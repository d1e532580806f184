#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use gih_overlay::dom::{Document, NodeId};
use gih_overlay::engine::OverlayEngine;
use gih_overlay::kv_store::{KvStore, MemoryStore};
use gih_overlay::providers::{CardDatabase, SetMetadata, StatsProvider, StatsQuery};
use gih_overlay::site::{Draftmancer, SeventeenLands};
use gih_overlay::stats::{CardStatRecord, FetchedRecord, StatisticsStore, StatisticsTable};

pub const WINDOW: Duration = Duration::from_millis(200);

pub fn record(id: &str, name: &str, win_rate: f64, sample_size: u64) -> CardStatRecord {
    CardStatRecord {
        id: id.to_string(),
        name: name.to_string(),
        win_rate: Some(win_rate),
        color: String::new(),
        rarity: "common".to_string(),
        sample_size,
    }
}

pub fn table(records: Vec<CardStatRecord>) -> StatisticsTable {
    let mut table = StatisticsTable::new();
    for r in records {
        table.insert(r);
    }
    table
}

pub fn fetched(id: &str, name: &str, win_rate: Option<f64>) -> FetchedRecord {
    FetchedRecord {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        win_rate,
        color: Some("R".to_string()),
        rarity: Some("common".to_string()),
        sample_size: Some(1000),
    }
}

/// A 17Lands-style page: heading with the set code and one wrapper per card.
pub fn seventeen_lands_page(expansion: &str, names: &[&str]) -> (Document, NodeId, Vec<NodeId>) {
    let mut doc = Document::new();
    let h1 = doc.create_element("h1", &[]);
    doc.set_text(h1, &format!("{expansion} Card Ratings"));
    doc.append_child(doc.body(), h1);
    let list = doc.create_element("div", &[("class", "card-list")]);
    doc.append_child(doc.body(), list);
    let cards = names
        .iter()
        .map(|name| add_seventeen_lands_card(&mut doc, list, name))
        .collect();
    doc.take_mutations();
    (doc, list, cards)
}

/// Appends a wrapper holding a card image; returns the image.
pub fn add_seventeen_lands_card(doc: &mut Document, list: NodeId, name: &str) -> NodeId {
    let wrapper = doc.create_element("div", &[("class", "card-wrapper")]);
    let img = doc.create_element(
        "img",
        &[("alt", name), ("src", "https://cards.scryfall.io/normal/front/x.jpg")],
    );
    doc.append_child(wrapper, img);
    doc.append_child(list, wrapper);
    img
}

/// A Draftmancer-style page keyed by Scryfall ids.
pub fn draftmancer_page(expansion: &str, ids: &[&str]) -> (Document, NodeId, Vec<NodeId>) {
    let mut doc = Document::new();
    let controls = doc.create_element("div", &[("class", "card-pool-controls")]);
    let sets = doc.create_element("div", &[("class", "selected-sets")]);
    let icon = doc.create_element("img", &[("class", "set-icon"), ("alt", expansion)]);
    doc.append_child(doc.body(), controls);
    doc.append_child(controls, sets);
    doc.append_child(sets, icon);
    let pack = doc.create_element("div", &[("class", "booster")]);
    doc.append_child(doc.body(), pack);
    let cards = ids
        .iter()
        .map(|id| {
            let card = doc.create_element("div", &[("class", "card"), ("data-arena-id", *id)]);
            let image = doc.create_element("div", &[("class", "card-image")]);
            doc.append_child(card, image);
            doc.append_child(pack, card);
            card
        })
        .collect();
    doc.take_mutations();
    (doc, pack, cards)
}

/// Appends a Draftmancer card keyed by `id` to the pack.
pub fn add_draftmancer_card(doc: &mut Document, pack: NodeId, id: &str) -> NodeId {
    let card = doc.create_element("div", &[("class", "card"), ("data-arena-id", id)]);
    let image = doc.create_element("div", &[("class", "card-image")]);
    doc.append_child(card, image);
    doc.append_child(pack, card);
    card
}

pub fn memory_store() -> Arc<dyn KvStore> {
    Arc::new(MemoryStore::new())
}

pub fn seventeen_lands_engine(table: StatisticsTable) -> OverlayEngine {
    let mut stats = StatisticsStore::new(memory_store());
    stats.replace("FIN", table);
    OverlayEngine::new(Box::new(SeventeenLands::new().unwrap()), stats, WINDOW)
}

pub fn draftmancer_engine(table: StatisticsTable) -> OverlayEngine {
    let mut stats = StatisticsStore::new(memory_store());
    stats.replace("FIN", table);
    OverlayEngine::new(Box::new(Draftmancer::new().unwrap()), stats, WINDOW)
}

pub struct StubStats {
    pub rows: Vec<FetchedRecord>,
    pub fail: bool,
    pub queries: RefCell<Vec<StatsQuery>>,
}

impl StubStats {
    pub fn ok(rows: Vec<FetchedRecord>) -> Self {
        Self {
            rows,
            fail: false,
            queries: RefCell::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            rows: Vec::new(),
            fail: true,
            queries: RefCell::new(Vec::new()),
        }
    }
}

impl StatsProvider for StubStats {
    fn fetch_ratings(&self, query: &StatsQuery) -> Result<Vec<FetchedRecord>> {
        self.queries.borrow_mut().push(query.clone());
        if self.fail {
            bail!("card ratings http 503 Service Unavailable");
        }
        Ok(self.rows.clone())
    }
}

pub struct StubSets {
    pub date: Option<String>,
    pub fail: bool,
    pub calls: Cell<usize>,
}

impl StubSets {
    pub fn with_date(date: &str) -> Self {
        Self {
            date: Some(date.to_string()),
            fail: false,
            calls: Cell::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            date: None,
            fail: true,
            calls: Cell::new(0),
        }
    }
}

impl SetMetadata for StubSets {
    fn release_date(&self, _expansion: &str) -> Result<Option<String>> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(anyhow!("set request failed"));
        }
        Ok(self.date.clone())
    }
}

/// Maps every id to `Card <id>`; fails on the batch numbered `fail_on`.
pub struct StubCards {
    pub fail_on: Option<usize>,
    pub batches: RefCell<Vec<usize>>,
    pub called_at: RefCell<Vec<Instant>>,
}

impl StubCards {
    pub fn new(fail_on: Option<usize>) -> Self {
        Self {
            fail_on,
            batches: RefCell::new(Vec::new()),
            called_at: RefCell::new(Vec::new()),
        }
    }
}

impl CardDatabase for StubCards {
    fn names_for(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        let batch = self.batches.borrow().len();
        self.batches.borrow_mut().push(ids.len());
        self.called_at.borrow_mut().push(Instant::now());
        if self.fail_on == Some(batch) {
            bail!("scryfall collection http 429 Too Many Requests");
        }
        Ok(ids
            .iter()
            .map(|id| (id.clone(), format!("Card {id}")))
            .collect())
    }
}
