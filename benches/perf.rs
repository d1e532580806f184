use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use gih_overlay::dom::Document;
use gih_overlay::engine::OverlayEngine;
use gih_overlay::identity::NameIndex;
use gih_overlay::kv_store::MemoryStore;
use gih_overlay::providers::parse_card_ratings_json;
use gih_overlay::site::SeventeenLands;
use gih_overlay::stats::{CardStatRecord, StatisticsStore, StatisticsTable};

fn sample_table(size: usize) -> StatisticsTable {
    let mut table = StatisticsTable::new();
    for idx in 0..size {
        let name = if idx % 10 == 0 {
            format!("Front {idx} // Back {idx}")
        } else {
            format!("Card {idx}")
        };
        table.insert(CardStatRecord {
            id: (90_000 + idx).to_string(),
            name,
            win_rate: Some(0.45 + (idx % 15) as f64 / 100.0),
            color: "U".to_string(),
            rarity: "common".to_string(),
            sample_size: 400 + idx as u64,
        });
    }
    table
}

fn bench_card_ratings_parse(c: &mut Criterion) {
    c.bench_function("card_ratings_parse", |b| {
        b.iter(|| {
            let rows = parse_card_ratings_json(black_box(CARD_RATINGS_JSON)).unwrap();
            black_box(rows.len());
        })
    });
}

fn bench_name_index(c: &mut Criterion) {
    let table = sample_table(300);
    c.bench_function("name_index_build", |b| {
        b.iter(|| black_box(NameIndex::build(black_box(&table))))
    });

    let index = NameIndex::build(&table);
    let queries = ["Card 17", "Front 40", "Front 50 // Back 50 // Extra", "Missing"];
    c.bench_function("name_index_resolve", |b| {
        b.iter(|| {
            for query in queries {
                black_box(index.resolve(&table, black_box(query)));
            }
        })
    });
}

fn bench_render_pass(c: &mut Criterion) {
    let table = sample_table(300);
    let mut doc = Document::new();
    let list = doc.create_element("div", &[("class", "card-list")]);
    doc.append_child(doc.body(), list);
    for idx in 0..300 {
        let wrapper = doc.create_element("div", &[("class", "card-wrapper")]);
        let name = format!("Card {idx}");
        let img = doc.create_element(
            "img",
            &[
                ("alt", name.as_str()),
                ("src", "https://cards.scryfall.io/normal/front/x.jpg"),
            ],
        );
        doc.append_child(wrapper, img);
        doc.append_child(list, wrapper);
    }
    doc.take_mutations();

    let mut stats = StatisticsStore::new(Arc::new(MemoryStore::new()));
    stats.replace("FIN", table);
    let adapter = SeventeenLands::new().unwrap();
    let mut engine = OverlayEngine::new(Box::new(adapter), stats, Duration::from_millis(200));

    c.bench_function("render_pass_300_cards", |b| {
        b.iter(|| {
            let mut page = doc.clone();
            let summary = engine.render_all(&mut page);
            black_box(summary.attached);
        })
    });
}

criterion_group!(perf, bench_card_ratings_parse, bench_name_index, bench_render_pass);
criterion_main!(perf);

static CARD_RATINGS_JSON: &str = include_str!("../tests/fixtures/card_ratings.json");
