use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::json;

use crate::http_client::http_client;
use crate::release_dates::DateWindow;
use crate::stats::FetchedRecord;

const CARD_RATINGS_URL: &str = "https://www.17lands.com/card_ratings/data";
const SCRYFALL_COLLECTION_URL: &str = "https://api.scryfall.com/cards/collection";
const SCRYFALL_SETS_URL: &str = "https://api.scryfall.com/sets";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsQuery {
    pub expansion: String,
    pub format: String,
    pub window: Option<DateWindow>,
}

pub trait StatsProvider {
    fn fetch_ratings(&self, query: &StatsQuery) -> Result<Vec<FetchedRecord>>;
}

pub trait CardDatabase {
    fn names_for(&self, ids: &[String]) -> Result<HashMap<String, String>>;
}

pub trait SetMetadata {
    fn release_date(&self, expansion: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SeventeenLandsClient;

impl StatsProvider for SeventeenLandsClient {
    fn fetch_ratings(&self, query: &StatsQuery) -> Result<Vec<FetchedRecord>> {
        let client = http_client()?;
        let url = card_ratings_url(query);
        let resp = client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .context("card ratings request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading card ratings body")?;
        if !status.is_success() {
            bail!("card ratings http {status}");
        }
        parse_card_ratings_json(&body)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScryfallClient;

impl CardDatabase for ScryfallClient {
    fn names_for(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        let client = http_client()?;
        let identifiers: Vec<_> = ids.iter().map(|id| json!({ "id": id })).collect();
        let resp = client
            .post(SCRYFALL_COLLECTION_URL)
            .header(ACCEPT, "application/json")
            .json(&json!({ "identifiers": identifiers }))
            .send()
            .context("scryfall collection request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading collection body")?;
        if !status.is_success() {
            bail!("scryfall collection http {status}");
        }
        parse_collection_json(&body)
    }
}

impl SetMetadata for ScryfallClient {
    fn release_date(&self, expansion: &str) -> Result<Option<String>> {
        let client = http_client()?;
        let url = format!("{SCRYFALL_SETS_URL}/{}", expansion.to_lowercase());
        let resp = client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .context("scryfall set request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading set body")?;
        if !status.is_success() {
            bail!("scryfall set http {status}");
        }
        parse_set_json(&body)
    }
}

pub fn card_ratings_url(query: &StatsQuery) -> String {
    let mut url = format!(
        "{CARD_RATINGS_URL}?expansion={}&format={}",
        query.expansion, query.format
    );
    if let Some(window) = query.window {
        url.push_str(&format!(
            "&start_date={}&end_date={}",
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d")
        ));
    }
    url
}

#[derive(Debug, Deserialize)]
struct RatingRow {
    name: Option<String>,
    ever_drawn_win_rate: Option<f64>,
    mtga_id: Option<u64>,
    arena_id: Option<u64>,
    color: Option<String>,
    rarity: Option<String>,
    game_count: Option<u64>,
}

pub fn parse_card_ratings_json(raw: &str) -> Result<Vec<FetchedRecord>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let rows: Vec<RatingRow> = serde_json::from_str(trimmed).context("invalid card ratings json")?;
    Ok(rows
        .into_iter()
        .map(|row| FetchedRecord {
            id: row
                .mtga_id
                .filter(|id| *id != 0)
                .or(row.arena_id.filter(|id| *id != 0))
                .map(|id| id.to_string()),
            name: row.name,
            win_rate: row.ever_drawn_win_rate,
            color: row.color,
            rarity: row.rarity,
            sample_size: row.game_count,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    #[serde(default)]
    data: Vec<CollectionCard>,
}

#[derive(Debug, Deserialize)]
struct CollectionCard {
    id: String,
    name: String,
}

pub fn parse_collection_json(raw: &str) -> Result<HashMap<String, String>> {
    let resp: CollectionResponse =
        serde_json::from_str(raw.trim()).context("invalid scryfall collection json")?;
    Ok(resp.data.into_iter().map(|card| (card.id, card.name)).collect())
}

#[derive(Debug, Deserialize)]
struct SetResponse {
    released_at: Option<String>,
}

pub fn parse_set_json(raw: &str) -> Result<Option<String>> {
    let resp: SetResponse = serde_json::from_str(raw.trim()).context("invalid scryfall set json")?;
    Ok(resp.released_at.filter(|d| !d.trim().is_empty()))
}
