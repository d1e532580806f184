use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::dom::{Document, NodeId};
use crate::site::SiteKind;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolCard {
    pub name: String,
    #[serde(default)]
    pub scryfall_id: Option<String>,
}

pub fn load_pool(path: &Path) -> Result<Vec<PoolCard>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read card pool {}", path.display()))?;
    serde_json::from_str(&raw).context("invalid card pool json")
}

pub struct DraftPage {
    kind: SiteKind,
    pack: NodeId,
    pool: Vec<PoolCard>,
    pack_size: usize,
    dealt: Vec<(NodeId, PoolCard)>,
    picks: Vec<String>,
}

impl DraftPage {
    pub fn build(
        doc: &mut Document,
        kind: SiteKind,
        expansion: Option<&str>,
        pool: Vec<PoolCard>,
        pack_size: usize,
    ) -> Self {
        let body = doc.body();
        match kind {
            SiteKind::Draftmancer => {
                let controls = doc.create_element("div", &[("class", "card-pool-controls")]);
                let sets = doc.create_element("div", &[("class", "selected-sets")]);
                doc.append_child(body, controls);
                doc.append_child(controls, sets);
                if let Some(code) = expansion {
                    let alt = code.to_lowercase();
                    let icon =
                        doc.create_element("img", &[("class", "set-icon"), ("alt", alt.as_str())]);
                    doc.append_child(sets, icon);
                }
            }
            SiteKind::SeventeenLands => {
                let h1 = doc.create_element("h1", &[]);
                let title = match expansion {
                    Some(code) => format!("{} Card Ratings", code.to_uppercase()),
                    None => "Card Ratings".to_string(),
                };
                doc.set_text(h1, &title);
                doc.append_child(body, h1);
            }
        }
        let pack = doc.create_element("div", &[("class", "pack")]);
        doc.append_child(body, pack);
        doc.take_mutations();
        Self {
            kind,
            pack,
            pool,
            pack_size: pack_size.max(1),
            dealt: Vec::new(),
            picks: Vec::new(),
        }
    }

    pub fn kind(&self) -> SiteKind {
        self.kind
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn set_pool(&mut self, pool: Vec<PoolCard>) {
        self.pool = pool;
    }

    pub fn picks(&self) -> &[String] {
        &self.picks
    }

    pub fn cards(&self) -> &[(NodeId, PoolCard)] {
        &self.dealt
    }

    pub fn deal_pack<R: Rng>(&mut self, doc: &mut Document, rng: &mut R) -> usize {
        let chosen: Vec<PoolCard> = self
            .pool
            .choose_multiple(rng, self.pack_size)
            .cloned()
            .collect();
        let mut nodes = Vec::with_capacity(chosen.len());
        let mut dealt = Vec::with_capacity(chosen.len());
        for card in chosen {
            let node = self.card_markup(doc, &card);
            nodes.push(node);
            dealt.push((node, card));
        }
        doc.replace_children(self.pack, nodes);
        self.dealt = dealt;
        self.dealt.len()
    }

    pub fn pick(&mut self, doc: &mut Document, index: usize) -> Option<String> {
        if index >= self.dealt.len() {
            return None;
        }
        let (node, card) = self.dealt.remove(index);
        doc.remove(node);
        self.picks.push(card.name.clone());
        Some(card.name)
    }

    fn card_markup(&self, doc: &mut Document, card: &PoolCard) -> NodeId {
        match self.kind {
            SiteKind::Draftmancer => {
                let id = card.scryfall_id.as_deref().unwrap_or_default();
                let root = doc.create_element("div", &[("class", "card"), ("data-arena-id", id)]);
                let image = doc.create_element("div", &[("class", "card-image")]);
                let src = card_image_url(id);
                let img = doc.create_element("img", &[("src", src.as_str())]);
                doc.append_child(root, image);
                doc.append_child(image, img);
                root
            }
            SiteKind::SeventeenLands => {
                let wrapper = doc.create_element("div", &[("class", "card-wrapper")]);
                let src = card_image_url(&slug(&card.name));
                let img =
                    doc.create_element("img", &[("alt", card.name.as_str()), ("src", src.as_str())]);
                doc.append_child(wrapper, img);
                wrapper
            }
        }
    }
}

fn card_image_url(key: &str) -> String {
    format!("https://cards.scryfall.io/normal/front/{key}.jpg")
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}
