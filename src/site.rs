use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::dom::{Document, NodeId};
use crate::identity::CardKey;
use crate::selector::{Selector, SelectorError};

static SET_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{3,4})\b").expect("set code pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStyle {
    pub font_size: &'static str,
    pub padding: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Draftmancer,
    SeventeenLands,
}

pub trait SiteAdapter: Send {
    fn name(&self) -> &'static str;

    fn kind(&self) -> SiteKind;

    fn card_selector(&self) -> &Selector;

    fn card_key(&self, doc: &Document, card: NodeId) -> Option<CardKey>;

    fn detect_expansion(&self, doc: &Document) -> Option<String>;

    fn needs_external_mapping(&self) -> bool;

    fn anchor(&self, doc: &Document, card: NodeId) -> Option<NodeId>;

    fn overlay_style(&self) -> OverlayStyle;

    fn enumerate_cards(&self, doc: &Document) -> Vec<NodeId> {
        doc.query_selector_all(self.card_selector())
    }

    fn opaque_keys(&self, doc: &Document) -> Vec<String> {
        self.enumerate_cards(doc)
            .into_iter()
            .filter_map(|card| match self.card_key(doc, card) {
                Some(CardKey::Opaque(id)) => Some(id),
                _ => None,
            })
            .collect()
    }
}

pub struct Draftmancer {
    cards: Selector,
    image_container: Selector,
    expansion_icons: [Selector; 2],
}

impl Draftmancer {
    pub const ID_ATTR: &'static str = "data-arena-id";

    pub fn new() -> Result<Self, SelectorError> {
        Ok(Self {
            cards: Selector::parse(".card[data-arena-id]")?,
            image_container: Selector::parse(".card-image")?,
            expansion_icons: [
                Selector::parse(".card-pool-controls .selected-sets .set-icon[alt]")?,
                Selector::parse(".selected-sets .set-icon[alt]")?,
            ],
        })
    }
}

impl SiteAdapter for Draftmancer {
    fn name(&self) -> &'static str {
        "Draftmancer"
    }

    fn kind(&self) -> SiteKind {
        SiteKind::Draftmancer
    }

    fn card_selector(&self) -> &Selector {
        &self.cards
    }

    fn card_key(&self, doc: &Document, card: NodeId) -> Option<CardKey> {
        doc.attr(card, Self::ID_ATTR)
            .filter(|id| !id.is_empty())
            .map(|id| CardKey::Opaque(id.to_string()))
    }

    fn detect_expansion(&self, doc: &Document) -> Option<String> {
        for selector in &self.expansion_icons {
            let Some(icon) = doc.query_selector(selector) else {
                continue;
            };
            if let Some(alt) = doc.attr(icon, "alt").filter(|a| !a.trim().is_empty()) {
                let expansion = alt.trim().to_uppercase();
                debug!("detected expansion {expansion} via {selector}");
                return Some(expansion);
            }
        }
        warn!("could not detect expansion on Draftmancer page");
        None
    }

    fn needs_external_mapping(&self) -> bool {
        true
    }

    fn anchor(&self, doc: &Document, card: NodeId) -> Option<NodeId> {
        doc.query_selector_within(card, &self.image_container)
    }

    fn overlay_style(&self) -> OverlayStyle {
        OverlayStyle {
            font_size: "16px",
            padding: "5px 10px",
        }
    }
}

pub struct SeventeenLands {
    cards: Selector,
    heading: Selector,
    set_like: Selector,
}

impl SeventeenLands {
    pub fn new() -> Result<Self, SelectorError> {
        Ok(Self {
            cards: Selector::parse(r#"img[alt][src*="cards.scryfall.io"]"#)?,
            heading: Selector::parse("h1")?,
            set_like: Selector::parse(r#"[class*="set"], [class*="expansion"]"#)?,
        })
    }
}

impl SiteAdapter for SeventeenLands {
    fn name(&self) -> &'static str {
        "17Lands"
    }

    fn kind(&self) -> SiteKind {
        SiteKind::SeventeenLands
    }

    fn card_selector(&self) -> &Selector {
        &self.cards
    }

    fn card_key(&self, doc: &Document, card: NodeId) -> Option<CardKey> {
        doc.attr(card, "alt")
            .filter(|alt| !alt.is_empty())
            .map(|alt| CardKey::Name(alt.to_string()))
    }

    fn detect_expansion(&self, doc: &Document) -> Option<String> {
        let heading = doc.query_selector(&self.heading).into_iter();
        let candidates = heading.chain(doc.query_selector_all(&self.set_like));
        for node in candidates {
            if let Some(code) = find_set_code(&doc.text_content(node)) {
                debug!("detected expansion {code} from <{}>", doc.tag(node));
                return Some(code);
            }
        }
        warn!("could not detect expansion on 17Lands page");
        None
    }

    fn needs_external_mapping(&self) -> bool {
        false
    }

    fn anchor(&self, doc: &Document, card: NodeId) -> Option<NodeId> {
        doc.parent(card)
    }

    fn overlay_style(&self) -> OverlayStyle {
        OverlayStyle {
            font_size: "12px",
            padding: "3px 6px",
        }
    }
}

pub fn find_set_code(text: &str) -> Option<String> {
    SET_CODE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn select_adapter(page_url: &str) -> Result<Option<Box<dyn SiteAdapter>>> {
    let host = Url::parse(page_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| page_url.to_lowercase());

    let adapter: Box<dyn SiteAdapter> = if host.contains("draftmancer.com") {
        Box::new(Draftmancer::new()?)
    } else if host.contains("17lands.com") {
        Box::new(SeventeenLands::new()?)
    } else {
        warn!("no site adapter for {page_url}; overlay disabled for this session");
        return Ok(None);
    };
    info!("detected site: {}", adapter.name());
    Ok(Some(adapter))
}
