use once_cell::sync::Lazy;
use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::identity::NameMap;
use crate::selector::Selector;
use crate::site::SiteAdapter;
use crate::stats::{CardStatRecord, StatisticsStore};

pub const OVERLAY_CLASS: &str = "gih-wr-overlay";
pub const LOW_SAMPLE_THRESHOLD: u64 = 500;
const LOW_SAMPLE_MARKER: &str = "⚠️ ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColorTier {
    BelowAverage,
    Average,
    AboveAverage,
    Good,
    Excellent,
}

impl ColorTier {
    pub const ALL: [ColorTier; 5] = [
        ColorTier::BelowAverage,
        ColorTier::Average,
        ColorTier::AboveAverage,
        ColorTier::Good,
        ColorTier::Excellent,
    ];

    pub fn from_win_rate(win_rate: f64) -> Self {
        if win_rate >= 0.58 {
            ColorTier::Excellent
        } else if win_rate >= 0.55 {
            ColorTier::Good
        } else if win_rate >= 0.52 {
            ColorTier::AboveAverage
        } else if win_rate >= 0.50 {
            ColorTier::Average
        } else {
            ColorTier::BelowAverage
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            ColorTier::Excellent => "#60a5fa",
            ColorTier::Good => "#93c5fd",
            ColorTier::AboveAverage => "#e0e7ff",
            ColorTier::Average => "#fbbf24",
            ColorTier::BelowAverage => "#fb923c",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ColorTier::Excellent => "excellent",
            ColorTier::Good => "good",
            ColorTier::AboveAverage => "above-average",
            ColorTier::Average => "average",
            ColorTier::BelowAverage => "below-average",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub text: String,
    pub tier: ColorTier,
    pub low_sample: bool,
}

impl Annotation {
    pub fn for_record(record: &CardStatRecord) -> Option<Self> {
        let win_rate = record.win_rate?;
        let low_sample = record.sample_size < LOW_SAMPLE_THRESHOLD;
        let marker = if low_sample { LOW_SAMPLE_MARKER } else { "" };
        Some(Self {
            text: format!("{marker}GIH: {:.1}%", win_rate * 100.0),
            tier: ColorTier::from_win_rate(win_rate),
            low_sample,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderResult {
    Attached(NodeId),
    AlreadyPresent,
    NoName,
    NoData,
    NoAnchor,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub cards: usize,
    pub attached: usize,
    pub already_present: usize,
    pub skipped: usize,
}

pub struct Renderer<'a> {
    pub adapter: &'a dyn SiteAdapter,
    pub names: &'a NameMap,
    pub stats: &'a StatisticsStore,
}

impl Renderer<'_> {
    pub fn render(&self, doc: &mut Document, card: NodeId) -> RenderResult {
        let Some(anchor) = self.adapter.anchor(doc, card) else {
            return RenderResult::NoAnchor;
        };
        if overlay_on(doc, anchor).is_some() {
            return RenderResult::AlreadyPresent;
        }
        let Some(key) = self.adapter.card_key(doc, card) else {
            return RenderResult::NoName;
        };
        let Some(name) = self.names.name_of(&key) else {
            return RenderResult::NoName;
        };
        let Some(annotation) = self.stats.lookup(name).and_then(Annotation::for_record) else {
            return RenderResult::NoData;
        };

        let style = self.adapter.overlay_style();
        let node = doc.create_element("div", &[("class", OVERLAY_CLASS)]);
        doc.set_attr(node, "data-tier", annotation.tier.label());
        doc.set_text(node, &annotation.text);
        for (property, value) in [
            ("position", "absolute"),
            ("top", "32px"),
            ("right", "8px"),
            ("background", "rgba(0, 0, 0, 0.85)"),
            ("color", annotation.tier.color()),
            ("padding", style.padding),
            ("border-radius", "4px"),
            ("font-weight", "bold"),
            ("font-size", style.font_size),
            ("z-index", "1000"),
            ("pointer-events", "none"),
        ] {
            doc.set_style(node, property, value);
        }
        doc.set_style(anchor, "position", "relative");
        doc.append_child(anchor, node);
        RenderResult::Attached(node)
    }

    pub fn render_all(&self, doc: &mut Document) -> RenderSummary {
        let cards = self.adapter.enumerate_cards(doc);
        let mut summary = RenderSummary {
            cards: cards.len(),
            ..RenderSummary::default()
        };
        for card in cards {
            match self.render(doc, card) {
                RenderResult::Attached(_) => summary.attached += 1,
                RenderResult::AlreadyPresent => summary.already_present += 1,
                _ => summary.skipped += 1,
            }
        }
        debug!(
            "render pass: {} cards, {} attached, {} present, {} skipped",
            summary.cards, summary.attached, summary.already_present, summary.skipped
        );
        summary
    }
}

static OVERLAY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".gih-wr-overlay").expect("overlay class is a valid selector"));

pub fn overlay_on(doc: &Document, anchor: NodeId) -> Option<NodeId> {
    doc.children(anchor)
        .iter()
        .copied()
        .find(|child| doc.has_class(*child, OVERLAY_CLASS))
        .or_else(|| doc.query_selector_within(anchor, &OVERLAY_SELECTOR))
}

pub fn clear_all(doc: &mut Document) -> usize {
    let overlays = doc.query_selector_all(&OVERLAY_SELECTOR);
    for node in &overlays {
        doc.remove(*node);
    }
    overlays.len()
}
