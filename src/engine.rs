use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::dom::{Document, MutationRecord, NodeId};
use crate::identity::{MappingOutcome, NameMap};
use crate::overlay::{RenderSummary, Renderer, clear_all};
use crate::site::SiteAdapter;
use crate::stats::{LoadOutcome, StatisticsStore, StatisticsTable};

pub const DEFAULT_QUIESCENCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Disabled,
    Enabled,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// True exactly once per scheduled deadline, when it has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    ResolveNames { ids: Vec<String> },
    LoadStatistics { expansion: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationVerdict {
    Ignored,
    CardConsumed,
    RenderScheduled,
}

pub struct OverlayEngine {
    adapter: Box<dyn SiteAdapter>,
    stats: StatisticsStore,
    names: NameMap,
    state: OverlayState,
    debouncer: Debouncer,
    manual_expansion: Option<String>,
    requested_expansion: Option<String>,
    render_passes: u64,
}

impl OverlayEngine {
    pub fn new(adapter: Box<dyn SiteAdapter>, stats: StatisticsStore, quiescence: Duration) -> Self {
        Self {
            adapter,
            stats,
            names: NameMap::default(),
            state: OverlayState::Disabled,
            debouncer: Debouncer::new(quiescence),
            manual_expansion: None,
            requested_expansion: None,
            render_passes: 0,
        }
    }

    pub fn adapter(&self) -> &dyn SiteAdapter {
        self.adapter.as_ref()
    }

    pub fn stats(&self) -> &StatisticsStore {
        &self.stats
    }

    pub fn names(&self) -> &NameMap {
        &self.names
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state == OverlayState::Enabled
    }

    pub fn render_passes(&self) -> u64 {
        self.render_passes
    }

    pub fn render_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn manual_expansion(&self) -> Option<&str> {
        self.manual_expansion.as_deref()
    }

    pub fn requested_expansion(&self) -> Option<&str> {
        self.requested_expansion.as_deref()
    }

    pub fn set_manual_expansion(&mut self, code: &str) -> Option<&str> {
        let code = code.trim().to_uppercase();
        self.manual_expansion = if code.is_empty() { None } else { Some(code) };
        if let Some(code) = &self.manual_expansion {
            info!("manual expansion override set to {code}");
        }
        self.manual_expansion.as_deref()
    }

    pub fn active_expansion(&self, doc: &Document) -> Option<String> {
        self.manual_expansion
            .clone()
            .or_else(|| self.adapter.detect_expansion(doc))
    }

    pub fn start(&mut self, doc: &Document, now_ms: i64) -> Vec<Job> {
        let Some(expansion) = self.active_expansion(doc) else {
            warn!("no expansion detected; set one manually to load data");
            return Vec::new();
        };
        let mut jobs = self.mapping_jobs(doc);
        if !self.stats.is_loaded() {
            self.stats.restore_snapshot(&expansion, now_ms);
        }
        self.requested_expansion = Some(expansion.clone());
        jobs.push(Job::LoadStatistics { expansion });
        jobs
    }

    pub fn toggle(&mut self, doc: &mut Document) -> Vec<Job> {
        match self.state {
            OverlayState::Enabled => {
                self.disable(doc);
                info!("overlay off");
                Vec::new()
            }
            OverlayState::Disabled => {
                self.state = OverlayState::Enabled;
                info!("overlay on");
                let jobs = self.mapping_jobs(doc);
                // With ids still unmapped, the render follows the mapping.
                if jobs.is_empty() {
                    self.render_all(doc);
                }
                jobs
            }
        }
    }

    pub fn reload(&mut self, doc: &mut Document, expansion_override: Option<&str>) -> Vec<Job> {
        if let Some(code) = expansion_override {
            self.set_manual_expansion(code);
        }
        self.stats.reset();
        self.names.clear();
        if self.is_enabled() {
            clear_all(doc);
        }
        let Some(expansion) = self.active_expansion(doc) else {
            warn!("reload skipped: no expansion detected");
            self.requested_expansion = None;
            return Vec::new();
        };
        info!("reloading card data for {expansion}");
        let mut jobs = self.mapping_jobs(doc);
        self.requested_expansion = Some(expansion.clone());
        jobs.push(Job::LoadStatistics { expansion });
        jobs
    }

    /// Handles one batch of page mutations. A removed card wins over any
    /// added cards in the same batch.
    pub fn on_mutations(
        &mut self,
        doc: &mut Document,
        records: &[MutationRecord],
        now: Instant,
    ) -> MutationVerdict {
        if !self.is_enabled() || records.is_empty() {
            return MutationVerdict::Ignored;
        }
        let card_removed = records
            .iter()
            .any(|r| r.removed.iter().any(|n| self.touches_card(doc, *n)));
        if card_removed {
            self.disable(doc);
            info!("card picked; overlay turned off");
            return MutationVerdict::CardConsumed;
        }
        let card_added = records
            .iter()
            .any(|r| r.added.iter().any(|n| self.touches_card(doc, *n)));
        if card_added {
            self.debouncer.schedule(now);
            return MutationVerdict::RenderScheduled;
        }
        MutationVerdict::Ignored
    }

    pub fn poll(&mut self, doc: &mut Document, now: Instant) -> Vec<Job> {
        if !self.debouncer.fire_if_due(now) || !self.is_enabled() {
            return Vec::new();
        }
        self.render_all(doc);
        self.mapping_jobs(doc)
    }

    pub fn render_all(&mut self, doc: &mut Document) -> RenderSummary {
        self.render_passes += 1;
        if !self.stats.is_loaded() {
            debug!("render pass skipped: no data loaded");
            return RenderSummary::default();
        }
        let renderer = Renderer {
            adapter: self.adapter.as_ref(),
            names: &self.names,
            stats: &self.stats,
        };
        renderer.render_all(doc)
    }

    pub fn apply_names(&mut self, doc: &mut Document, outcome: MappingOutcome) {
        if !outcome.complete {
            warn!(
                "name mapping incomplete: {} of {} ids resolved",
                outcome.names.len(),
                outcome.requested
            );
        }
        self.names.merge(outcome.names);
        if self.is_enabled() {
            self.render_all(doc);
        }
    }

    /// Applies a finished statistics fetch. Results for an expansion other
    /// than the one last requested are dropped.
    pub fn apply_statistics(
        &mut self,
        doc: &mut Document,
        expansion: &str,
        result: Result<StatisticsTable>,
        now_ms: i64,
    ) -> LoadOutcome {
        if self.requested_expansion.as_deref() != Some(expansion) {
            debug!("dropping stale statistics for {expansion}");
            return LoadOutcome::Unchanged;
        }
        let outcome = self.stats.apply_fetch(expansion, result, now_ms);
        if outcome != LoadOutcome::Unchanged && self.is_enabled() {
            clear_all(doc);
            self.render_all(doc);
        }
        outcome
    }

    fn disable(&mut self, doc: &mut Document) {
        self.state = OverlayState::Disabled;
        self.debouncer.cancel();
        clear_all(doc);
    }

    fn mapping_jobs(&self, doc: &Document) -> Vec<Job> {
        if !self.adapter.needs_external_mapping() {
            return Vec::new();
        }
        let ids = self.names.missing(self.adapter.opaque_keys(doc));
        if ids.is_empty() {
            return Vec::new();
        }
        vec![Job::ResolveNames { ids }]
    }

    fn touches_card(&self, doc: &Document, node: NodeId) -> bool {
        let selector = self.adapter.card_selector();
        doc.matches(node, selector) || doc.query_selector_within(node, selector).is_some()
    }
}
