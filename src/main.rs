use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use rand::rngs::ThreadRng;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use gih_overlay::config::Settings;
use gih_overlay::dom::Document;
use gih_overlay::draft_sim::{DraftPage, PoolCard, load_pool};
use gih_overlay::engine::{Job, MutationVerdict, OverlayEngine};
use gih_overlay::kv_store::{FileStore, KvStore, MemoryStore};
use gih_overlay::logging;
use gih_overlay::overlay::{ColorTier, overlay_on};
use gih_overlay::providers::{ScryfallClient, SeventeenLandsClient};
use gih_overlay::release_dates::ReleaseDateCache;
use gih_overlay::site::{SiteKind, select_adapter};
use gih_overlay::stats::{LoadOutcome, StatisticsStore};
use gih_overlay::worker::{Delta, Providers, Worker, spawn_worker};

struct App {
    engine: OverlayEngine,
    doc: Document,
    page: DraftPage,
    job_tx: mpsc::Sender<Job>,
    rng: ThreadRng,
    logs: VecDeque<String>,
    selected: usize,
    input: Option<String>,
    help_overlay: bool,
    should_quit: bool,
    started: bool,
    launched_at: Instant,
    startup_delay: Duration,
}

impl App {
    fn on_key(&mut self, key: KeyEvent) {
        if let Some(input) = self.input.as_mut() {
            match key.code {
                KeyCode::Char(c) if c.is_ascii_alphanumeric() && input.len() < 8 => {
                    input.push(c.to_ascii_uppercase());
                }
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Enter => {
                    let code = self.input.take().unwrap_or_default();
                    if !code.is_empty() {
                        self.push_log(format!("[INFO] Manual expansion override: {code}"));
                        let jobs = self.engine.reload(&mut self.doc, Some(&code));
                        self.dispatch(jobs);
                    }
                }
                KeyCode::Esc => self.input = None,
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('a') | KeyCode::Char('A') => {
                let jobs = self.engine.toggle(&mut self.doc);
                let state = if self.engine.is_enabled() { "ON" } else { "OFF" };
                self.push_log(format!("[INFO] GIH WR overlay: {state}"));
                self.dispatch(jobs);
            }
            KeyCode::Char('r') | KeyCode::Char('R') => {
                self.push_log("[INFO] Reloading card data...");
                let jobs = self.engine.reload(&mut self.doc, None);
                if jobs.is_empty() {
                    self.push_log("[WARN] No expansion detected. Press s to set one.");
                }
                self.dispatch(jobs);
            }
            KeyCode::Char('s') | KeyCode::Char('S') => self.input = Some(String::new()),
            KeyCode::Char('n') | KeyCode::Char('N') => self.deal_pack(),
            KeyCode::Char('p') | KeyCode::Enter => {
                if let Some(name) = self.page.pick(&mut self.doc, self.selected) {
                    self.push_log(format!("[INFO] Picked {name}"));
                    self.selected = self.selected.min(self.page.cards().len().saturating_sub(1));
                }
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected + 1 < self.page.cards().len() {
                    self.selected += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Char('?') => self.help_overlay = !self.help_overlay,
            _ => {}
        }
    }

    fn deal_pack(&mut self) {
        if self.page.pool_len() == 0 {
            let names = self.engine.stats().table().names();
            if names.is_empty() {
                self.push_log("[INFO] No card pool yet; waiting for card data");
                return;
            }
            if self.page.kind() == SiteKind::Draftmancer {
                self.push_log("[WARN] Pool has no Scryfall ids; set GIH_POOL_FILE for Draftmancer");
            }
            self.page.set_pool(
                names
                    .into_iter()
                    .map(|name| PoolCard {
                        name,
                        scryfall_id: None,
                    })
                    .collect(),
            );
        }
        let dealt = self.page.deal_pack(&mut self.doc, &mut self.rng);
        self.selected = 0;
        self.push_log(format!("[INFO] New pack: {dealt} cards"));
    }

    fn maybe_start(&mut self) {
        if self.started || self.launched_at.elapsed() < self.startup_delay {
            return;
        }
        self.started = true;
        let jobs = self.engine.start(&self.doc, Utc::now().timestamp_millis());
        if jobs.is_empty() {
            self.push_log("[WARN] No expansion detected. Press s to set it manually.");
        }
        self.dispatch(jobs);
    }

    fn observe(&mut self) {
        let now = Instant::now();
        let records = self.doc.take_mutations();
        if self.engine.on_mutations(&mut self.doc, &records, now) == MutationVerdict::CardConsumed
        {
            self.push_log("[INFO] Card selected - GIH WR overlay turned OFF");
        }
        let jobs = self.engine.poll(&mut self.doc, now);
        self.dispatch(jobs);
        self.doc.release_detached();
    }

    fn apply_delta(&mut self, delta: Delta) {
        match delta {
            Delta::Log(msg) => self.push_log(msg),
            Delta::Names(outcome) => {
                let msg = if outcome.complete {
                    format!("[INFO] Mapped {} card names", outcome.names.len())
                } else {
                    format!(
                        "[WARN] Name mapping incomplete ({} of {})",
                        outcome.names.len(),
                        outcome.requested
                    )
                };
                self.engine.apply_names(&mut self.doc, outcome);
                self.push_log(msg);
            }
            Delta::Statistics { expansion, result } => {
                let now_ms = Utc::now().timestamp_millis();
                match self
                    .engine
                    .apply_statistics(&mut self.doc, &expansion, result, now_ms)
                {
                    LoadOutcome::Fresh(count) => {
                        self.push_log(format!("[INFO] Loaded {count} cards for {expansion}"));
                    }
                    LoadOutcome::Cached(count) => self.push_log(format!(
                        "[WARN] Fetch failed; using {count} cached cards for {expansion}"
                    )),
                    LoadOutcome::Unchanged => {
                        self.push_log(format!("[WARN] No card data for {expansion}"));
                    }
                }
                if self.page.cards().is_empty() && self.engine.stats().is_loaded() {
                    self.deal_pack();
                }
            }
        }
    }

    fn dispatch(&mut self, jobs: Vec<Job>) {
        for job in jobs {
            if self.job_tx.send(job).is_err() {
                self.push_log("[WARN] Fetch worker unavailable");
                return;
            }
        }
    }

    fn push_log(&mut self, msg: impl Into<String>) {
        const MAX_LOGS: usize = 200;
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let settings = Settings::from_env();

    let file_store = settings
        .cache_dir
        .clone()
        .map(FileStore::new)
        .or_else(FileStore::in_user_cache);
    if let Some(store) = &file_store
        && let Err(err) = logging::init(store.dir())
    {
        eprintln!("warning: logging disabled: {err}");
    }

    let Some(adapter) = select_adapter(&settings.page_url)? else {
        eprintln!(
            "warning: {} is not a supported site (Draftmancer or 17Lands); nothing to do",
            settings.page_url
        );
        return Ok(());
    };
    let kind = adapter.kind();

    let store: Arc<dyn KvStore> = match file_store {
        Some(store) => Arc::new(store),
        None => {
            tracing::warn!("no cache directory available; caching in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let pool = match &settings.pool_file {
        Some(path) => load_pool(path)?,
        None => Vec::new(),
    };
    let mut doc = Document::new();
    let page = DraftPage::build(
        &mut doc,
        kind,
        settings.expansion.as_deref(),
        pool,
        settings.pack_size,
    );

    let mut engine = OverlayEngine::new(
        adapter,
        StatisticsStore::new(store.clone()),
        settings.quiescence,
    );
    if let Some(code) = &settings.expansion {
        engine.set_manual_expansion(code);
    }

    let (tx, rx) = mpsc::channel();
    let (job_tx, job_rx) = mpsc::channel();
    let worker = Worker::new(
        Providers {
            stats: Box::new(SeventeenLandsClient),
            cards: Box::new(ScryfallClient),
            sets: Box::new(ScryfallClient),
        },
        ReleaseDateCache::load(store),
        &settings.format,
    );
    spawn_worker(worker, tx, job_rx);

    let mut app = App {
        engine,
        doc,
        page,
        job_tx,
        rng: rand::thread_rng(),
        logs: VecDeque::new(),
        selected: 0,
        input: None,
        help_overlay: false,
        should_quit: false,
        started: false,
        launched_at: Instant::now(),
        startup_delay: settings.startup_delay,
    };
    if app.page.pool_len() > 0 {
        app.deal_pack();
    }
    let site = app.engine.adapter().name();
    app.push_log(format!("[INFO] GIH WR overlay loaded for {site}"));
    app.push_log("[INFO] a toggle | r reload | s set expansion");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, rx);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(50);

    loop {
        while let Ok(delta) = rx.try_recv() {
            app.apply_delta(delta);
        }

        app.maybe_start();
        app.observe();

        terminal.draw(|f| ui(f, app))?;

        if event::poll(tick_rate)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(3),
            Constraint::Length(8),
            Constraint::Length(2),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(app)).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    render_pack(frame, chunks[1], app);
    render_console(frame, chunks[2], app);

    let footer = Paragraph::new(footer_text(app)).block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[3]);

    if app.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(app: &App) -> String {
    let engine = &app.engine;
    let expansion = engine
        .requested_expansion()
        .or(engine.manual_expansion())
        .unwrap_or("?");
    let overlay = if engine.is_enabled() { "ON" } else { "OFF" };
    let pending = if engine.render_pending() { " *" } else { "" };
    format!(
        "GIH WR | {} | Set: {} | Overlay: {}{} | Cards: {} | Names: {} | Renders: {}",
        engine.adapter().name(),
        expansion,
        overlay,
        pending,
        engine.stats().table().len(),
        engine.names().len(),
        engine.render_passes()
    )
}

fn footer_text(app: &App) -> String {
    match &app.input {
        Some(input) => format!("Expansion code (e.g. FIN, MH3, BLB): {input}_   Enter confirm | Esc cancel"),
        None => "a Overlay | r Reload | s Set | n New pack | p/Enter Pick | j/k Move | ? Help | q Quit"
            .to_string(),
    }
}

fn render_pack(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(format!("Pack ({} picked)", app.page.picks().len()))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let cards = app.page.cards();
    if cards.is_empty() {
        let empty = Paragraph::new("No cards on the page. Press n to open a pack.")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, inner);
        return;
    }

    let visible = inner.height as usize;
    let start = app.selected.saturating_sub(visible.saturating_sub(1));
    let lines: Vec<Line> = cards
        .iter()
        .enumerate()
        .skip(start)
        .take(visible)
        .map(|(idx, (node, card))| {
            let selected = idx == app.selected;
            let name_style = if selected {
                Style::default().fg(Color::White).bg(Color::DarkGray)
            } else {
                Style::default()
            };
            let mut spans = vec![Span::styled(format!("{:<36}", card.name), name_style)];
            let overlay = app
                .engine
                .adapter()
                .anchor(&app.doc, *node)
                .and_then(|anchor| overlay_on(&app.doc, anchor));
            if let Some(overlay) = overlay {
                let color = app
                    .doc
                    .style(overlay, "color")
                    .and_then(hex_color)
                    .unwrap_or(Color::White);
                spans.push(Span::styled(
                    app.doc.text_content(overlay),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ));
            }
            Line::from(spans)
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_console(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default().title("Console").borders(Borders::ALL);
    let height = block.inner(area).height as usize;
    let skip = app.logs.len().saturating_sub(height);
    let text = app
        .logs
        .iter()
        .skip(skip)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let mut lines: Vec<Line> = [
        "GIH WR Overlay - Help",
        "",
        "  a            Toggle overlay",
        "  r            Reload card data",
        "  s            Set expansion code",
        "  n            Open a new pack",
        "  p / Enter    Pick selected card",
        "  j/k or ↑/↓   Move selection",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Picking a card turns the overlay off.",
        "",
    ]
    .into_iter()
    .map(Line::from)
    .collect();
    for tier in ColorTier::ALL.iter().rev() {
        let color = hex_color(tier.color()).unwrap_or(Color::White);
        lines.push(Line::from(vec![
            Span::styled("  ■ ", Style::default().fg(color)),
            Span::raw(tier.label()),
        ]));
    }

    let help = Paragraph::new(lines)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}

fn hex_color(raw: &str) -> Option<Color> {
    let hex = raw.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::Rgb(r, g, b))
}
