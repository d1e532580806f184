use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use crate::engine::Job;
use crate::identity::{MAPPING_BATCH_DELAY, MappingOutcome, resolve_names};
use crate::providers::{CardDatabase, SetMetadata, StatsProvider};
use crate::release_dates::ReleaseDateCache;
use crate::stats::{StatisticsTable, fetch_table};

pub enum Delta {
    Names(MappingOutcome),
    Statistics {
        expansion: String,
        result: Result<StatisticsTable>,
    },
    Log(String),
}

pub struct Providers {
    pub stats: Box<dyn StatsProvider + Send>,
    pub cards: Box<dyn CardDatabase + Send>,
    pub sets: Box<dyn SetMetadata + Send>,
}

pub struct Worker {
    providers: Providers,
    release_dates: ReleaseDateCache,
    format: String,
    batch_delay: Duration,
}

impl Worker {
    pub fn new(providers: Providers, release_dates: ReleaseDateCache, format: &str) -> Self {
        Self {
            providers,
            release_dates,
            format: format.to_string(),
            batch_delay: MAPPING_BATCH_DELAY,
        }
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn run_job(&mut self, job: Job) -> Delta {
        match job {
            Job::ResolveNames { ids } => {
                debug!("resolving {} card ids", ids.len());
                Delta::Names(resolve_names(
                    &ids,
                    self.providers.cards.as_ref(),
                    self.batch_delay,
                ))
            }
            Job::LoadStatistics { expansion } => {
                info!("fetching card data for {expansion}");
                let today = Utc::now().date_naive();
                let result = fetch_table(
                    &expansion,
                    &self.format,
                    self.providers.stats.as_ref(),
                    &mut self.release_dates,
                    self.providers.sets.as_ref(),
                    today,
                );
                Delta::Statistics { expansion, result }
            }
        }
    }
}

pub fn spawn_worker(mut worker: Worker, tx: Sender<Delta>, job_rx: Receiver<Job>) -> JoinHandle<()> {
    thread::spawn(move || {
        for job in job_rx {
            let label = match &job {
                Job::ResolveNames { ids } => format!("[INFO] Mapping {} card ids", ids.len()),
                Job::LoadStatistics { expansion } => format!("[INFO] Fetching {expansion} ratings"),
            };
            if tx.send(Delta::Log(label)).is_err() {
                break;
            }
            let delta = worker.run_job(job);
            if tx.send(delta).is_err() {
                break;
            }
        }
    })
}
