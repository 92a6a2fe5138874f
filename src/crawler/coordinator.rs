//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that coordinates all aspects of the
//! crawling process, including:
//! - Seeding the frontier from configuration
//! - Paging through URL records and dispatching the due ones
//! - Fetching, archiving, parsing and link recording in worker tasks
//! - Repeating cycles until stopped

use crate::archive::{Archiver, BlobStore, ContentDigest, FsBlobStore};
use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, fetch, FetchOutcome};
use crate::crawler::parser::{extract_links, HtmlDocument, LinkEdge, ParsedHtml};
use crate::crawler::recorder::record_fetch;
use crate::crawler::scheduler::{Dispatch, Scheduler};
use crate::crawler::inflight::InFlightTracker;
use crate::storage::{now_seconds, LinkStore, SqliteStorage, StorageResult, UrlRecord, UrlStore};
use crate::url::normalize;
use crate::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use url::Url;

/// Counters for one crawl cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    /// URLs handed to a worker
    pub dispatched: usize,
    /// Attempts that got an HTTP response
    pub succeeded: usize,
    /// Attempts that failed in transport or timed out
    pub failed: usize,
    /// Link edges recorded
    pub links: usize,
}

impl CycleSummary {
    fn add(&mut self, report: WorkerReport) {
        if report.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.links += report.links;
    }
}

#[derive(Debug, Clone, Copy)]
struct WorkerReport {
    success: bool,
    links: usize,
}

/// Locks the shared storage, recovering the guard if a worker panicked
pub fn lock_storage(storage: &Mutex<SqliteStorage>) -> MutexGuard<'_, SqliteStorage> {
    storage.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    storage: Arc<Mutex<SqliteStorage>>,
    archiver: Archiver,
    scheduler: Scheduler,
    client: Client,
}

impl Coordinator {
    /// Opens the database and blob store named in the configuration
    pub fn new(config: Config) -> Result<Self> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let blob_store = FsBlobStore::new(&config.output.blob_path)?;
        Self::with_parts(config, storage, Arc::new(blob_store))
    }

    /// Builds a coordinator around existing collaborators and seeds the frontier
    pub fn with_parts(
        config: Config,
        storage: SqliteStorage,
        blob_store: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let client = build_http_client(&config.user_agent)?;
        let scheduler = Scheduler::new(
            Arc::new(InFlightTracker::new()),
            config.frontier.stale_duration(),
            config.crawler.max_concurrent_fetches as usize,
        );

        let coordinator = Self {
            config: Arc::new(config),
            storage: Arc::new(Mutex::new(storage)),
            archiver: Archiver::new(blob_store),
            scheduler,
            client,
        };
        coordinator.seed_frontier()?;

        Ok(coordinator)
    }

    /// Shared handle to the storage backend
    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    pub fn archiver(&self) -> &Archiver {
        &self.archiver
    }

    /// Inserts configured seeds that are not yet known
    fn seed_frontier(&self) -> Result<usize> {
        let now = now_seconds();
        let mut storage = lock_storage(&self.storage);
        let mut added = 0;

        for seed in &self.config.frontier.seeds {
            let url = normalize(seed, None)?;
            if storage.insert_url_if_absent(&UrlRecord::discovered(&url, now))? {
                added += 1;
            }
        }

        tracing::info!(
            "Seeded frontier with {} new URLs ({} configured)",
            added,
            self.config.frontier.seeds.len()
        );
        Ok(added)
    }

    /// Runs crawl cycles until `max-cycles` is reached or Ctrl-C is received
    pub async fn run(&self) -> Result<()> {
        let interval = self.config.crawler.cycle_interval();
        let max_cycles = self.config.crawler.max_cycles;
        let mut cycle: u32 = 0;

        loop {
            cycle += 1;
            let started = Instant::now();

            let summary = tokio::select! {
                result = self.run_cycle() => result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted during cycle {}, stopping", cycle);
                    break;
                }
            };

            tracing::info!(
                "Cycle {} complete in {:?}: {} dispatched, {} succeeded, {} failed, {} links",
                cycle,
                started.elapsed(),
                summary.dispatched,
                summary.succeeded,
                summary.failed,
                summary.links
            );

            if max_cycles.is_some_and(|max| cycle >= max) {
                tracing::info!("Reached max-cycles ({}), stopping", cycle);
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, stopping after cycle {}", cycle);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Runs one pass over the frontier
    ///
    /// Pages through URL records, claims the due ones and fetches them on a
    /// worker pool bounded by the scheduler's permits. Returns once every
    /// dispatched worker has finished.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let now = Utc::now();
        let batch_size = self.config.frontier.batch_size;
        let mut offset: u32 = 0;
        let mut dispatched = HashSet::new();
        let mut workers = JoinSet::new();
        let mut summary = CycleSummary::default();

        loop {
            let page = lock_storage(&self.storage).list_urls(batch_size, offset, None)?;
            let page_len = page.len();

            for dispatch in self.scheduler.select_due(page, now) {
                // Discoveries shift later pages; never fetch a URL twice per cycle
                if !dispatched.insert(dispatch.record.url.clone()) {
                    continue;
                }

                let Some(permit) = self.scheduler.acquire_permit().await else {
                    tracing::warn!("Fetch permits closed, ending cycle early");
                    break;
                };

                let worker = self.worker();
                workers.spawn(async move {
                    let _permit = permit;
                    worker.process(dispatch).await
                });
                summary.dispatched += 1;
            }

            if page_len < batch_size as usize {
                break;
            }
            offset = offset.saturating_add(batch_size);
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => summary.add(report),
                Err(e) => tracing::error!("Worker task failed: {}", e),
            }
        }

        Ok(summary)
    }

    fn worker(&self) -> Worker {
        Worker {
            storage: Arc::clone(&self.storage),
            archiver: self.archiver.clone(),
            client: self.client.clone(),
            fetch_timeout: self.config.crawler.fetch_timeout(),
        }
    }
}

/// Everything a worker task needs, cloned out of the coordinator
struct Worker {
    storage: Arc<Mutex<SqliteStorage>>,
    archiver: Archiver,
    client: Client,
    fetch_timeout: Duration,
}

impl Worker {
    async fn process(self, dispatch: Dispatch) -> WorkerReport {
        let Dispatch {
            record,
            method,
            claim,
        } = dispatch;

        let url = match Url::parse(&record.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Stored URL {} is unparseable: {}", record.url, e);
                return WorkerReport {
                    success: false,
                    links: 0,
                };
            }
        };

        let outcome = fetch(&self.client, &url, method, self.fetch_timeout).await;
        let page = self.archive_and_parse(&outcome);

        let report = self.persist(&record, &outcome, page, now_seconds());
        drop(claim);
        report
    }

    /// Archives a non-empty GET body and, for HTML, extracts title and links
    fn archive_and_parse(&self, outcome: &FetchOutcome) -> PageContent {
        let mut page = PageContent::default();

        let Some(response) = outcome.response() else {
            return page;
        };
        let Some(body) = response.body.as_deref().filter(|b| !b.is_empty()) else {
            return page;
        };

        match self.archiver.archive(body) {
            Ok(archived) => page.hash = Some(archived.digest),
            Err(e) => tracing::error!("Failed to archive body of {}: {}", outcome.url, e),
        }

        if response.is_html() {
            let doc = ParsedHtml::from_bytes(body);
            page.title = doc.title();
            page.links = extract_links(&doc, &outcome.url).collect();
        }

        page
    }

    fn persist(
        &self,
        record: &UrlRecord,
        outcome: &FetchOutcome,
        page: PageContent,
        now: DateTime<Utc>,
    ) -> WorkerReport {
        let mut storage = lock_storage(&self.storage);

        if let Err(e) = record_fetch(
            &mut *storage,
            record,
            outcome,
            page.title.as_deref(),
            page.hash,
            now,
        ) {
            tracing::error!("Failed to record fetch of {}: {}", record.url, e);
        }

        let mut links = 0;
        for edge in &page.links {
            match record_link(&mut *storage, edge, now) {
                Ok(()) => links += 1,
                Err(e) => tracing::error!(
                    "Failed to record link {} -> {}: {}",
                    edge.src,
                    edge.dst,
                    e
                ),
            }
        }

        WorkerReport {
            success: outcome.is_success(),
            links,
        }
    }
}

#[derive(Debug, Default)]
struct PageContent {
    hash: Option<ContentDigest>,
    title: Option<String>,
    links: Vec<LinkEdge>,
}

/// Ensures the destination is known, then records or refreshes the edge
fn record_link<S>(storage: &mut S, edge: &LinkEdge, now: DateTime<Utc>) -> StorageResult<()>
where
    S: UrlStore + LinkStore + ?Sized,
{
    if storage.insert_url_if_absent(&UrlRecord::discovered(&edge.dst, now))? {
        tracing::debug!("Discovered {}", edge.dst);
    }
    storage.upsert_link(edge.src.as_str(), edge.dst.as_str(), now)
}
