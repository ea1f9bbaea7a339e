// src/sync/orchestrator.rs

//! The sync orchestrator: drives paged crawls across all adapters.
//!
//! Concurrency here is bounded and paced on purpose. Items are fetched in
//! fixed-size batches with a jittered delay before each fetch and a fixed
//! pause between batches, as a rate-limit courtesy to the upstream hosts.
//! Failures never escape a single item's scope: pages and ranges always
//! complete, and the caller gets an aggregate report.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;

use crate::config::{Config, SyncConfig};
use crate::error::Result;
use crate::models::{CanonicalItem, ListEntry, RawDetail};
use crate::notify::{ChangeNotifier, NotificationSink, UserDirectory};
use crate::reconcile::Reconciler;
use crate::sources::{SourceAdapter, SourceId, build_adapters};
use crate::store::ContentStore;
use crate::sync::state::{PageRange, RunGuard, SyncDepth, SyncReport, SyncState, SyncStatus};

/// Outcome of processing one listed item.
enum ItemOutcome {
    Processed { notified: usize },
    Skipped,
    Failed,
}

/// Single-instance-per-process sync driver.
pub struct SyncOrchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    store: Arc<dyn ContentStore>,
    reconciler: Reconciler,
    notifier: ChangeNotifier,
    config: SyncConfig,
    state: SyncState,
}

impl SyncOrchestrator {
    pub fn new(
        mut adapters: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<dyn ContentStore>,
        reconciler: Reconciler,
        notifier: ChangeNotifier,
        config: SyncConfig,
    ) -> Self {
        // Priority is explicit on every merged stream group, so adapter
        // order cannot change the merged outcome; sorting just makes
        // logs and fallback order predictable.
        adapters.sort_by_key(|a| a.id().priority());
        Self {
            adapters,
            store,
            reconciler,
            notifier,
            config,
            state: SyncState::new(),
        }
    }

    /// Assemble the full pipeline from configuration.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn ContentStore>,
        directory: Arc<dyn UserDirectory>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let adapters = build_adapters(config)?;
        let reconciler = Reconciler::from_config(&config.popularity);
        let notifier = ChangeNotifier::new(directory, sink, config.sync.notify_window_days);
        Ok(Self::new(
            adapters,
            store,
            reconciler,
            notifier,
            config.sync.clone(),
        ))
    }

    /// Run a sync pass over `range`.
    ///
    /// Rejects with [`crate::error::AppError::SyncAlreadyRunning`] while
    /// another run is in flight; the in-progress run is left untouched.
    pub async fn trigger_sync(&self, range: PageRange, depth: SyncDepth) -> Result<SyncReport> {
        self.state.try_begin_run()?;
        let _guard = RunGuard(&self.state);

        log::info!(
            "sync starting: pages {}..={}, {:?} pass, {} sources",
            range.start,
            range.end,
            depth,
            self.adapters.len()
        );

        let mut report = SyncReport::default();
        'pages: for page in range.pages() {
            self.state.set_current_page(page);

            for adapter in &self.adapters {
                if self.state.stop_requested() {
                    report.stopped = true;
                    break 'pages;
                }

                let entries = adapter.list_page(page).await;
                log::debug!("{} page {page}: {} item(s)", adapter.id(), entries.len());
                self.process_page(adapter, entries, depth, &mut report).await;
            }
            report.pages += 1;
        }

        log::info!(
            "sync finished: {} page(s), {} processed, {} failed, {} skipped, {} notified{}",
            report.pages,
            report.processed,
            report.failed,
            report.skipped,
            report.notified,
            if report.stopped { " (stopped)" } else { "" }
        );
        Ok(report)
    }

    /// Request a cooperative stop. The in-flight batch always finishes.
    pub fn stop(&self) {
        self.state.request_stop();
    }

    /// Read-only status snapshot, safe to poll during a run.
    pub fn status(&self) -> SyncStatus {
        self.state.status()
    }

    pub fn blacklist(&self) -> Vec<String> {
        self.state.blacklist_snapshot()
    }

    pub fn add_to_blacklist(&self, slug: &str) -> bool {
        self.state.add_to_blacklist(slug)
    }

    pub fn remove_from_blacklist(&self, slug: &str) -> bool {
        self.state.remove_from_blacklist(slug)
    }

    /// On-demand single-item fetch, independent of the run cycle.
    ///
    /// An operator-triggered fetch is an explicit override of the circuit
    /// breaker: the slug is cleared from the blacklist before any attempt,
    /// regardless of outcome. Sources are tried in priority order (or only
    /// the hinted one), stopping at the first success.
    pub async fn fetch_specific_item(
        &self,
        slug: &str,
        hint: Option<SourceId>,
    ) -> Result<Option<CanonicalItem>> {
        if self.state.remove_from_blacklist(slug) {
            log::info!("'{slug}' removed from blacklist for on-demand fetch");
        }

        for adapter in self.adapters_for(hint) {
            match adapter.fetch_detail(slug).await {
                Ok(Some(raw)) => {
                    let existing = self.store.get(slug).await?;
                    let (item, _) = self.ingest(existing.as_ref(), raw, adapter.id()).await?;
                    return Ok(Some(item));
                }
                Ok(None) => {}
                Err(error) => {
                    log::warn!("{} on-demand fetch '{slug}' failed: {error}", adapter.id());
                }
            }
        }
        Ok(None)
    }

    /// Name-based search against one source's listing. No persistence.
    pub async fn search_by_name(&self, query: &str, hint: Option<SourceId>) -> Vec<ListEntry> {
        match self.adapters_for(hint).first() {
            Some(adapter) => adapter.search(query).await,
            None => Vec::new(),
        }
    }

    fn adapters_for(&self, hint: Option<SourceId>) -> Vec<&Arc<dyn SourceAdapter>> {
        match hint {
            Some(id) => self.adapters.iter().filter(|a| a.id() == id).collect(),
            None => self.adapters.iter().collect(),
        }
    }

    /// Process one adapter's page listing in fixed-size batches.
    async fn process_page(
        &self,
        adapter: &Arc<dyn SourceAdapter>,
        entries: Vec<ListEntry>,
        depth: SyncDepth,
        report: &mut SyncReport,
    ) {
        let mut pending = Vec::new();
        for entry in entries {
            if self.state.is_blacklisted(&entry.slug) {
                log::debug!("'{}' blacklisted, skipping", entry.slug);
                report.skipped += 1;
            } else {
                pending.push(entry);
            }
        }

        let batch_pause = Duration::from_millis(self.config.batch_pause_ms);
        for batch in pending.chunks(self.config.max_concurrent.max(1)) {
            if self.state.stop_requested() {
                report.stopped = true;
                return;
            }

            let outcomes = join_all(
                batch
                    .iter()
                    .map(|entry| self.process_entry(adapter, entry, depth)),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Processed { notified } => {
                        report.processed += 1;
                        report.notified += notified as u64;
                    }
                    ItemOutcome::Skipped => report.skipped += 1,
                    ItemOutcome::Failed => report.failed += 1,
                }
            }

            if !batch_pause.is_zero() {
                tokio::time::sleep(batch_pause).await;
            }
        }
    }

    /// Fetch, reconcile and persist one listed item.
    ///
    /// Detail fetches are retried in a bounded loop with linear backoff;
    /// exhausting the budget puts the slug on the blacklist and counts a
    /// failure. Nothing here ever propagates an error to the page.
    async fn process_entry(
        &self,
        adapter: &Arc<dyn SourceAdapter>,
        entry: &ListEntry,
        depth: SyncDepth,
    ) -> ItemOutcome {
        if self.config.request_jitter_ms > 0 {
            let jitter = rand::thread_rng().gen_range(0..=self.config.request_jitter_ms);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }

        let existing = match self.store.get(&entry.slug).await {
            Ok(existing) => existing,
            Err(error) => {
                log::warn!("store lookup '{}' failed: {error}", entry.slug);
                None
            }
        };

        // Shallow pass: the listing already told us the episode label;
        // if it matches the stored record there is nothing new to fetch.
        if depth == SyncDepth::Latest {
            if let (Some(listed), Some(stored)) = (&entry.episode_current, &existing) {
                if *listed == stored.episode_current {
                    return ItemOutcome::Skipped;
                }
            }
        }

        let raw = self.fetch_with_retry(adapter, &entry.slug).await;
        let Some(raw) = raw else {
            if self.state.add_to_blacklist(&entry.slug) {
                log::warn!(
                    "'{}' blacklisted after {} failed attempt(s) via {}",
                    entry.slug,
                    self.config.retry_limit,
                    adapter.id()
                );
            }
            return ItemOutcome::Failed;
        };

        match self.ingest(existing.as_ref(), raw, adapter.id()).await {
            Ok((_, notified)) => ItemOutcome::Processed { notified },
            Err(error) => {
                log::warn!("ingest '{}' failed: {error}", entry.slug);
                ItemOutcome::Failed
            }
        }
    }

    /// Bounded retry loop with linear backoff.
    ///
    /// "Not found" and "transient error" are one signal here; both spend
    /// the same retry budget.
    async fn fetch_with_retry(
        &self,
        adapter: &Arc<dyn SourceAdapter>,
        slug: &str,
    ) -> Option<RawDetail> {
        let base_delay = Duration::from_millis(self.config.retry_delay_ms);

        for attempt in 1..=self.config.retry_limit {
            match adapter.fetch_detail(slug).await {
                Ok(Some(raw)) => return Some(raw),
                Ok(None) => {
                    log::debug!(
                        "{} detail '{slug}' absent (attempt {attempt}/{})",
                        adapter.id(),
                        self.config.retry_limit
                    );
                }
                Err(error) => {
                    log::debug!(
                        "{} detail '{slug}' errored (attempt {attempt}/{}): {error}",
                        adapter.id(),
                        self.config.retry_limit
                    );
                }
            }

            if attempt < self.config.retry_limit && !base_delay.is_zero() {
                tokio::time::sleep(base_delay * attempt).await;
            }
        }
        None
    }

    /// Reconcile, notify, upsert.
    async fn ingest(
        &self,
        existing: Option<&CanonicalItem>,
        raw: RawDetail,
        source: SourceId,
    ) -> Result<(CanonicalItem, usize)> {
        let (mut item, changes) = self.reconciler.reconcile(existing, raw, source)?;
        let notified = self.notifier.process(&mut item, &changes).await?;
        self.store.upsert(item.clone()).await?;
        Ok((item, notified))
    }
}
