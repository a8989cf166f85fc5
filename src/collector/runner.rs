use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures_util::future::join_all;
use log::{debug, warn};
use serde::Serialize;

use crate::{
    config::{Config, SamplingMode},
    cursor_store::CursorStore,
    error::{FailureKind, FetchError},
    fetcher::PageSource,
    metrics::RuntimeMetrics,
    retry::RetryPolicy,
    schema::Item,
};

/// Knobs of the collection strategy, derived once from [`Config`].
#[derive(Debug, Clone)]
pub struct CollectSettings {
    /// Pages whose items are kept, per cycle
    pub max_pages: usize,

    /// Leading pages fetched only to advance the cursor (sequential mode)
    pub skip_pages: usize,

    /// Fetches in flight at once (sampled mode)
    pub concurrency: usize,

    pub mode: SamplingMode,

    /// Sampled mode also fetches the head page
    pub include_head: bool,

    /// Sampled mode records the cursors its fetches return
    pub rechain: bool,

    /// Failure budget and pause between failed attempts
    pub retry: RetryPolicy,
}

impl CollectSettings {
    pub fn from_config(cfg: &Config, proxy_count: usize) -> Self {
        Self {
            max_pages: cfg.max_pages,
            skip_pages: cfg.skip_pages,
            concurrency: cfg.concurrency.max(1),
            mode: cfg.sampling_mode,
            include_head: cfg.sample_include_head,
            rechain: cfg.rechain_sampled,
            retry: RetryPolicy::for_collection(proxy_count, cfg.retry_multiplier, cfg.retry_backoff),
        }
    }
}

/// Traversal used for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectMode {
    /// Chained walk from the listing head
    Sequential,

    /// Independent fetches of cached cursors
    RandomSample,
}

/// What one cycle of collection produced.
#[derive(Debug, Clone)]
pub struct CollectOutcome {
    pub mode: CollectMode,

    /// Raw items of every counted page, unfiltered
    pub items: Vec<Item>,

    /// Pages whose items were kept
    pub pages: usize,

    /// Pages fetched only to advance the cursor
    pub skipped: usize,

    /// Failed fetch attempts (rate limited or transient)
    pub failures: u32,

    /// True when the failure budget cut the cycle short
    pub aborted: bool,
}

impl CollectOutcome {
    fn new(mode: CollectMode) -> Self {
        Self {
            mode,
            items: Vec::new(),
            pages: 0,
            skipped: 0,
            failures: 0,
            aborted: false,
        }
    }
}

/// Page-collection engine.
///
/// Owns the cursor store. The store is only ever touched from the task
/// that drives `collect`, concurrent fetches are merged after each batch.
///
/// MODES:
/// - Sequential: start with no cursor and chain each returned cursor
///   into the next fetch until the listing ends or the budget is spent
/// - RandomSample: fetch up to `max_pages` distinct cached cursors,
///   independently, in batches of `concurrency`
///
/// FAILURES:
/// - A failed fetch yields no items and never advances the cursor
/// - Every failure is charged to the cycle's failure budget; once it is
///   exceeded the cycle returns whatever was accumulated
///
pub struct Collector {
    source: Arc<dyn PageSource>,
    store: CursorStore,
    settings: CollectSettings,
    metrics: Arc<RuntimeMetrics>,
}

impl Collector {
    pub fn new(
        source: Arc<dyn PageSource>,
        store: CursorStore,
        settings: CollectSettings,
        metrics: Arc<RuntimeMetrics>,
    ) -> Self {
        Self {
            source,
            store,
            settings,
            metrics,
        }
    }

    pub fn store(&self) -> &CursorStore {
        &self.store
    }

    pub fn settings(&self) -> &CollectSettings {
        &self.settings
    }

    /// Mode the next call to [`Collector::collect`] will use.
    pub fn next_mode(&self) -> CollectMode {
        match self.settings.mode {
            SamplingMode::Auto if !self.store.is_empty() => CollectMode::RandomSample,
            _ => CollectMode::Sequential,
        }
    }

    /// Runs one cycle of collection. Never fails.
    pub async fn collect(&mut self) -> CollectOutcome {
        let out = match self.next_mode() {
            CollectMode::Sequential => self.collect_sequential().await,
            CollectMode::RandomSample => self.collect_sampled().await,
        };

        RuntimeMetrics::incr(&self.metrics.items_collected, out.items.len());
        if out.aborted {
            RuntimeMetrics::incr(&self.metrics.collections_aborted, 1);
        }

        out
    }

    async fn collect_sequential(&mut self) -> CollectOutcome {
        let mut out = CollectOutcome::new(CollectMode::Sequential);
        if self.settings.max_pages == 0 {
            return out;
        }

        let mut budget = self.settings.retry.budget();
        let mut cursor: Option<String> = None;

        loop {
            match self.source.fetch(cursor.as_deref()).await {
                Ok(page) => {
                    if out.skipped < self.settings.skip_pages {
                        out.skipped += 1;
                        RuntimeMetrics::incr(&self.metrics.pages_skipped, 1);
                    } else {
                        out.pages += 1;
                        out.items.extend(page.items);
                        RuntimeMetrics::incr(&self.metrics.pages_fetched, 1);
                    }

                    // End of listing
                    let Some(next) = page.next_cursor else { break };
                    self.record_cursor(&next);
                    cursor = Some(next);

                    if out.pages >= self.settings.max_pages {
                        break;
                    }
                }

                Err(e) => {
                    self.note_failure(&e);
                    out.failures += 1;
                    if !budget.record_failure() {
                        warn!(
                            "[CYCLE] failure budget exhausted after {} failures – keeping {} items",
                            budget.used(),
                            out.items.len()
                        );
                        out.aborted = true;
                        break;
                    }
                    // Same cursor again, fresh proxy pick
                    self.settings.retry.pause().await;
                }
            }
        }

        out
    }

    async fn collect_sampled(&mut self) -> CollectOutcome {
        let mut out = CollectOutcome::new(CollectMode::RandomSample);
        if self.settings.max_pages == 0 {
            return out;
        }

        let mut targets: Vec<Option<String>> = Vec::with_capacity(self.settings.max_pages);
        if self.settings.include_head {
            targets.push(None);
        }
        let wanted = self.settings.max_pages - targets.len();
        targets.extend(self.store.sample(wanted).into_iter().map(Some));

        let mut budget = self.settings.retry.budget();
        let source = Arc::clone(&self.source);

        for batch in targets.chunks(self.settings.concurrency) {
            let results = join_all(batch.iter().map(|c| source.fetch(c.as_deref()))).await;

            let mut batch_failed = false;
            for (target, result) in batch.iter().zip(results) {
                match result {
                    Ok(page) => {
                        out.pages += 1;
                        out.items.extend(page.items);
                        RuntimeMetrics::incr(&self.metrics.pages_fetched, 1);

                        if self.settings.rechain || target.is_none() {
                            if let Some(next) = page.next_cursor {
                                self.record_cursor(&next);
                            }
                        }
                    }
                    Err(e) => {
                        self.note_failure(&e);
                        out.failures += 1;
                        batch_failed = true;
                        if !budget.record_failure() {
                            out.aborted = true;
                        }
                    }
                }
            }

            if out.aborted {
                warn!(
                    "[CYCLE] failure budget exhausted after {} failures – keeping {} items",
                    budget.used(),
                    out.items.len()
                );
                break;
            }

            if batch_failed {
                self.settings.retry.pause().await;
            }
        }

        out
    }

    fn record_cursor(&mut self, token: &str) {
        if self.store.record(token) {
            self.metrics
                .cursors_cached
                .store(self.store.size(), Ordering::Relaxed);
        }
    }

    fn note_failure(&self, err: &FetchError) {
        match err.kind() {
            FailureKind::RateLimited => {
                RuntimeMetrics::incr(&self.metrics.rate_limited, 1);
                debug!("[FETCH] rate limited");
            }
            FailureKind::Transient => {
                RuntimeMetrics::incr(&self.metrics.transient_errors, 1);
                debug!("[FETCH] transient failure: {}", err);
            }
        }
    }
}
