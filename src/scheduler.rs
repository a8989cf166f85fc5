use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use log::{error, info, warn};
use tokio::time::sleep;

use crate::{
    collector::{CollectMode, Collector},
    forwarder::{ForwardOutcome, Forwarder, OccupancyFilter},
    metrics::RuntimeMetrics,
    util,
};

/// Summary of one collection + forward pass.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub mode: CollectMode,
    pub collected: usize,
    pub selected: usize,
    pub aborted: bool,

    /// `None` when forwarding failed (already logged)
    pub forward: Option<ForwardOutcome>,
}

/// Drives collection and forwarding on a fixed interval.
///
/// STATES:
/// - Idle:    sleeping `interval`
/// - Running: one cycle in progress
///
/// GUARANTEES:
/// - Exactly one cycle at a time
/// - No cycle outcome stops the loop
/// - `run` never returns
///
pub struct CycleScheduler {
    collector: Collector,
    forwarder: Forwarder,
    filter: OccupancyFilter,
    interval: Duration,
    metrics: Arc<RuntimeMetrics>,
}

impl CycleScheduler {
    pub fn new(
        collector: Collector,
        forwarder: Forwarder,
        filter: OccupancyFilter,
        interval: Duration,
        metrics: Arc<RuntimeMetrics>,
    ) -> Self {
        Self {
            collector,
            forwarder,
            filter,
            interval,
            metrics,
        }
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Runs cycles forever.
    pub async fn run(mut self) {
        loop {
            self.run_cycle().await;
            sleep(self.interval).await;
        }
    }

    /// Runs exactly one cycle: collect, filter, forward.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.metrics.cycle_running.store(true, Ordering::Relaxed);
        info!("[CYCLE] collecting ({:?})", self.collector.next_mode());

        let outcome = self.collector.collect().await;
        let ids = self.filter.select_ids(&outcome.items);

        info!(
            "[CYCLE] mode={:?} pages={} skipped={} failures={} raw={} filtered={}",
            outcome.mode,
            outcome.pages,
            outcome.skipped,
            outcome.failures,
            outcome.items.len(),
            ids.len()
        );

        let selected = ids.len();
        let forward = match self.forwarder.forward(ids, self.filter.min_batch).await {
            Ok(result) => {
                match &result {
                    ForwardOutcome::Sent { count, added } => {
                        RuntimeMetrics::incr(&self.metrics.ids_forwarded, *count);
                        match added {
                            Some(added) => info!("[FORWARD] sent {} ids ({} added)", count, added),
                            None => info!("[FORWARD] sent {} ids", count),
                        }
                    }
                    ForwardOutcome::DryRun { .. } => {}
                    ForwardOutcome::Skipped { count } => {
                        RuntimeMetrics::incr(&self.metrics.forwards_skipped, 1);
                        warn!(
                            "[FORWARD] {} ids below minimum of {} – nothing sent",
                            count, self.filter.min_batch
                        );
                    }
                }
                Some(result)
            }
            Err(e) => {
                RuntimeMetrics::incr(&self.metrics.forward_failures, 1);
                error!("[FORWARD] failed: {}", e);
                None
            }
        };

        RuntimeMetrics::incr(&self.metrics.cycles_completed, 1);
        self.metrics.last_cycle_ms.store(util::now_ms(), Ordering::Relaxed);
        self.metrics.cycle_running.store(false, Ordering::Relaxed);

        CycleReport {
            mode: outcome.mode,
            collected: outcome.items.len(),
            selected,
            aborted: outcome.aborted,
            forward,
        }
    }
}
