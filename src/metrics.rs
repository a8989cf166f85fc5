use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use serde::Serialize;

/// Runtime counters for the harvester.
///
/// Purpose:
/// - Feed the status endpoint
/// - Feed the periodic `[METRICS]` log line
///
/// Design:
/// - Lock-free (Atomics)
/// - Written by the collection task only
/// - Read from any task without touching collection state
#[derive(Default, Debug)]
pub struct RuntimeMetrics {
    // Scheduler
    pub cycle_running: AtomicBool,
    pub cycles_completed: AtomicUsize,
    pub last_cycle_ms: AtomicI64,

    // Collection
    pub pages_fetched: AtomicUsize,
    pub pages_skipped: AtomicUsize,
    pub items_collected: AtomicUsize,
    pub cursors_cached: AtomicUsize,
    pub rate_limited: AtomicUsize,
    pub transient_errors: AtomicUsize,
    pub collections_aborted: AtomicUsize,

    // Forwarding
    pub ids_forwarded: AtomicUsize,
    pub forward_failures: AtomicUsize,
    pub forwards_skipped: AtomicUsize,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub state: &'static str,
    pub cycles_completed: usize,
    pub last_cycle_ms: Option<i64>,
    pub pages_fetched: usize,
    pub pages_skipped: usize,
    pub items_collected: usize,
    pub cursors_cached: usize,
    pub rate_limited: usize,
    pub transient_errors: usize,
    pub collections_aborted: usize,
    pub ids_forwarded: usize,
    pub forward_failures: usize,
    pub forwards_skipped: usize,
}

impl RuntimeMetrics {
    pub fn incr(counter: &AtomicUsize, by: usize) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        let last = self.last_cycle_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            state: if self.cycle_running.load(Ordering::Relaxed) {
                "running"
            } else {
                "idle"
            },
            cycles_completed: load(&self.cycles_completed),
            last_cycle_ms: (last > 0).then_some(last),
            pages_fetched: load(&self.pages_fetched),
            pages_skipped: load(&self.pages_skipped),
            items_collected: load(&self.items_collected),
            cursors_cached: load(&self.cursors_cached),
            rate_limited: load(&self.rate_limited),
            transient_errors: load(&self.transient_errors),
            collections_aborted: load(&self.collections_aborted),
            ids_forwarded: load(&self.ids_forwarded),
            forward_failures: load(&self.forward_failures),
            forwards_skipped: load(&self.forwards_skipped),
        }
    }

    /// One-line summary used by the periodic reporter.
    pub fn log_line(&self) -> String {
        let s = self.snapshot();
        format!(
            "[METRICS] state={} cycles={} pages={} skipped={} items={} cursors={} rl={} transient={} aborts={} fwd={} fwd_err={} fwd_skip={}",
            s.state,
            s.cycles_completed,
            s.pages_fetched,
            s.pages_skipped,
            s.items_collected,
            s.cursors_cached,
            s.rate_limited,
            s.transient_errors,
            s.collections_aborted,
            s.ids_forwarded,
            s.forward_failures,
            s.forwards_skipped,
        )
    }
}
