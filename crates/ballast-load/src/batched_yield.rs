use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ballast_core::{Collector, LoadingFlag};

/// The load routine drives its step sequence through a scheduler that
/// resumes it once per frame; every yielded step without a payload costs a
/// full frame of latency for no work done.
const COLLECT_EVERY_STEPS: u64 = 50;

/// Shared step counters for a [`BatchedYield`] run, readable while (and
/// after) the sequence is being driven.
#[derive(Debug, Clone, Default)]
pub struct YieldCounters {
    total_steps: Arc<AtomicU64>,
    noops_absorbed: Arc<AtomicU64>,
}

impl YieldCounters {
    pub fn total_steps(&self) -> u64 {
        self.total_steps.load(Ordering::Relaxed)
    }

    pub fn noops_absorbed(&self) -> u64 {
        self.noops_absorbed.load(Ordering::Relaxed)
    }
}

/// Wraps a cooperative step sequence so that runs of no-op steps are
/// absorbed instead of yielded one by one.
///
/// The inner iterator yields `Some(payload)` for steps that must reach the
/// driver and `None` for steps that exist only to hand control back. Up to
/// `batch_size` consecutive no-ops are swallowed per batch; the step that
/// would exceed the batch is yielded as `None` so the driver still gets
/// control at a bounded interval. Payload steps always pass through
/// unchanged.
///
/// While the loading flag is set, a collection is requested every 50th
/// observed step to keep the load's allocation churn from piling up.
pub struct BatchedYield<I, C> {
    inner: I,
    collector: C,
    loading: LoadingFlag,
    batch_size: u64,
    noop_run: u64,
    counters: YieldCounters,
    finished: bool,
}

impl<I, C, T> BatchedYield<I, C>
where
    I: Iterator<Item = Option<T>>,
    C: Collector,
{
    /// `batch_size` is clamped to at least 1; a batch of 1 passes every
    /// step through unchanged.
    pub fn new(inner: I, collector: C, loading: LoadingFlag, batch_size: u64) -> Self {
        Self {
            inner,
            collector,
            loading,
            batch_size: batch_size.max(1),
            noop_run: 0,
            counters: YieldCounters::default(),
            finished: false,
        }
    }

    pub fn counters(&self) -> YieldCounters {
        self.counters.clone()
    }
}

impl<I, C, T> Iterator for BatchedYield<I, C>
where
    I: Iterator<Item = Option<T>>,
    C: Collector,
{
    type Item = Option<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let Some(step) = self.inner.next() else {
                self.finished = true;
                tracing::debug!(
                    target: "ballast.load",
                    total_steps = self.counters.total_steps(),
                    noops_absorbed = self.counters.noops_absorbed(),
                    "step sequence finished"
                );
                return None;
            };

            let total = self.counters.total_steps.fetch_add(1, Ordering::Relaxed) + 1;
            if self.loading.is_loading() && total % COLLECT_EVERY_STEPS == 0 {
                self.collector.collect();
            }

            match step {
                Some(payload) => {
                    self.noop_run = 0;
                    return Some(Some(payload));
                }
                None => {
                    self.noop_run += 1;
                    if self.noop_run >= self.batch_size {
                        // Batch boundary: this no-op is yielded, not
                        // absorbed, so the driver regains control.
                        self.noop_run = 0;
                        return Some(None);
                    }
                    self.counters.noops_absorbed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}
