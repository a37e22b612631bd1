use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::stats::{HeapStats, StatsError};

/// The allocator/collector capability the host provides.
///
/// All calls originate from the host's single-threaded driver context;
/// ballast never invokes two collection passes concurrently.
pub trait Collector {
    /// Snapshot of current heap and live-allocation sizes.
    fn heap_stats(&self) -> Result<HeapStats, StatsError>;

    /// Run a single stop-the-world collection pass.
    fn collect(&self);

    /// Run a full pass twice with an intervening finalize wait. The second
    /// pass catches objects that only become unreachable once the first
    /// pass's finalizers have run.
    fn collect_full(&self);
}

impl<C: Collector + ?Sized> Collector for &C {
    fn heap_stats(&self) -> Result<HeapStats, StatsError> {
        (**self).heap_stats()
    }

    fn collect(&self) {
        (**self).collect()
    }

    fn collect_full(&self) {
        (**self).collect_full()
    }
}

impl<C: Collector + ?Sized> Collector for Arc<C> {
    fn heap_stats(&self) -> Result<HeapStats, StatsError> {
        (**self).heap_stats()
    }

    fn collect(&self) {
        (**self).collect()
    }

    fn collect_full(&self) {
        (**self).collect_full()
    }
}

/// Shared "bulk loading" indicator, set by the host for the duration of one
/// load. Cheap to clone; readers poll it, nothing blocks on it.
#[derive(Debug, Clone, Default)]
pub struct LoadingFlag(Arc<AtomicBool>);

impl LoadingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, loading: bool) {
        self.0.store(loading, Ordering::Relaxed);
    }

    pub fn is_loading(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
