use std::time::Instant;

use serde::{Deserialize, Serialize};

pub const MB: u64 = 1024 * 1024;
pub const GB: u64 = 1024 * MB;

/// Whole megabytes, for log fields and reason strings.
pub const fn mb(bytes: u64) -> u64 {
    bytes / MB
}

/// Raw heap numbers as reported by the host collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapStats {
    pub heap_bytes: u64,
    pub used_bytes: u64,
}

impl HeapStats {
    /// Free-space cushion: heap size minus live allocations.
    pub fn free_bytes(self) -> u64 {
        self.heap_bytes.saturating_sub(self.used_bytes)
    }

    pub fn heap_mb(self) -> u64 {
        self.heap_bytes / MB
    }

    pub fn used_mb(self) -> u64 {
        self.used_bytes / MB
    }

    pub fn free_mb(self) -> u64 {
        self.free_bytes() / MB
    }
}

/// One timestamped heap sample. Produced fresh on every governor tick and
/// around a prewarm; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub heap_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub observed_at: Instant,
}

impl MemorySample {
    pub fn new(stats: HeapStats, observed_at: Instant) -> Self {
        Self {
            heap_bytes: stats.heap_bytes,
            used_bytes: stats.used_bytes,
            free_bytes: stats.free_bytes(),
            observed_at,
        }
    }

    pub fn stats(self) -> HeapStats {
        HeapStats {
            heap_bytes: self.heap_bytes,
            used_bytes: self.used_bytes,
        }
    }
}

/// Collector introspection failed. Callers skip the current measurement and
/// carry on; this is never surfaced as a user-facing failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("collector statistics unavailable: {reason}")]
pub struct StatsError {
    reason: String,
}

impl StatsError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_bytes_saturates_when_used_exceeds_heap() {
        // Host collectors have been observed reporting used > heap briefly
        // mid-collection; treat that as an empty cushion, not an underflow.
        let stats = HeapStats {
            heap_bytes: 10 * MB,
            used_bytes: 11 * MB,
        };
        assert_eq!(stats.free_bytes(), 0);
    }

    #[test]
    fn sample_derives_free_space_from_stats() {
        let stats = HeapStats {
            heap_bytes: 3 * GB,
            used_bytes: 2 * GB,
        };
        let sample = MemorySample::new(stats, Instant::now());
        assert_eq!(sample.free_bytes, GB);
        assert_eq!(sample.stats(), stats);
    }
}
