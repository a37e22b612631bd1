use std::time::Duration;

use ballast_core::{Collector, MB};

/// Delay between "primary load finished" and the expansion burst, agreed
/// with the host so the burst never competes with load-time allocation.
pub const SETTLE_DELAY: Duration = Duration::from_secs(3);

/// 64 KiB blocks sit in the allocator's large-block free lists and are cheap
/// to allocate in bulk.
const LARGE_BLOCK_BYTES: usize = 64 * 1024;

/// Rotation of small sizes that seeds the small-object free lists.
const SMALL_BLOCK_SIZES: [usize; 5] = [32, 64, 128, 256, 512];

/// Share of the target spent on large blocks; the rest goes to the rotation.
const LARGE_SHARE_PCT: u64 = 90;

/// Result of the one-shot expansion attempt, retained for the session so the
/// host's diagnostics can report it at any point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// `target_mb <= 0`; nothing was allocated.
    Disabled,
    /// The burst completed; `summary` is the human-readable before/after
    /// heap delta.
    Expanded { summary: String },
    /// The allocator refused part of the burst. Never retried.
    Failed { reason: String },
}

/// One-shot heap pre-expansion.
///
/// Allocating a burst of blocks and releasing them all leaves the allocator
/// holding the reclaimed space as a contiguous free pool instead of
/// returning it to the operating system. Steady-state allocation then draws
/// from that pool, lengthening the inter-collection interval by roughly
/// pool size over allocation rate.
#[derive(Debug, Default)]
pub struct Prewarmer {
    outcome: Option<ExpandOutcome>,
}

impl Prewarmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome of the attempt, if one has run.
    pub fn outcome(&self) -> Option<&ExpandOutcome> {
        self.outcome.as_ref()
    }

    /// Run the expansion burst. At most one attempt per process lifetime:
    /// repeat calls return the recorded outcome without allocating.
    pub fn expand(&mut self, collector: &dyn Collector, target_mb: i64) -> &ExpandOutcome {
        self.outcome
            .get_or_insert_with(|| run_expansion(collector, target_mb))
    }
}

fn run_expansion(collector: &dyn Collector, target_mb: i64) -> ExpandOutcome {
    if target_mb <= 0 {
        tracing::info!(target: "ballast.heap", "heap expansion disabled");
        return ExpandOutcome::Disabled;
    }
    let target_mb = target_mb as u64;

    // Stats are best-effort; an unavailable sample degrades the summary but
    // never fails the expansion.
    let before = collector.heap_stats().ok();
    tracing::info!(
        target: "ballast.heap",
        target_mb,
        heap_mb = before.map(|s| s.heap_mb()),
        used_mb = before.map(|s| s.used_mb()),
        "expanding heap"
    );

    let blocks = match allocate_burst(target_mb) {
        Ok(blocks) => blocks,
        Err(reason) => {
            tracing::error!(target: "ballast.heap", reason, "heap expansion failed");
            return ExpandOutcome::Failed { reason };
        }
    };
    drop(blocks);

    // Double pass: the second collection catches objects only reachable
    // until finalization of the first.
    collector.collect_full();

    let after = collector.heap_stats().ok();
    let summary = match (before, after) {
        (Some(before), Some(after)) => {
            let grown_mb = after.heap_mb().saturating_sub(before.heap_mb());
            tracing::info!(
                target: "ballast.heap",
                heap_before_mb = before.heap_mb(),
                heap_after_mb = after.heap_mb(),
                grown_mb,
                free_mb = after.free_mb(),
                "heap expanded"
            );
            format!(
                "H:{}>{}MB +{}MB Free={}MB",
                before.heap_mb(),
                after.heap_mb(),
                grown_mb,
                after.free_mb()
            )
        }
        _ => format!("expanded ~{target_mb}MB (collector stats unavailable)"),
    };
    ExpandOutcome::Expanded { summary }
}

/// Allocate the burst: ~90% of the target as fixed large blocks, ~10%
/// spread across the small-size rotation. Allocator refusal is reported,
/// not propagated as a panic/abort.
fn allocate_burst(target_mb: u64) -> Result<Vec<Vec<u8>>, String> {
    let target_bytes = target_mb.saturating_mul(MB);
    if target_bytes > isize::MAX as u64 {
        return Err(format!(
            "expansion target of {target_mb}MB exceeds addressable memory"
        ));
    }
    let large_budget = target_bytes / 100 * LARGE_SHARE_PCT;
    let small_budget = target_bytes - large_budget;
    let large_count = (large_budget / LARGE_BLOCK_BYTES as u64) as usize;

    let mut blocks = Vec::new();
    blocks
        .try_reserve(large_count)
        .map_err(|err| format!("block table allocation failed: {err}"))?;

    for _ in 0..large_count {
        blocks.push(allocate_block(LARGE_BLOCK_BYTES)?);
    }

    let mut small_allocated = 0u64;
    for i in 0.. {
        if small_allocated >= small_budget {
            break;
        }
        let size = SMALL_BLOCK_SIZES[i % SMALL_BLOCK_SIZES.len()];
        blocks.push(allocate_block(size)?);
        small_allocated += size as u64;
    }

    tracing::debug!(
        target: "ballast.heap",
        large_blocks = large_count,
        small_blocks = blocks.len() - large_count,
        "expansion burst allocated"
    );
    Ok(blocks)
}

fn allocate_block(len: usize) -> Result<Vec<u8>, String> {
    let mut block = Vec::new();
    block
        .try_reserve_exact(len)
        .map_err(|err| format!("allocation of {len} byte block failed: {err}"))?;
    // Touch every page so the space is actually committed, not just
    // reserved.
    block.resize(len, 0);
    Ok(block)
}
