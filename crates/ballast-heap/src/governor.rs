use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use ballast_core::{mb, Collector, MemorySample};

/// Minimum spacing between trigger evaluations, to bound sampling overhead.
pub const MIN_EVAL_SPACING: Duration = Duration::from_secs(10);

/// LOW_FREE holds off for this long after a forced collection; free space is
/// chronically low right after a ceiling collection and re-triggering would
/// thrash.
pub const LOW_FREE_BACKOFF: Duration = Duration::from_secs(30);

/// Consecutive post-collection ceiling misses before the ceiling escalates.
pub const ESCALATION_FAIL_STREAK: u32 = 3;

/// Pacing thresholds. A zero value disables the corresponding trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorSettings {
    /// Forced collection when heap size exceeds this (MB). 0 = disabled.
    pub ceiling_mb: u64,
    /// Forced collection when the free cushion drops below this (MB).
    /// 0 = disabled.
    pub min_free_mb: u64,
    /// Forced collection when this much time has passed since the last one.
    /// Zero = disabled.
    pub interval: Duration,
    /// Additive margin applied when the ceiling escalates (MB).
    pub escalation_margin_mb: u64,
    /// Hard upper bound for the escalated ceiling (MB). 0 = uncapped.
    pub ceiling_cap_mb: u64,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            ceiling_mb: 3072,
            min_free_mb: 256,
            interval: Duration::from_secs(120),
            escalation_margin_mb: 512,
            ceiling_cap_mb: 0,
        }
    }
}

/// Why a forced collection ran. `Display` matches the logged reason strings,
/// e.g. `CEILING(3100>3072MB)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionTrigger {
    Ceiling { heap_mb: u64, ceiling_mb: u64 },
    LowFree { free_mb: u64, min_free_mb: u64 },
    Periodic { elapsed_secs: u64 },
}

impl fmt::Display for CollectionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ceiling {
                heap_mb,
                ceiling_mb,
            } => write!(f, "CEILING({heap_mb}>{ceiling_mb}MB)"),
            Self::LowFree {
                free_mb,
                min_free_mb,
            } => write!(f, "LOW_FREE({free_mb}<{min_free_mb}MB)"),
            Self::Periodic { elapsed_secs } => write!(f, "PERIODIC({elapsed_secs}s)"),
        }
    }
}

/// Session-lifetime ceiling state, mutated exclusively by [`Governor::tick`].
///
/// `effective_ceiling_mb == 0` means "use the configured value"; once
/// raised, it only ever increases within a session.
#[derive(Debug, Clone, Copy)]
pub struct CeilingState {
    configured_ceiling_mb: u64,
    effective_ceiling_mb: u64,
    fail_streak: u32,
    last_forced: Option<Instant>,
    forced_count: u64,
}

impl CeilingState {
    fn new(configured_ceiling_mb: u64) -> Self {
        Self {
            configured_ceiling_mb,
            effective_ceiling_mb: 0,
            fail_streak: 0,
            last_forced: None,
            forced_count: 0,
        }
    }

    /// The ceiling currently enforced: escalated if raised, configured
    /// otherwise.
    pub fn ceiling_in_effect_mb(&self) -> u64 {
        if self.effective_ceiling_mb > 0 {
            self.effective_ceiling_mb
        } else {
            self.configured_ceiling_mb
        }
    }

    /// Whether the adaptive ceiling has replaced the configured one.
    pub fn is_escalated(&self) -> bool {
        self.effective_ceiling_mb > 0
    }

    pub fn fail_streak(&self) -> u32 {
        self.fail_streak
    }

    pub fn forced_count(&self) -> u64 {
        self.forced_count
    }

    pub fn last_forced(&self) -> Option<Instant> {
        self.last_forced
    }
}

/// Record of one forced collection.
#[derive(Debug, Clone, Copy)]
pub struct ForcedCollection {
    pub reason: CollectionTrigger,
    pub before: MemorySample,
    /// Unavailable when the collector's re-sample failed; escalation
    /// bookkeeping is skipped in that case.
    pub after: Option<MemorySample>,
    /// Ordinal of this forced collection within the session (1-based).
    pub count: u64,
    /// New effective ceiling, when this collection escalated it.
    pub escalated_to_mb: Option<u64>,
}

/// Diagnostics summary for the host's periodic status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorReport {
    pub forced_count: u64,
    pub heap_mb: Option<u64>,
    pub ceiling_in_effect_mb: u64,
    /// True when the ceiling in effect is the auto-raised one.
    pub auto: bool,
}

impl fmt::Display for GovernorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x forced", self.forced_count)?;
        if let Some(heap_mb) = self.heap_mb {
            write!(f, " cur:{}/{}MB", heap_mb, self.ceiling_in_effect_mb)?;
            if self.auto {
                write!(f, "(auto)")?;
            }
        }
        Ok(())
    }
}

/// Adaptive heap-ceiling governor.
///
/// The host calls [`tick`](Self::tick) on a fixed cadence once a session is
/// active. Each tick samples the heap, evaluates the triggers in strict
/// priority order (CEILING, then LOW_FREE, then PERIODIC) and, on a match,
/// forces a double collection pass. When three consecutive forced
/// collections leave the heap above the ceiling, the allocator structurally
/// cannot compact below it (long-lived retained sets, fragmentation) and the
/// ceiling is raised instead of burning further useless pauses.
#[derive(Debug)]
pub struct Governor {
    settings: GovernorSettings,
    state: CeilingState,
    started_at: Instant,
    last_evaluation: Option<Instant>,
    cap_warned: bool,
}

impl Governor {
    pub fn new(settings: GovernorSettings, now: Instant) -> Self {
        Self {
            state: CeilingState::new(settings.ceiling_mb),
            settings,
            started_at: now,
            last_evaluation: None,
            cap_warned: false,
        }
    }

    pub fn settings(&self) -> &GovernorSettings {
        &self.settings
    }

    pub fn state(&self) -> &CeilingState {
        &self.state
    }

    /// Evaluate the triggers and force a collection if one matches.
    ///
    /// Returns `None` when the evaluation gate holds, sampling fails, or no
    /// trigger matches. All state transitions happen on this single logical
    /// tick; `CeilingState` has no concurrent writers by design.
    pub fn tick(&mut self, collector: &dyn Collector, now: Instant) -> Option<ForcedCollection> {
        if let Some(last) = self.last_evaluation {
            if now.duration_since(last) < MIN_EVAL_SPACING {
                return None;
            }
        }

        let stats = match collector.heap_stats() {
            Ok(stats) => stats,
            Err(err) => {
                tracing::debug!(target: "ballast.heap", error = %err, "tick skipped");
                return None;
            }
        };
        self.last_evaluation = Some(now);

        let before = MemorySample::new(stats, now);
        let reason = self.evaluate(&before, now)?;

        collector.collect_full();
        let after = match collector.heap_stats() {
            Ok(stats) => Some(MemorySample::new(stats, now)),
            Err(err) => {
                tracing::debug!(
                    target: "ballast.heap",
                    error = %err,
                    "post-collection re-sample unavailable"
                );
                None
            }
        };

        self.state.last_forced = Some(now);
        self.state.forced_count += 1;

        let escalated_to_mb = after.and_then(|after| self.escalate(&after));

        let record = ForcedCollection {
            reason,
            before,
            after,
            count: self.state.forced_count,
            escalated_to_mb,
        };
        tracing::info!(
            target: "ballast.heap",
            count = record.count,
            reason = %reason,
            heap_before_mb = mb(before.heap_bytes),
            heap_after_mb = after.map(|s| mb(s.heap_bytes)),
            used_before_mb = mb(before.used_bytes),
            used_after_mb = after.map(|s| mb(s.used_bytes)),
            free_after_mb = after.map(|s| mb(s.free_bytes)),
            "forced collection"
        );
        Some(record)
    }

    /// Diagnostics snapshot; sampling failure leaves `heap_mb` empty.
    pub fn report(&self, collector: &dyn Collector) -> GovernorReport {
        GovernorReport {
            forced_count: self.state.forced_count,
            heap_mb: collector.heap_stats().ok().map(|s| s.heap_mb()),
            ceiling_in_effect_mb: self.state.ceiling_in_effect_mb(),
            auto: self.state.is_escalated(),
        }
    }

    fn evaluate(&self, sample: &MemorySample, now: Instant) -> Option<CollectionTrigger> {
        let heap_mb = mb(sample.heap_bytes);
        let free_mb = mb(sample.free_bytes);
        let ceiling_mb = self.state.ceiling_in_effect_mb();
        let elapsed_since_forced =
            now.duration_since(self.state.last_forced.unwrap_or(self.started_at));

        if ceiling_mb > 0 && heap_mb > ceiling_mb {
            return Some(CollectionTrigger::Ceiling {
                heap_mb,
                ceiling_mb,
            });
        }
        if self.settings.min_free_mb > 0
            && free_mb < self.settings.min_free_mb
            && elapsed_since_forced >= LOW_FREE_BACKOFF
        {
            return Some(CollectionTrigger::LowFree {
                free_mb,
                min_free_mb: self.settings.min_free_mb,
            });
        }
        if !self.settings.interval.is_zero() && elapsed_since_forced >= self.settings.interval {
            return Some(CollectionTrigger::Periodic {
                elapsed_secs: elapsed_since_forced.as_secs(),
            });
        }
        None
    }

    /// Escalation bookkeeping after a forced collection. Returns the new
    /// effective ceiling when this tick raised it.
    fn escalate(&mut self, after: &MemorySample) -> Option<u64> {
        let ceiling_mb = self.state.ceiling_in_effect_mb();
        let after_heap_mb = mb(after.heap_bytes);

        if ceiling_mb == 0 || after_heap_mb <= ceiling_mb {
            self.state.fail_streak = 0;
            return None;
        }

        self.state.fail_streak += 1;
        if self.state.fail_streak < ESCALATION_FAIL_STREAK {
            return None;
        }

        // The streak resets whether or not the cap lets the ceiling move, so
        // a capped governor does not re-attempt escalation every third tick.
        self.state.fail_streak = 0;

        let mut raised_mb = after_heap_mb + self.settings.escalation_margin_mb;
        let cap_mb = self.settings.ceiling_cap_mb;
        if cap_mb > 0 && raised_mb > cap_mb {
            raised_mb = cap_mb;
            if !self.cap_warned {
                self.cap_warned = true;
                tracing::warn!(
                    target: "ballast.heap",
                    cap_mb,
                    wanted_mb = after_heap_mb + self.settings.escalation_margin_mb,
                    "ceiling escalation saturated at configured cap"
                );
            }
        }
        // Monotonic within the session: never lower the ceiling in effect.
        if raised_mb <= ceiling_mb {
            return None;
        }

        tracing::warn!(
            target: "ballast.heap",
            heap_mb = after_heap_mb,
            old_ceiling_mb = ceiling_mb,
            new_ceiling_mb = raised_mb,
            "heap stuck above ceiling after repeated collections; raising ceiling"
        );
        self.state.effective_ceiling_mb = raised_mb;
        Some(raised_mb)
    }
}
