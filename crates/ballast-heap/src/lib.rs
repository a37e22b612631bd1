//! Heap pacing for a long-running simulation host.
//!
//! Two components share the host's collector capability but run
//! independently:
//!
//! - [`Prewarmer`] runs once, shortly after the primary load settles. It
//!   allocates and releases a large burst of blocks so the allocator retains
//!   the reclaimed space as a free pool, stretching the interval between
//!   stop-the-world collections.
//! - [`Governor`] runs on a fixed cadence for the rest of the session. It
//!   forces collections when the heap crosses a ceiling, when the free-space
//!   cushion runs out, or periodically. It adaptively raises the ceiling
//!   when the allocator structurally cannot compact below it.
//!
//! Both are driven from the host's single-threaded context; no two ticks or
//! expansion attempts ever overlap.

mod governor;
mod prewarm;

pub use governor::{
    CeilingState, CollectionTrigger, ForcedCollection, Governor, GovernorReport, GovernorSettings,
    ESCALATION_FAIL_STREAK, LOW_FREE_BACKOFF, MIN_EVAL_SPACING,
};
pub use prewarm::{ExpandOutcome, Prewarmer, SETTLE_DELAY};
