//! Capability seams shared by the ballast crates.
//!
//! ballast orchestrates a host-owned managed allocator/collector; it never
//! implements collection itself. The host exposes that capability through
//! [`Collector`], and every component receives it at the call site. All
//! values here are cheap to copy and carry no host state.

mod collector;
mod stats;

pub use collector::{Collector, LoadingFlag};
pub use stats::{mb, HeapStats, MemorySample, StatsError, GB, MB};
