//! Per-load template caches for record construction.
//!
//! Record construction during a load rebuilds the same handful of templates
//! tens of thousands of times. [`TemplateCache`] short-circuits that by
//! storing one template per key and handing every caller an independent
//! copy, so in-place mutation by one caller can never leak into another.
//! [`EquationCache`] covers the immutable case (deterministic parse output)
//! where no copy discipline is needed.
//!
//! The caches are owned by the load session's single-threaded driver and are
//! cleared at the start of every load: which content pack defines which
//! templates can differ between save files.

mod equation;
mod template;

pub use equation::{EquationCache, Interval, ParsedEquation};
pub use template::{CacheStats, CloneTemplate, TemplateCache};
