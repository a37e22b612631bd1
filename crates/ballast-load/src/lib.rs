//! Bulk-load acceleration for the primary save-file load routine.
//!
//! [`ParsePipeline`] fans bulk record deserialization out to a worker pool
//! before the synchronous load begins, then injects the merged results back
//! at the point the load routine would otherwise parse the same buffers
//! itself. [`BatchedYield`] wraps the load routine's cooperative step
//! sequence so control is handed back to the driver far less often.
//!
//! Both operate on [`ArchiveContents`], the mutable key→bytes mapping the
//! host's archive extractor produces; the archive format itself is opaque
//! here.

mod archive;
mod batched_yield;
mod pipeline;

pub use archive::ArchiveContents;
pub use batched_yield::{BatchedYield, YieldCounters};
pub use pipeline::{
    NamedRecord, ParseError, ParsePipeline, PipelineOutcome, RecordParser, EMPTY_PAYLOAD,
};
