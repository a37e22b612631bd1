use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ballast_core::Collector;

use crate::archive::ArchiveContents;

/// Placeholder swapped into the shared buffer source for every selected
/// key: an innocuous empty record list, so the primary routine finds
/// nothing to parse even if it reads the buffer before injection.
pub const EMPTY_PAYLOAD: &[u8] = b"[]";

/// A bulk record carrying its own stable name; the merge step keys the
/// result map by it.
pub trait NamedRecord {
    fn name(&self) -> &str;
}

/// The domain deserializer capability: pure and side-effect-free, one
/// decoded buffer yields zero or more records.
pub trait RecordParser: Sync {
    type Record: NamedRecord + Send;

    fn parse(&self, text: &str) -> Result<Vec<Self::Record>, ParseError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("buffer is not valid utf-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    #[error("deserialize failed: {message}")]
    Deserialize { message: String },
}

impl ParseError {
    pub fn deserialize(message: impl Into<String>) -> Self {
        Self::Deserialize {
            message: message.into(),
        }
    }
}

/// What one pipeline run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// No keys matched the selector; nothing was dispatched or swapped.
    NoWork,
    /// Results are pending for injection.
    Parsed {
        dispatched: usize,
        records: usize,
        failed: usize,
        elapsed: Duration,
    },
    /// More than half the tasks failed; every buffer was restored and the
    /// partial results were discarded.
    Aborted { dispatched: usize, failed: usize },
}

/// Results held between a successful run and the injection call. The single
/// owning `Option` makes partial population unrepresentable: either the
/// whole set exists or none of it does.
#[derive(Debug)]
struct PendingRecordSet<R> {
    records_by_name: HashMap<String, R>,
    original_bytes: HashMap<String, Vec<u8>>,
}

enum WorkerPool {
    Rayon(rayon::ThreadPool),
    Inline,
}

impl WorkerPool {
    /// Run every task to completion before returning: a join over the
    /// whole group, never a race to first completion.
    fn run_all<'a>(&self, tasks: Vec<Box<dyn FnOnce() + Send + 'a>>) {
        match self {
            WorkerPool::Rayon(pool) => pool.scope(|scope| {
                for task in tasks {
                    scope.spawn(move |_| task());
                }
            }),
            WorkerPool::Inline => {
                for task in tasks {
                    task();
                }
            }
        }
    }
}

/// Thread creation can fail in constrained environments (low RLIMIT_NPROC,
/// `EAGAIN`). Degrade to a smaller pool, then to inline parsing, rather
/// than failing the load.
fn build_worker_pool(threads: usize) -> WorkerPool {
    let mut threads = threads.max(1);
    loop {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("ballast-parse-{idx}"))
            .build()
        {
            Ok(pool) => return WorkerPool::Rayon(pool),
            Err(_) if threads > 1 => {
                threads = (threads / 2).max(1);
            }
            Err(err) => {
                tracing::warn!(
                    target: "ballast.load",
                    error = %err,
                    "no worker threads available; parsing inline"
                );
                return WorkerPool::Inline;
            }
        }
    }
}

/// Fan-out parse / fan-in merge / injection for bulk record buffers.
///
/// [`run`](Self::run) is invoked once per load, before the primary load
/// routine starts deserializing; [`inject`](Self::inject) is called by that
/// routine at the point it would otherwise parse the same buffers
/// synchronously. If the run aborted (or never happened), `inject` returns
/// `None` and the routine falls back to parsing the restored originals.
pub struct ParsePipeline<R> {
    pool: WorkerPool,
    pending: Option<PendingRecordSet<R>>,
}

impl<R: NamedRecord + Send> ParsePipeline<R> {
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        Self::with_threads(threads)
    }

    pub fn with_threads(threads: usize) -> Self {
        Self {
            pool: build_worker_pool(threads),
            pending: None,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Parse every selected buffer on the worker pool and retain the merged
    /// results for injection.
    ///
    /// Selected buffers are swapped for [`EMPTY_PAYLOAD`] before any worker
    /// starts, so the primary routine can never double-parse real content;
    /// the originals are retained and restored either on abort (here) or at
    /// injection. Blocks until every dispatched task has finished.
    pub fn run<P>(
        &mut self,
        source: &mut ArchiveContents,
        parser: &P,
        collector: &dyn Collector,
        select: impl Fn(&str) -> bool,
    ) -> PipelineOutcome
    where
        P: RecordParser<Record = R>,
    {
        if self.pending.take().is_some() {
            tracing::warn!(
                target: "ballast.load",
                "discarding pending records left over from a previous load"
            );
        }

        let keys: Vec<String> = source
            .keys()
            .filter(|key| select(key))
            .map(String::from)
            .collect();
        if keys.is_empty() {
            return PipelineOutcome::NoWork;
        }

        let mut original_bytes = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(bytes) = source.replace(&key, EMPTY_PAYLOAD.to_vec()) {
                original_bytes.insert(key, bytes);
            }
        }
        let dispatched = original_bytes.len();
        tracing::info!(
            target: "ballast.load",
            dispatched,
            "parallel parse starting"
        );

        let merged: Mutex<HashMap<String, R>> = Mutex::new(HashMap::new());
        let failed = AtomicUsize::new(0);
        let started = Instant::now();

        let mut tasks: Vec<Box<dyn FnOnce() + Send + '_>> = Vec::with_capacity(dispatched);
        for (key, bytes) in &original_bytes {
            let merged = &merged;
            let failed = &failed;
            tasks.push(Box::new(move || {
                match parse_task(parser, bytes) {
                    Ok(records) => {
                        // Decoding ran unsynchronized; only the merge takes
                        // the lock.
                        let mut merged = merged.lock().unwrap();
                        for record in records {
                            merged.insert(record.name().to_string(), record);
                        }
                    }
                    Err(err) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(
                            target: "ballast.load",
                            key = %key,
                            error = %err,
                            "parse task failed"
                        );
                    }
                }
            }));
        }
        self.pool.run_all(tasks);

        let failed = failed.into_inner();
        let elapsed = started.elapsed();

        if failed > dispatched / 2 {
            // All-or-nothing: downstream consumes either the raw-byte path
            // or the parsed path in full, never a mixture. Undo the swap.
            for (key, bytes) in original_bytes {
                source.insert(key, bytes);
            }
            tracing::error!(
                target: "ballast.load",
                dispatched,
                failed,
                "too many parse failures; restored original buffers"
            );
            return PipelineOutcome::Aborted { dispatched, failed };
        }

        let records_by_name = merged.into_inner().unwrap();
        let records = records_by_name.len();
        tracing::info!(
            target: "ballast.load",
            dispatched,
            records,
            failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "parallel parse complete"
        );

        self.pending = Some(PendingRecordSet {
            records_by_name,
            original_bytes,
        });

        // The pass allocated and abandoned every decoded buffer; collect
        // now while the live set is still small.
        collector.collect_full();

        PipelineOutcome::Parsed {
            dispatched,
            records,
            failed,
            elapsed,
        }
    }

    /// Hand the pre-parsed records to the primary load routine in place of
    /// its own synchronous parse of the (placeholder) buffers.
    ///
    /// Restores the retained original bytes into `source` (later stages may
    /// re-read raw bytes), discards the pending set, and forces a full
    /// collection to cap the peak live set before the routine's heavy
    /// allocation phase. Returns `None` when nothing is pending.
    pub fn inject(
        &mut self,
        source: &mut ArchiveContents,
        collector: &dyn Collector,
    ) -> Option<Vec<R>> {
        let PendingRecordSet {
            records_by_name,
            original_bytes,
        } = self.pending.take()?;

        for (key, bytes) in original_bytes {
            source.insert(key, bytes);
        }

        let records: Vec<R> = records_by_name.into_values().collect();
        tracing::info!(
            target: "ballast.load",
            records = records.len(),
            "injecting pre-parsed records"
        );

        collector.collect_full();
        Some(records)
    }
}

impl<R: NamedRecord + Send> Default for ParsePipeline<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_task<P: RecordParser>(parser: &P, bytes: &[u8]) -> Result<Vec<P::Record>, ParseError> {
    let text = std::str::from_utf8(bytes)?;
    parser.parse(text)
}
