use std::collections::HashMap;
use std::hash::Hash;

/// Explicit copy operation for cached mutable templates.
///
/// Implementors copy exactly the fields callers are allowed to mutate after
/// a cache read (e.g. a quantity scaled in place). Payloads the caller never
/// writes through may be shared between copies (`Arc` fields are fine); the
/// contract is only that mutation through one returned value is never
/// observable through another, nor through the stored template.
pub trait CloneTemplate {
    fn clone_template(&self) -> Self;
}

/// Hit/miss counters plus current size, for the host's load profile report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

/// Clone-on-read keyed cache for mutable record templates.
///
/// On a miss the caller's `produce` runs the normal (slow) construction
/// path; the cache stores an independent copy and returns the produced value
/// itself. On a hit the caller gets a fresh copy of the stored template,
/// never the template itself and never a value previously handed out.
///
/// Owned by the load driver; the `&mut self` receivers make concurrent
/// check/insert impossible by construction, so no lock is needed.
#[derive(Debug)]
pub struct TemplateCache<K, V> {
    name: &'static str,
    entries: HashMap<K, V>,
    hits: u64,
    misses: u64,
}

impl<K, V> TemplateCache<K, V>
where
    K: Eq + Hash,
    V: CloneTemplate,
{
    /// `name` labels this instance in logs (one cache per record kind).
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get_or_produce<E>(
        &mut self,
        key: K,
        produce: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(template) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(template.clone_template());
        }

        self.misses += 1;
        // A failed produce stores nothing; the next request retries
        // construction instead of caching the failure.
        let value = produce(&key)?;
        self.entries.insert(key, value.clone_template());
        Ok(value)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            len: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all templates and reset the counters. Called at the start of
    /// every load.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(
                target: "ballast.cache",
                cache = self.name,
                templates = self.entries.len(),
                hits = self.hits,
                misses = self.misses,
                "clearing template cache"
            );
        }
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }
}
