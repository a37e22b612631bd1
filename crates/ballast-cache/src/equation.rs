use std::collections::HashMap;

/// Closed numeric interval produced by equation parsing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

/// Deterministic parse output for one equation string: the resolved output
/// name plus the value interval it draws from. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEquation {
    pub canonical: String,
    pub interval: Interval,
}

/// Cache for parsed condition equations.
///
/// Unlike [`crate::TemplateCache`] there is no mutation hazard: the stored
/// value is immutable, so hits return it as-is. This exists purely to avoid
/// repeating deterministic parse work; the same few thousand unique
/// equation strings are parsed hundreds of thousands of times per load.
#[derive(Debug, Default)]
pub struct EquationCache {
    entries: HashMap<String, ParsedEquation>,
    hits: u64,
    misses: u64,
}

impl EquationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_parse<E>(
        &mut self,
        equation: &str,
        parse: impl FnOnce(&str) -> Result<ParsedEquation, E>,
    ) -> Result<&ParsedEquation, E> {
        if self.entries.contains_key(equation) {
            self.hits += 1;
        } else {
            self.misses += 1;
            let parsed = parse(equation)?;
            self.entries.insert(equation.to_string(), parsed);
        }
        // Present by construction: either it existed or we just inserted it.
        Ok(&self.entries[equation])
    }

    pub fn stats(&self) -> crate::CacheStats {
        crate::CacheStats {
            hits: self.hits,
            misses: self.misses,
            len: self.entries.len(),
        }
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(
                target: "ballast.cache",
                entries = self.entries.len(),
                hits = self.hits,
                misses = self.misses,
                "clearing equation cache"
            );
        }
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(equation: &str) -> Result<ParsedEquation, String> {
        // Stand-in for the host's parser; the cache only cares that the
        // result is deterministic per input.
        Ok(ParsedEquation {
            canonical: equation.trim().to_ascii_uppercase(),
            interval: Interval {
                lo: 0.0,
                hi: equation.len() as f64,
            },
        })
    }

    #[test]
    fn parses_once_per_unique_string() {
        let mut calls = 0;
        let mut cache = EquationCache::new();
        for _ in 0..5 {
            cache
                .get_or_parse("CondPower=0.5", |eq| {
                    calls += 1;
                    parse(eq)
                })
                .unwrap();
        }
        assert_eq!(calls, 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 4);
    }

    #[test]
    fn failed_parse_is_retried() {
        let mut cache = EquationCache::new();
        let err = cache
            .get_or_parse("garbage", |_| Err::<ParsedEquation, _>("unparseable"))
            .unwrap_err();
        assert_eq!(err, "unparseable");
        assert_eq!(cache.stats().len, 0);

        cache.get_or_parse("garbage", parse).unwrap();
        assert_eq!(cache.stats().len, 1);
    }

    #[test]
    fn clear_resets_state() {
        let mut cache = EquationCache::new();
        cache.get_or_parse("a=1", parse).unwrap();
        cache.clear();
        assert_eq!(cache.stats(), crate::CacheStats::default());
    }
}
