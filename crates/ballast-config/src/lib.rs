//! User-facing configuration for the pacing and load-acceleration layers.
//!
//! One flat TOML table, every key optional. Loading is best-effort: any key
//! the current schema does not recognize is reported (and logged) rather
//! than rejected, and semantic problems become warnings so a misconfigured
//! install still starts with sensible behavior.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ballast_heap::GovernorSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // `toml::de::Error`'s default `Display` includes a snippet of the
        // input; keep just the message so raw config text never reaches
        // the log.
        ConfigError::Toml(err.message().to_string())
    }
}

/// Non-fatal issues found while loading or validating a config.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A key the current schema does not recognize (typo, or stale key
    /// from an older version).
    UnknownKey { path: String },
    /// A recognized key whose value cannot take effect as written.
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallastConfig {
    /// Heap pre-expansion target at startup (MB). Zero or negative
    /// disables the prewarm burst.
    pub heap_expansion_mb: i64,

    /// Heap-size ceiling that forces a collection (MB). 0 = disabled.
    pub mem_ceiling_mb: u64,

    /// Periodic forced-collection interval (seconds). 0 = disabled.
    pub gc_interval_sec: u64,

    /// Minimum free cushion before a collection is forced (MB).
    /// 0 = disabled.
    pub min_free_mb: u64,

    /// Hard upper bound for the adaptive ceiling (MB). 0 = uncapped.
    pub ceiling_cap_mb: u64,

    /// Parse bulk record buffers on a worker pool ahead of the main load.
    pub parallel_ship_parsing: bool,

    /// Absorb no-op steps in the load routine's yield sequence.
    pub reduce_yields: bool,

    /// Consecutive no-op steps absorbed per batch when `reduce_yields` is
    /// on. Values below 1 are treated as 1.
    pub yield_batch_size: u64,

    /// Serve repeated condition-template lookups from the clone-on-read
    /// cache.
    pub condition_template_cache: bool,
}

impl Default for BallastConfig {
    fn default() -> Self {
        Self {
            heap_expansion_mb: 1024,
            mem_ceiling_mb: 3072,
            gc_interval_sec: 120,
            min_free_mb: 256,
            ceiling_cap_mb: 0,
            parallel_ship_parsing: true,
            reduce_yields: true,
            yield_batch_size: 10,
            condition_template_cache: true,
        }
    }
}

impl BallastConfig {
    /// Parse a TOML string; unrecognized keys become warnings, not errors.
    pub fn from_toml_str(text: &str) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let mut warnings = Vec::new();
        let deserializer = toml::de::Deserializer::new(text);
        let config: BallastConfig = serde_ignored::deserialize(deserializer, |path| {
            warnings.push(ConfigWarning::UnknownKey {
                path: path.to_string().trim_start_matches('.').to_string(),
            });
        })?;

        for warning in &warnings {
            if let ConfigWarning::UnknownKey { path } = warning {
                tracing::warn!(target: "ballast.config", key = %path, "ignoring unknown config key");
            }
        }
        warnings.extend(config.validate());
        Ok((config, warnings))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Semantic checks. Best-effort: reports every problem it can find in
    /// one pass, never fails.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut out = Vec::new();

        if self.mem_ceiling_mb > 0 && self.min_free_mb >= self.mem_ceiling_mb {
            out.push(ConfigWarning::InvalidValue {
                key: "min_free_mb".to_string(),
                message: format!(
                    "free-cushion threshold ({}) is at or above mem_ceiling_mb ({}); \
                     the low-free trigger will fire on every evaluation",
                    self.min_free_mb, self.mem_ceiling_mb
                ),
            });
        }

        if self.reduce_yields && self.yield_batch_size == 0 {
            out.push(ConfigWarning::InvalidValue {
                key: "yield_batch_size".to_string(),
                message: "must be >= 1; treating as 1".to_string(),
            });
        }

        if self.ceiling_cap_mb > 0 && self.ceiling_cap_mb < self.mem_ceiling_mb {
            out.push(ConfigWarning::InvalidValue {
                key: "ceiling_cap_mb".to_string(),
                message: format!(
                    "cap ({}) is below mem_ceiling_mb ({}); escalation can never raise the ceiling",
                    self.ceiling_cap_mb, self.mem_ceiling_mb
                ),
            });
        }

        out
    }

    pub fn governor_settings(&self) -> GovernorSettings {
        GovernorSettings {
            ceiling_mb: self.mem_ceiling_mb,
            min_free_mb: self.min_free_mb,
            interval: Duration::from_secs(self.gc_interval_sec),
            escalation_margin_mb: GovernorSettings::default().escalation_margin_mb,
            ceiling_cap_mb: self.ceiling_cap_mb,
        }
    }

    pub fn prewarm_target_mb(&self) -> i64 {
        self.heap_expansion_mb
    }

    /// Effective batch size for the yield absorber, clamped to at least 1.
    pub fn yield_batch_size(&self) -> u64 {
        self.yield_batch_size.max(1)
    }
}
