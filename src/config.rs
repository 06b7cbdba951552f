//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - `ramalog.toml` (base configuration)
//! - `ramalog.local.toml` (git-ignored local overrides)
//! - Environment variables (`RAMALOG_*` prefix)
//!
//! ## Example
//!
//! ```toml
//! # ramalog.toml
//! [engine]
//! par_level = 3
//! with_provenance = false
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RAMALOG_ENGINE__PAR_LEVEL=0
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Top-level configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tunables the driver reads on every `solve` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSection {
    /// Depth budget for `Search`/`Par` fan-out. 0 forces fully sequential
    /// evaluation. See `spec.md` §4.7.
    #[serde(default = "default_par_level")]
    pub par_level: usize,

    /// Whether the marshaller should retain the two provenance columns.
    #[serde(default)]
    pub with_provenance: bool,

    /// Soft cap on semi-naive rounds per stratum. `None` means "run to the
    /// fixed point with no cap," matching the behavior `spec.md` specifies.
    /// When set, exceeding it produces `RamError::FixpointNotReached`
    /// instead of spinning forever on a malformed or non-terminating
    /// program — the same cooperative-limit idea as the teacher's
    /// `execution::limits::ResourceLimits`.
    #[serde(default)]
    pub max_iterations: Option<u64>,
}

fn default_par_level() -> usize {
    3
}

impl Default for EngineSection {
    fn default() -> Self {
        EngineSection {
            par_level: default_par_level(),
            with_provenance: false,
            max_iterations: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            engine: EngineSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration from the default locations.
    ///
    /// Merges in order:
    /// 1. `ramalog.toml` (base configuration)
    /// 2. `ramalog.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`RAMALOG_*` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(
            EngineConfig::default(),
        ))
        .merge(Toml::file("ramalog.toml"))
        .merge(Toml::file("ramalog.local.toml"))
        .merge(Env::prefixed("RAMALOG_").split("__"))
        .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(
            EngineConfig::default(),
        ))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RAMALOG_").split("__"))
        .extract()
    }
}
