//! Settings and configuration module
//!
//! Provides the collector configuration with:
//! - Defaults matching the reference deployment
//! - JSON loading (partial documents fall back to defaults per field)
//! - Per-probe time budgets

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::collection::core::DEFAULT_SAMPLE_COUNT;

/// Public cosmetic filter lists fetched by the ad-blocker heuristic.
pub const DEFAULT_FILTER_LISTS: &[&str] = &[
    "https://easylist.to/easylist/easylist.txt",
    "https://easylist.to/easylist/easyprivacy.txt",
    "https://easylist.to/easylist/fanboy-annoyance.txt",
    "https://secure.fanboy.co.nz/fanboy-cookiemonster.txt",
    "https://easylist-downloads.adblockplus.org/easylistchina.txt",
    "https://raw.githubusercontent.com/xinggsf/Adblock-Plus-Rule/master/rule.txt",
    "https://raw.githubusercontent.com/uBlockOrigin/uAssets/master/filters/filters.txt",
    "https://raw.githubusercontent.com/uBlockOrigin/uAssets/master/filters/privacy.txt",
];

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5001/analyze";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid matcher endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Time bounds for suspending probes, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeBudgets {
    /// Bound for ordinary suspending probes.
    pub default_ms: u64,
    /// Outer bound for the geolocation consent prompt.
    pub geolocation_ms: u64,
    /// Timeout handed to the host's geolocation request itself.
    pub geolocation_prompt_ms: u64,
    /// Remote library loads (reference WebGL scene).
    pub script_load_ms: u64,
    /// Global timeout of the ad-blocker heuristic.
    pub adblock_ms: u64,
    /// Delay before baits are measured.
    pub bait_settle_ms: u64,
    /// Delay before the speech voice list is read.
    pub speech_settle_ms: u64,
}

impl Default for ProbeBudgets {
    fn default() -> Self {
        Self {
            default_ms: 3_000,
            geolocation_ms: 5_000,
            geolocation_prompt_ms: 4_000,
            script_load_ms: 10_000,
            adblock_ms: 5_000,
            bait_settle_ms: 100,
            speech_settle_ms: 100,
        }
    }
}

impl ProbeBudgets {
    pub fn default_bound(&self) -> Duration {
        Duration::from_millis(self.default_ms)
    }

    pub fn geolocation(&self) -> Duration {
        Duration::from_millis(self.geolocation_ms)
    }

    pub fn geolocation_prompt(&self) -> Duration {
        Duration::from_millis(self.geolocation_prompt_ms)
    }

    pub fn script_load(&self) -> Duration {
        Duration::from_millis(self.script_load_ms)
    }

    pub fn adblock(&self) -> Duration {
        Duration::from_millis(self.adblock_ms)
    }

    pub fn bait_settle(&self) -> Duration {
        Duration::from_millis(self.bait_settle_ms)
    }

    pub fn speech_settle(&self) -> Duration {
        Duration::from_millis(self.speech_settle_ms)
    }

    /// Uniformly scaled budgets, handy for tests running against fast doubles.
    pub fn scaled(self, factor: f64) -> Self {
        let scale = |ms: u64| ((ms as f64) * factor).round().max(1.0) as u64;
        Self {
            default_ms: scale(self.default_ms),
            geolocation_ms: scale(self.geolocation_ms),
            geolocation_prompt_ms: scale(self.geolocation_prompt_ms),
            script_load_ms: scale(self.script_load_ms),
            adblock_ms: scale(self.adblock_ms),
            bait_settle_ms: scale(self.bait_settle_ms),
            speech_settle_ms: scale(self.speech_settle_ms),
        }
    }
}

/// How bait selectors are drawn from the parsed rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum BaitSelection {
    /// Uniform draws with replacement, one per usable selector.
    #[default]
    Random,
    /// Same as `Random` but reproducible.
    Seeded { seed: u64 },
    /// Every usable selector exactly once, in rule order.
    Exhaustive,
}

/// Collector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub endpoint: String,
    pub filter_lists: Vec<String>,
    pub sample_count: usize,
    pub budgets: ProbeBudgets,
    pub bait_selection: BaitSelection,
    /// Bound on the submission exchange, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            filter_lists: DEFAULT_FILTER_LISTS.iter().map(|url| url.to_string()).collect(),
            sample_count: DEFAULT_SAMPLE_COUNT,
            budgets: ProbeBudgets::default(),
            bait_selection: BaitSelection::default(),
            request_timeout_ms: 30_000,
        }
    }
}

impl CollectorConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        Ok(Url::parse(&self.endpoint)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;
        if self.sample_count == 0 {
            return Err(ConfigError::Invalid("sample_count must be at least 1".into()));
        }
        if self.budgets.geolocation_prompt_ms > self.budgets.geolocation_ms {
            log::warn!(
                "geolocation prompt timeout ({}ms) exceeds its outer bound ({}ms)",
                self.budgets.geolocation_prompt_ms,
                self.budgets.geolocation_ms
            );
        }
        Ok(())
    }
}
