//! Run-scoped accumulation of probe results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::partition::{Partitioned, partition};
use super::types::Reading;

/// Attribute key to probe reading.
pub type FingerprintMap = BTreeMap<String, Reading>;

/// Sampled probe name to "samples disagreed".
pub type NoiseMap = BTreeMap<String, bool>;

/// State owned by exactly one collection run.
///
/// Created when the run starts, filled by the orchestrator, and consumed when
/// the payload is built, so nothing leaks from one run into the next.
#[derive(Debug, Clone)]
pub struct RunContext {
    started_at: DateTime<Utc>,
    fingerprint: FingerprintMap,
    noise: NoiseMap,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            fingerprint: FingerprintMap::new(),
            noise: NoiseMap::new(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Store a reading. The first reading for a key wins.
    pub fn record(&mut self, key: &str, reading: Reading) -> bool {
        if self.fingerprint.contains_key(key) {
            log::warn!("attribute `{key}` already recorded; ignoring duplicate");
            return false;
        }
        self.fingerprint.insert(key.to_string(), reading);
        true
    }

    pub fn record_noise(&mut self, probe: &str, noisy: bool) {
        self.noise.insert(probe.to_string(), noisy);
    }

    pub fn fingerprint(&self) -> &FingerprintMap {
        &self.fingerprint
    }

    pub fn noise(&self) -> &NoiseMap {
        &self.noise
    }

    pub fn get(&self, key: &str) -> Option<&Reading> {
        self.fingerprint.get(key)
    }

    pub fn len(&self) -> usize {
        self.fingerprint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprint.is_empty()
    }

    /// Consume the context, splitting attributes into stable and unstable halves.
    pub fn finish(self) -> (Partitioned, NoiseMap) {
        (partition(&self.fingerprint), self.noise)
    }
}
