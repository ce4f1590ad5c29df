//! Repeated sampling used to flag probes whose output is being perturbed.
//!
//! Samples are taken back to back, never concurrently: timing sensitive probes
//! would otherwise measure each other. The flip side is that nothing isolates
//! the samples in time either, so an environment that genuinely changes
//! between two samples is reported as noisy too.

use std::collections::HashSet;
use std::future::Future;

use super::types::{ProbeFault, Reading};

pub const DEFAULT_SAMPLE_COUNT: usize = 3;

/// Stability classification of a sampled probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleVerdict {
    /// First sample, used as the canonical value.
    pub value: Reading,
    /// `true` when the samples did not all agree.
    pub noisy: bool,
    pub distinct: usize,
    pub samples: usize,
}

/// Runs a probe `k` times and compares the results.
#[derive(Debug, Clone, Copy)]
pub struct StabilitySampler {
    sample_count: usize,
}

impl Default for StabilitySampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_COUNT)
    }
}

impl StabilitySampler {
    pub fn new(sample_count: usize) -> Self {
        Self {
            sample_count: sample_count.max(1),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Sample a synchronous probe. No suspension happens between samples.
    pub fn sample<F>(&self, mut probe: F) -> SampleVerdict
    where
        F: FnMut() -> Reading,
    {
        let samples: Vec<Reading> = (0..self.sample_count).map(|_| probe()).collect();
        classify(samples)
    }

    /// Sample an asynchronous probe, awaiting each sample before starting the next.
    pub async fn sample_async<F, Fut>(&self, mut probe: F) -> SampleVerdict
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Reading>,
    {
        let mut samples = Vec::with_capacity(self.sample_count);
        for _ in 0..self.sample_count {
            samples.push(probe().await);
        }
        classify(samples)
    }
}

fn classify(samples: Vec<Reading>) -> SampleVerdict {
    let distinct = samples.iter().collect::<HashSet<_>>().len();
    let count = samples.len();
    let value = samples
        .into_iter()
        .next()
        .unwrap_or(Reading::Fault(ProbeFault::Empty));

    SampleVerdict {
        value,
        noisy: distinct > 1,
        distinct,
        samples: count,
    }
}
