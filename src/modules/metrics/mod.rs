//! Metrics collection utilities.
//!
//! Aggregates per-probe latency percentiles, fault counts and noise verdicts
//! across collection runs, plus run and submission totals.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Totals across all runs.
#[derive(Debug, Clone)]
pub struct GlobalStats {
    pub started_at: DateTime<Utc>,
    pub runs: u64,
    pub submissions: u64,
    pub submission_failures: u64,
    pub average_run_time: Option<Duration>,
    pub p95_run_time: Option<Duration>,
}

impl Default for GlobalStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            runs: 0,
            submissions: 0,
            submission_failures: 0,
            average_run_time: None,
            p95_run_time: None,
        }
    }
}

/// Probe-scoped metrics snapshot.
#[derive(Debug, Clone)]
pub struct ProbeStats {
    pub probe: String,
    pub readings: u64,
    pub values: u64,
    /// Fault counts keyed by fault kind.
    pub faults: BTreeMap<String, u64>,
    pub noisy_runs: u64,
    pub average_latency: Option<Duration>,
    pub p95_latency: Option<Duration>,
}

impl ProbeStats {
    fn from_accumulator(probe: &str, acc: &ProbeAccumulator) -> Self {
        let (avg, p95) = latency_stats(&acc.latencies);
        Self {
            probe: probe.to_string(),
            readings: acc.readings,
            values: acc.values,
            faults: acc.faults.clone(),
            noisy_runs: acc.noisy_runs,
            average_latency: avg,
            p95_latency: p95,
        }
    }

    pub fn fault_count(&self, kind: &str) -> u64 {
        self.faults.get(kind).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub global: GlobalStats,
    pub probes: Vec<ProbeStats>,
}

impl MetricsSnapshot {
    pub fn probe(&self, name: &str) -> Option<&ProbeStats> {
        self.probes.iter().find(|stats| stats.probe == name)
    }
}

#[derive(Debug)]
struct ProbeAccumulator {
    readings: u64,
    values: u64,
    faults: BTreeMap<String, u64>,
    noisy_runs: u64,
    latencies: VecDeque<Duration>,
    max_window: usize,
}

impl ProbeAccumulator {
    fn new(max_window: usize) -> Self {
        Self {
            readings: 0,
            values: 0,
            faults: BTreeMap::new(),
            noisy_runs: 0,
            latencies: VecDeque::with_capacity(max_window),
            max_window,
        }
    }

    fn record(&mut self, outcome: &str, latency: Duration) {
        self.readings += 1;
        if outcome == "value" {
            self.values += 1;
        } else {
            *self.faults.entry(outcome.to_string()).or_insert(0) += 1;
        }
        push_window(&mut self.latencies, self.max_window, latency);
    }
}

fn push_window(window: &mut VecDeque<Duration>, max: usize, sample: Duration) {
    if window.len() == max {
        window.pop_front();
    }
    window.push_back(sample);
}

fn latency_stats(window: &VecDeque<Duration>) -> (Option<Duration>, Option<Duration>) {
    if window.is_empty() {
        return (None, None);
    }
    let mut samples: Vec<_> = window.iter().cloned().collect();
    samples.sort_unstable();
    let avg = samples.iter().map(|d| d.as_secs_f64()).sum::<f64>() / samples.len() as f64;
    let p95_index = ((samples.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
    (Some(Duration::from_secs_f64(avg)), Some(samples[p95_index]))
}

#[derive(Debug)]
struct MetricsState {
    global: GlobalStats,
    run_times: VecDeque<Duration>,
    max_window: usize,
    probes: HashMap<String, ProbeAccumulator>,
}

impl MetricsState {
    fn new(max_window: usize) -> Self {
        Self {
            global: GlobalStats::default(),
            run_times: VecDeque::with_capacity(max_window),
            max_window,
            probes: HashMap::new(),
        }
    }

    fn accumulator_mut(&mut self, probe: &str) -> &mut ProbeAccumulator {
        self.probes
            .entry(probe.to_string())
            .or_insert_with(|| ProbeAccumulator::new(self.max_window))
    }
}

/// Thread-safe metrics collector fed by the event system.
#[derive(Clone, Debug)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_window(128)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(window.max(16)))),
        }
    }

    // A panic while holding the lock leaves counters usable.
    fn state(&self) -> MutexGuard<'_, MetricsState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one probe reading. `outcome` is `"value"` or a fault kind.
    pub fn record_probe(&self, probe: &str, outcome: &str, latency: Duration) {
        self.state().accumulator_mut(probe).record(outcome, latency);
    }

    pub fn record_noise(&self, probe: &str, noisy: bool) {
        let mut guard = self.state();
        let acc = guard.accumulator_mut(probe);
        if noisy {
            acc.noisy_runs += 1;
        }
    }

    pub fn record_run(&self, elapsed: Duration) {
        let mut guard = self.state();
        guard.global.runs += 1;
        let max = guard.max_window;
        push_window(&mut guard.run_times, max, elapsed);
        let (avg, p95) = latency_stats(&guard.run_times);
        guard.global.average_run_time = avg;
        guard.global.p95_run_time = p95;
    }

    pub fn record_submission(&self, success: bool) {
        let mut guard = self.state();
        guard.global.submissions += 1;
        if !success {
            guard.global.submission_failures += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let guard = self.state();
        let mut probes: Vec<_> = guard
            .probes
            .iter()
            .map(|(probe, acc)| ProbeStats::from_accumulator(probe, acc))
            .collect();
        probes.sort_by(|a, b| a.probe.cmp(&b.probe));
        MetricsSnapshot {
            global: guard.global.clone(),
            probes,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
