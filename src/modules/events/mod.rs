//! Event system for the collection engine.
//!
//! Provides hooks for metrics, logging, and custom reactions around run,
//! probe and submission activity.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::collection::adblock::AdBlockOutcome;
use crate::collection::core::ProbeKind;
use crate::external_deps::matcher::MatchStatus;

use super::metrics::MetricsCollector;

#[derive(Debug, Clone)]
pub struct RunStartedEvent {
    pub immediate_probes: usize,
    pub suspending_probes: usize,
    pub timestamp: DateTime<Utc>,
}

/// One probe produced its reading (or its fallback).
#[derive(Debug, Clone)]
pub struct ProbeSettledEvent {
    pub probe: &'static str,
    pub key: &'static str,
    pub kind: ProbeKind,
    /// `"value"` or the fault kind.
    pub outcome: &'static str,
    pub timed_out: bool,
    pub panicked: bool,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NoiseEvent {
    pub probe: &'static str,
    pub noisy: bool,
    pub distinct: usize,
    pub samples: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AdBlockEvent {
    pub outcome: AdBlockOutcome,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RunCompletedEvent {
    pub attributes: usize,
    pub noisy_probes: Vec<String>,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SubmissionEvent {
    pub endpoint: Url,
    pub match_status: MatchStatus,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub stage: &'static str,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CollectionEvent {
    RunStarted(RunStartedEvent),
    ProbeSettled(ProbeSettledEvent),
    Noise(NoiseEvent),
    AdBlock(AdBlockEvent),
    RunCompleted(RunCompletedEvent),
    Submission(SubmissionEvent),
    Error(ErrorEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &CollectionEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn dispatch(&self, event: CollectionEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &CollectionEvent) {
        match event {
            CollectionEvent::RunStarted(start) => {
                log::info!(
                    "collection started: {} immediate, {} suspending probes",
                    start.immediate_probes,
                    start.suspending_probes
                );
            }
            CollectionEvent::ProbeSettled(probe) if probe.panicked => {
                log::error!("probe {} panicked", probe.probe);
            }
            CollectionEvent::ProbeSettled(probe) if probe.timed_out => {
                log::warn!(
                    "probe {} timed out after {:.2}s",
                    probe.probe,
                    probe.latency.as_secs_f64()
                );
            }
            CollectionEvent::ProbeSettled(probe) => {
                log::debug!(
                    "probe {} -> {} ({:.3}s)",
                    probe.probe,
                    probe.outcome,
                    probe.latency.as_secs_f64()
                );
            }
            CollectionEvent::Noise(noise) if noise.noisy => {
                log::warn!(
                    "probe {} is noisy: {} distinct values in {} samples",
                    noise.probe,
                    noise.distinct,
                    noise.samples
                );
            }
            CollectionEvent::Noise(_) => {}
            CollectionEvent::AdBlock(adblock) => {
                log::info!("ad-blocker heuristic resolved: {:?}", adblock.outcome);
            }
            CollectionEvent::RunCompleted(done) => {
                log::info!(
                    "collection finished: {} attributes in {:.2}s, noisy: {:?}",
                    done.attributes,
                    done.elapsed.as_secs_f64(),
                    done.noisy_probes
                );
            }
            CollectionEvent::Submission(submission) => {
                log::info!(
                    "submitted to {} -> {:?} ({:.2}s)",
                    submission.endpoint,
                    submission.match_status,
                    submission.latency.as_secs_f64()
                );
            }
            CollectionEvent::Error(error) => {
                log::error!("{} failed: {}", error.stage, error.error);
            }
        }
    }
}

/// Metrics handler that feeds the metrics collector.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    metrics: MetricsCollector,
}

impl MetricsHandler {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self { metrics }
    }
}

impl EventHandler for MetricsHandler {
    fn handle(&self, event: &CollectionEvent) {
        match event {
            CollectionEvent::ProbeSettled(probe) => {
                self.metrics
                    .record_probe(probe.probe, probe.outcome, probe.latency);
            }
            CollectionEvent::Noise(noise) => {
                self.metrics.record_noise(noise.probe, noise.noisy);
            }
            CollectionEvent::RunCompleted(done) => {
                self.metrics.record_run(done.elapsed);
            }
            CollectionEvent::Submission(_) => {
                self.metrics.record_submission(true);
            }
            CollectionEvent::Error(error) if error.stage == "submission" => {
                self.metrics.record_submission(false);
            }
            _ => {}
        }
    }
}
