//! Two-phase collection run.
//!
//! Immediate probes run first, one after the other, in registry order. Every
//! suspending probe is then started at once on the current task and awaited
//! together; each is bounded by its own [`TimeoutGuard`], so one slow or
//! hanging capability cannot hold the run past its budget. Nothing a probe
//! does (fault, timeout or panic) aborts the run: it only changes that probe's
//! reading.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;

use crate::collection::core::{
    ProbeFault, ProbeKind, Reading, RunContext, SampleVerdict, StabilitySampler, TimeoutGuard,
};
use crate::collection::probes::{ImmediateProbe, Probe, ProbeRegistry, SuspendingProbe};
use crate::config::ProbeBudgets;
use crate::environment::BrowserEnvironment;
use crate::modules::events::{
    CollectionEvent, EventDispatcher, NoiseEvent, ProbeSettledEvent, RunCompletedEvent,
    RunStartedEvent,
};

const PANIC_REASON: &str = "probe panicked";

/// Reading of one probe plus what the run needs to report about it.
struct Settled {
    probe: &'static str,
    key: &'static str,
    kind: ProbeKind,
    reading: Reading,
    verdict: Option<SampleVerdict>,
    latency: Duration,
}

impl Settled {
    fn timed_out(&self) -> bool {
        self.reading.as_fault() == Some(&ProbeFault::Timeout)
    }

    fn panicked(&self) -> bool {
        matches!(self.reading.as_fault(), Some(ProbeFault::Failed(reason)) if reason == PANIC_REASON)
    }
}

/// Drives every registered probe against one environment.
pub struct Orchestrator {
    registry: ProbeRegistry,
    budgets: ProbeBudgets,
    sampler: StabilitySampler,
    events: Arc<EventDispatcher>,
}

impl Orchestrator {
    pub fn new(registry: ProbeRegistry, budgets: ProbeBudgets) -> Self {
        Self {
            registry,
            budgets,
            sampler: StabilitySampler::default(),
            events: Arc::new(EventDispatcher::new()),
        }
    }

    pub fn with_sampler(mut self, sampler: StabilitySampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    pub fn budgets(&self) -> &ProbeBudgets {
        &self.budgets
    }

    /// Run both phases and return the filled context.
    pub async fn run(&self, env: &dyn BrowserEnvironment) -> RunContext {
        let started = Instant::now();
        let mut ctx = RunContext::new();
        self.events.dispatch(CollectionEvent::RunStarted(RunStartedEvent {
            immediate_probes: self.registry.immediate().count(),
            suspending_probes: self.registry.suspending().count(),
            timestamp: Utc::now(),
        }));

        for entry in self.registry.immediate() {
            if let Probe::Immediate(probe) = &entry.probe {
                let settled = self.settle_immediate(probe.as_ref(), entry.sampled, env);
                self.record(&mut ctx, settled);
            }
        }

        let pending = self.registry.suspending().filter_map(|entry| match &entry.probe {
            Probe::Suspending(probe) => Some(self.settle_suspending(probe.as_ref(), entry.sampled, env)),
            Probe::Immediate(_) => None,
        });
        for settled in join_all(pending).await {
            self.record(&mut ctx, settled);
        }

        let noisy_probes = ctx
            .noise()
            .iter()
            .filter(|(_, noisy)| **noisy)
            .map(|(probe, _)| probe.clone())
            .collect();
        self.events.dispatch(CollectionEvent::RunCompleted(RunCompletedEvent {
            attributes: ctx.len(),
            noisy_probes,
            elapsed: started.elapsed(),
            timestamp: Utc::now(),
        }));
        ctx
    }

    fn settle_immediate(
        &self,
        probe: &dyn ImmediateProbe,
        sampled: bool,
        env: &dyn BrowserEnvironment,
    ) -> Settled {
        let started = Instant::now();
        let (reading, verdict) = if sampled {
            let verdict = self.sampler.sample(|| read_immediate(probe, env));
            (verdict.value.clone(), Some(verdict))
        } else {
            (read_immediate(probe, env), None)
        };
        Settled {
            probe: probe.name(),
            key: probe.key(),
            kind: ProbeKind::Immediate,
            reading,
            verdict,
            latency: started.elapsed(),
        }
    }

    async fn settle_suspending(
        &self,
        probe: &dyn SuspendingProbe,
        sampled: bool,
        env: &dyn BrowserEnvironment,
    ) -> Settled {
        let started = Instant::now();
        let bound = probe.budget(&self.budgets);
        // Sampled probes bound every sample separately.
        let (reading, verdict) = if sampled {
            let verdict = self
                .sampler
                .sample_async(|| read_suspending(probe, env, bound))
                .await;
            (verdict.value.clone(), Some(verdict))
        } else {
            (read_suspending(probe, env, bound).await, None)
        };
        Settled {
            probe: probe.name(),
            key: probe.key(),
            kind: ProbeKind::Suspending,
            reading,
            verdict,
            latency: started.elapsed(),
        }
    }

    fn record(&self, ctx: &mut RunContext, settled: Settled) {
        let timestamp = Utc::now();
        self.events.dispatch(CollectionEvent::ProbeSettled(ProbeSettledEvent {
            probe: settled.probe,
            key: settled.key,
            kind: settled.kind,
            outcome: settled.reading.kind(),
            timed_out: settled.timed_out(),
            panicked: settled.panicked(),
            latency: settled.latency,
            timestamp,
        }));
        if let Some(verdict) = &settled.verdict {
            ctx.record_noise(settled.probe, verdict.noisy);
            self.events.dispatch(CollectionEvent::Noise(NoiseEvent {
                probe: settled.probe,
                noisy: verdict.noisy,
                distinct: verdict.distinct,
                samples: verdict.samples,
                timestamp,
            }));
        }
        ctx.record(settled.key, settled.reading);
    }
}

fn read_immediate(probe: &dyn ImmediateProbe, env: &dyn BrowserEnvironment) -> Reading {
    catch_unwind(AssertUnwindSafe(|| probe.read(env)))
        .unwrap_or_else(|_| Reading::fault(ProbeFault::failed(PANIC_REASON)))
}

async fn read_suspending(
    probe: &dyn SuspendingProbe,
    env: &dyn BrowserEnvironment,
    bound: Duration,
) -> Reading {
    let read = AssertUnwindSafe(probe.read(env)).catch_unwind();
    TimeoutGuard::new(bound)
        .run(read, Ok(Reading::fault(ProbeFault::Timeout)))
        .await
        .into_inner()
        .unwrap_or_else(|_| Reading::fault(ProbeFault::failed(PANIC_REASON)))
}
