//! Probe contracts and the registry the orchestrator walks.
//!
//! Probes never fail: whatever goes wrong inside one is folded into the
//! [`Reading`] it returns. Each probe owns exactly one attribute key.

pub mod devices;
pub mod layout;
pub mod navigator;
pub mod rendering;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::collection::core::{ProbeKind, Reading};
use crate::config::ProbeBudgets;
use crate::environment::BrowserEnvironment;

/// Slack added to a probe budget whose read carries its own inner bound, so the
/// inner bound reports first.
pub const SETTLE_GRACE: Duration = Duration::from_millis(50);

/// Probe that completes without suspending.
pub trait ImmediateProbe: Send + Sync {
    fn name(&self) -> &'static str;
    fn key(&self) -> &'static str;
    fn read(&self, env: &dyn BrowserEnvironment) -> Reading;
}

/// Probe that suspends at least once before producing its reading.
#[async_trait]
pub trait SuspendingProbe: Send + Sync {
    fn name(&self) -> &'static str;
    fn key(&self) -> &'static str;

    /// Bound applied around one read.
    fn budget(&self, budgets: &ProbeBudgets) -> Duration {
        budgets.default_bound()
    }

    async fn read(&self, env: &dyn BrowserEnvironment) -> Reading;
}

/// Immediate probe backed by a plain function.
#[derive(Clone, Copy)]
pub struct FnProbe {
    name: &'static str,
    key: &'static str,
    read: fn(&dyn BrowserEnvironment) -> Reading,
}

impl FnProbe {
    pub const fn new(
        name: &'static str,
        key: &'static str,
        read: fn(&dyn BrowserEnvironment) -> Reading,
    ) -> Self {
        Self { name, key, read }
    }

    /// Probe whose name is its attribute key.
    pub const fn keyed(key: &'static str, read: fn(&dyn BrowserEnvironment) -> Reading) -> Self {
        Self::new(key, key, read)
    }
}

impl ImmediateProbe for FnProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    fn key(&self) -> &'static str {
        self.key
    }

    fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        (self.read)(env)
    }
}

#[derive(Clone)]
pub enum Probe {
    Immediate(Arc<dyn ImmediateProbe>),
    Suspending(Arc<dyn SuspendingProbe>),
}

impl Probe {
    pub fn name(&self) -> &'static str {
        match self {
            Probe::Immediate(probe) => probe.name(),
            Probe::Suspending(probe) => probe.name(),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Probe::Immediate(probe) => probe.key(),
            Probe::Suspending(probe) => probe.key(),
        }
    }

    pub fn kind(&self) -> ProbeKind {
        match self {
            Probe::Immediate(_) => ProbeKind::Immediate,
            Probe::Suspending(_) => ProbeKind::Suspending,
        }
    }
}

/// A registered probe and whether it is checked for noise.
#[derive(Clone)]
pub struct ProbeEntry {
    pub probe: Probe,
    pub sampled: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("attribute key `{0}` is already owned by another probe")]
    DuplicateKey(&'static str),
    #[error("probe name `{0}` is already registered")]
    DuplicateName(&'static str),
}

/// Ordered probe set. Immediate probes run in registration order.
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    entries: Vec<ProbeEntry>,
    keys: HashSet<&'static str>,
    names: HashSet<&'static str>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every built-in probe except the ad-blocker heuristic, which
    /// needs a filter-list source and is added by the collector.
    pub fn standard(budgets: &ProbeBudgets) -> Self {
        let mut registry = Self::new();
        for probe in navigator::probes() {
            registry.builtin(Probe::Immediate(Arc::new(probe)), false);
        }
        registry.builtin(Probe::Immediate(Arc::new(rendering::webgl_renderer_probe())), false);
        registry.builtin(Probe::Immediate(Arc::new(layout::ClientRectsProbe::default())), true);

        let suspending: [(Arc<dyn SuspendingProbe>, bool); 10] = [
            (Arc::new(rendering::CanvasProbe::default()), true),
            (Arc::new(rendering::AudioProbe::default()), true),
            (Arc::new(devices::GeolocationProbe::new(budgets.geolocation_prompt())), false),
            (Arc::new(layout::ThemeChangerProbe::default()), false),
            (Arc::new(devices::BatteryProbe), false),
            (Arc::new(devices::MediaDevicesProbe), false),
            (Arc::new(devices::SpeechVoicesProbe::new(budgets.speech_settle())), false),
            (Arc::new(devices::CpuTimingProbe::default()), false),
            (Arc::new(rendering::WebGlSceneProbe::new(budgets.script_load())), false),
            (Arc::new(rendering::WebGpuProbe::new(budgets.default_bound())), false),
        ];
        for (probe, sampled) in suspending {
            registry.builtin(Probe::Suspending(probe), sampled);
        }
        registry
    }

    // Built-in probes have distinct keys by construction.
    fn builtin(&mut self, probe: Probe, sampled: bool) {
        if let Err(err) = self.register(probe, sampled) {
            log::error!("built-in probe rejected: {err}");
        }
    }

    pub fn register(&mut self, probe: Probe, sampled: bool) -> Result<(), RegistryError> {
        let key = probe.key();
        let name = probe.name();
        if self.keys.contains(key) {
            return Err(RegistryError::DuplicateKey(key));
        }
        if self.names.contains(name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.keys.insert(key);
        self.names.insert(name);
        self.entries.push(ProbeEntry { probe, sampled });
        Ok(())
    }

    pub fn register_immediate(
        &mut self,
        probe: impl ImmediateProbe + 'static,
    ) -> Result<(), RegistryError> {
        self.register(Probe::Immediate(Arc::new(probe)), false)
    }

    pub fn register_suspending(
        &mut self,
        probe: impl SuspendingProbe + 'static,
    ) -> Result<(), RegistryError> {
        self.register(Probe::Suspending(Arc::new(probe)), false)
    }

    /// Drop the probe owning `key`. Returns whether one was registered.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(index) = self.entries.iter().position(|entry| entry.probe.key() == key) else {
            return false;
        };
        let entry = self.entries.remove(index);
        self.keys.remove(entry.probe.key());
        self.names.remove(entry.probe.name());
        true
    }

    pub fn entries(&self) -> &[ProbeEntry] {
        &self.entries
    }

    pub fn immediate(&self) -> impl Iterator<Item = &ProbeEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.probe.kind() == ProbeKind::Immediate)
    }

    pub fn suspending(&self) -> impl Iterator<Item = &ProbeEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.probe.kind() == ProbeKind::Suspending)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
