//! # fingerprint-probe
//!
//! A concurrent browser fingerprint collection engine.
//!
//! Many heterogeneous probes read signals from a browser runtime: some answer
//! immediately, others suspend on permission prompts, rendering backends or
//! network fetches, and any of them may hang or be perturbed by
//! anti-fingerprinting extensions. The engine bounds every probe's time
//! budget, samples the sensitive ones repeatedly to flag noise, runs a
//! cosmetic-filter bait heuristic to detect ad blockers, and always assembles
//! a complete payload for an external matching service.
//!
//! ## Features
//!
//! - Two-phase run: immediate probes in order, then every suspending probe
//!   polled concurrently on one task
//! - Per-probe timeouts with tagged fault readings instead of sentinel strings
//! - Stability sampling for canvas, audio and client-rect signals
//! - Ad-blocker detection from public cosmetic filter lists
//! - Static stable/unstable payload partitioning
//! - Events, logging and metrics hooks
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fingerprint_probe::{FingerprintCollector, SimulatedEnvironment};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let collector = FingerprintCollector::builder()
//!         .with_environment(Arc::new(SimulatedEnvironment::desktop_chrome()))
//!         .with_endpoint("http://127.0.0.1:5001/analyze")
//!         .build()?;
//!     let response = collector.analyze().await?;
//!     println!("visitor: {} ({:?})", response.your_uuid, response.match_status);
//!     Ok(())
//! }
//! ```

mod fingerprint;

pub mod collection;
pub mod config;
pub mod environment;
pub mod external_deps;
pub mod modules;

pub use crate::fingerprint::{
    CollectorError,
    CollectorResult,
    FingerprintCollector,
    FingerprintCollectorBuilder,
};

pub use crate::collection::adblock::{
    AdBlockOutcome,
    AdBlockProbe,
    AdBlockSettings,
    AdBlockerHeuristicDetector,
    DetectionReport,
    DetectorPhase,
};

pub use crate::collection::core::{
    FingerprintMap,
    FingerprintValue,
    Guarded,
    NoiseMap,
    Partitioned,
    ProbeFault,
    ProbeKind,
    Reading,
    RunContext,
    SampleVerdict,
    StabilitySampler,
    TimeoutGuard,
    UNSTABLE_KEYS,
    partition,
};

pub use crate::collection::orchestrator::Orchestrator;

pub use crate::collection::probes::{
    FnProbe,
    ImmediateProbe,
    Probe,
    ProbeRegistry,
    RegistryError,
    SuspendingProbe,
};

pub use crate::config::{BaitSelection, CollectorConfig, ConfigError, ProbeBudgets};

pub use crate::environment::{
    BrowserEnvironment,
    ContentBlocker,
    NoiseTarget,
    SimulatedApi,
    SimulatedEnvironment,
};

pub use crate::external_deps::filter_lists::{
    FilterListError,
    FilterListSource,
    HttpFilterListSource,
    StaticFilterLists,
};

pub use crate::external_deps::matcher::{
    ComparisonRow,
    MatchDetails,
    MatchPayload,
    MatchResponse,
    MatchStatus,
    MatchTransport,
    ReqwestMatchTransport,
    ResultSubmitter,
    SubmissionError,
    TransportError,
    TransportResponse,
};

pub use crate::modules::{
    CollectionEvent,
    EventDispatcher,
    EventHandler,
    LoggingHandler,
    MetricsCollector,
    MetricsHandler,
    MetricsSnapshot,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
