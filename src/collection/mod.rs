//! Fingerprint collection engine.
//!
//! `core` holds the shared value types and run-scoped helpers, `probes` the
//! individual signals, `adblock` the cosmetic-filter heuristic, and
//! `orchestrator` the two-phase run that ties them together.

pub mod adblock;
pub mod core;
pub mod orchestrator;
pub mod probes;

pub use orchestrator::Orchestrator;
