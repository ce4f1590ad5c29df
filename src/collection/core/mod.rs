//! Core utilities shared by probes, the ad-blocker heuristic, and the orchestrator.

pub mod context;
pub mod keys;
pub mod partition;
pub mod sampler;
pub mod timeout;
pub mod types;

pub use context::{FingerprintMap, NoiseMap, RunContext};
pub use partition::{Partitioned, UNSTABLE_KEYS, is_unstable_key, partition};
pub use sampler::{DEFAULT_SAMPLE_COUNT, SampleVerdict, StabilitySampler};
pub use timeout::{Guarded, TimeoutGuard};
pub use types::{FingerprintValue, ProbeFault, ProbeKind, Reading};
