//! Cross-cutting services module
//!
//! Lifecycle events and the metrics aggregated from them.

pub mod events;
pub mod metrics;

// Re-export commonly used types
pub use events::{
    AdBlockEvent, CollectionEvent, ErrorEvent, EventDispatcher, EventHandler, LoggingHandler,
    MetricsHandler, NoiseEvent, ProbeSettledEvent, RunCompletedEvent, RunStartedEvent,
    SubmissionEvent,
};
pub use metrics::{GlobalStats, MetricsCollector, MetricsSnapshot, ProbeStats};
