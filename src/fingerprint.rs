//! High level collection entry point.
//!
//! Wires the probe registry, the ad-blocker heuristic, the orchestrator and
//! the matcher boundary together behind one `analyze()` call: collect every
//! signal, split it into stable and unstable halves, and post it once.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;

use crate::collection::adblock::{AdBlockProbe, AdBlockSettings, AdBlockerHeuristicDetector};
use crate::collection::core::{RunContext, StabilitySampler};
use crate::collection::orchestrator::Orchestrator;
use crate::collection::probes::{Probe, ProbeRegistry, RegistryError};
use crate::config::{BaitSelection, CollectorConfig, ConfigError, ProbeBudgets};
use crate::environment::BrowserEnvironment;
use crate::external_deps::filter_lists::{FilterListError, FilterListSource, HttpFilterListSource};
use crate::external_deps::matcher::{
	MatchPayload, MatchResponse, MatchTransport, ReqwestMatchTransport, ResultSubmitter,
	SubmissionError, TransportError,
};
use crate::modules::events::{
	CollectionEvent, ErrorEvent, EventDispatcher, EventHandler, LoggingHandler, MetricsHandler,
	SubmissionEvent,
};
use crate::modules::metrics::MetricsCollector;

/// Result alias used across the collection layer.
pub type CollectorResult<T> = Result<T, CollectorError>;

/// High-level error surfaced by the collector.
#[derive(Debug, Error)]
pub enum CollectorError {
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
	#[error("probe registry error: {0}")]
	Registry(#[from] RegistryError),
	#[error("filter list source initialisation failed: {0}")]
	FilterLists(#[from] FilterListError),
	#[error("matcher transport initialisation failed: {0}")]
	Transport(#[from] TransportError),
	#[error("no browser environment configured")]
	MissingEnvironment,
	#[error("submission failed: {0}")]
	Submission(#[from] SubmissionError),
}

/// Fluent builder for [`FingerprintCollector`].
pub struct FingerprintCollectorBuilder {
	config: CollectorConfig,
	environment: Option<Arc<dyn BrowserEnvironment>>,
	filter_source: Option<Arc<dyn FilterListSource>>,
	transport: Option<Arc<dyn MatchTransport>>,
	registry: Option<ProbeRegistry>,
	extra_probes: Vec<(Probe, bool)>,
	handlers: Vec<Arc<dyn EventHandler>>,
	enable_metrics: bool,
	enable_adblock: bool,
}

impl FingerprintCollectorBuilder {
	pub fn new() -> Self {
		Self {
			config: CollectorConfig::default(),
			environment: None,
			filter_source: None,
			transport: None,
			registry: None,
			extra_probes: Vec::new(),
			handlers: Vec::new(),
			enable_metrics: true,
			enable_adblock: true,
		}
	}

	pub fn with_config(mut self, config: CollectorConfig) -> Self {
		self.config = config;
		self
	}

	pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.config.endpoint = endpoint.into();
		self
	}

	pub fn with_budgets(mut self, budgets: ProbeBudgets) -> Self {
		self.config.budgets = budgets;
		self
	}

	pub fn with_sample_count(mut self, samples: usize) -> Self {
		self.config.sample_count = samples.max(1);
		self
	}

	pub fn with_bait_selection(mut self, selection: BaitSelection) -> Self {
		self.config.bait_selection = selection;
		self
	}

	pub fn with_filter_lists<I, S>(mut self, urls: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.filter_lists = urls.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_environment(mut self, environment: Arc<dyn BrowserEnvironment>) -> Self {
		self.environment = Some(environment);
		self
	}

	pub fn with_filter_source(mut self, source: Arc<dyn FilterListSource>) -> Self {
		self.filter_source = Some(source);
		self
	}

	pub fn with_transport(mut self, transport: Arc<dyn MatchTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Replace the built-in probe set. The ad-blocker probe is still added
	/// unless disabled.
	pub fn with_registry(mut self, registry: ProbeRegistry) -> Self {
		self.registry = Some(registry);
		self
	}

	/// Register an additional probe on top of the built-in set.
	pub fn with_probe(mut self, probe: Probe, sampled: bool) -> Self {
		self.extra_probes.push((probe, sampled));
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn disable_metrics(mut self) -> Self {
		self.enable_metrics = false;
		self
	}

	pub fn disable_adblock(mut self) -> Self {
		self.enable_adblock = false;
		self
	}

	pub fn build(self) -> CollectorResult<FingerprintCollector> {
		FingerprintCollector::from_builder(self)
	}
}

impl Default for FingerprintCollectorBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Runs collection passes against one environment and submits the result.
pub struct FingerprintCollector {
	config: CollectorConfig,
	environment: Arc<dyn BrowserEnvironment>,
	orchestrator: Orchestrator,
	submitter: ResultSubmitter,
	metrics: Option<MetricsCollector>,
	events: Arc<EventDispatcher>,
}

impl FingerprintCollector {
	/// Obtain a builder to customise the collector instance.
	pub fn builder() -> FingerprintCollectorBuilder {
		FingerprintCollectorBuilder::new()
	}

	fn from_builder(builder: FingerprintCollectorBuilder) -> CollectorResult<Self> {
		let FingerprintCollectorBuilder {
			config,
			environment,
			filter_source,
			transport,
			registry,
			extra_probes,
			handlers,
			enable_metrics,
			enable_adblock,
		} = builder;

		config.validate()?;
		let environment = environment.ok_or(CollectorError::MissingEnvironment)?;
		let endpoint = config.endpoint_url()?;

		let metrics = enable_metrics.then(MetricsCollector::new);
		let mut events = EventDispatcher::new();
		events.register_handler(Arc::new(LoggingHandler));
		if let Some(ref collector) = metrics {
			events.register_handler(Arc::new(MetricsHandler::new(collector.clone())));
		}
		for handler in handlers {
			events.register_handler(handler);
		}
		let events = Arc::new(events);

		let mut registry = registry.unwrap_or_else(|| ProbeRegistry::standard(&config.budgets));
		for (probe, sampled) in extra_probes {
			registry.register(probe, sampled)?;
		}
		if enable_adblock {
			let source = match filter_source {
				Some(source) => source,
				None => Arc::new(HttpFilterListSource::new(config.request_timeout())?),
			};
			let detector =
				AdBlockerHeuristicDetector::new(source, AdBlockSettings::from_config(&config))
					.with_events(events.clone());
			registry.register_suspending(AdBlockProbe::new(detector))?;
		}

		let transport = match transport {
			Some(transport) => transport,
			None => Arc::new(ReqwestMatchTransport::new(config.request_timeout())?),
		};

		let orchestrator = Orchestrator::new(registry, config.budgets)
			.with_sampler(StabilitySampler::new(config.sample_count))
			.with_events(events.clone());

		Ok(Self {
			config,
			environment,
			orchestrator,
			submitter: ResultSubmitter::new(transport, endpoint),
			metrics,
			events,
		})
	}

	pub fn config(&self) -> &CollectorConfig {
		&self.config
	}

	/// Access the metrics collector if enabled.
	pub fn metrics(&self) -> Option<&MetricsCollector> {
		self.metrics.as_ref()
	}

	/// Run every probe once and return the filled run context.
	pub async fn run(&self) -> RunContext {
		self.orchestrator.run(self.environment.as_ref()).await
	}

	/// Run every probe once and build the payload without submitting it.
	pub async fn collect(&self) -> MatchPayload {
		let (partitioned, noise) = self.run().await.finish();
		MatchPayload::new(partitioned, noise)
	}

	/// Collect, partition and submit. The matcher response is returned
	/// exactly as decoded.
	pub async fn analyze(&self) -> CollectorResult<MatchResponse> {
		let payload = self.collect().await;
		self.submit(&payload).await
	}

	/// Post an already collected payload. Failures are reported once and
	/// never retried.
	pub async fn submit(&self, payload: &MatchPayload) -> CollectorResult<MatchResponse> {
		let started = Instant::now();
		match self.submitter.submit(payload).await {
			Ok(response) => {
				self.events.dispatch(CollectionEvent::Submission(SubmissionEvent {
					endpoint: self.submitter.endpoint().clone(),
					match_status: response.match_status,
					latency: started.elapsed(),
					timestamp: Utc::now(),
				}));
				Ok(response)
			}
			Err(err) => {
				self.events.dispatch(CollectionEvent::Error(ErrorEvent {
					stage: "submission",
					error: err.to_string(),
					timestamp: Utc::now(),
				}));
				Err(CollectorError::Submission(err))
			}
		}
	}
}
