//! Ad-blocker heuristic.
//!
//! The detector downloads public cosmetic filter lists, turns the simple
//! element-hiding rules into bait elements, and counts how many baits a
//! content blocker hid. It moves through
//! `Idle -> FetchingLists -> ParsingRules -> BaitingDom -> Measuring -> Resolved`
//! and a global timeout can resolve it from any phase. The outcome is
//! written exactly once; bait elements are removed on every exit path,
//! cancellation included.

pub mod bait;
pub mod rules;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::OnceCell;

use crate::collection::core::{ProbeFault, Reading, keys};
use crate::collection::probes::{SETTLE_GRACE, SuspendingProbe};
use crate::config::{BaitSelection, CollectorConfig, ProbeBudgets};
use crate::environment::BrowserEnvironment;
use crate::external_deps::filter_lists::FilterListSource;
use crate::modules::events::{AdBlockEvent, CollectionEvent, EventDispatcher};

use bait::{BaitHouse, choose_selectors};
use rules::parse_cosmetic_selectors;

/// Detector phases, in the order a full run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorPhase {
    Idle,
    FetchingLists,
    ParsingRules,
    BaitingDom,
    Measuring,
    Resolved,
}

/// Terminal result of one detection run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AdBlockOutcome {
    /// `blocked` of `total` baits were hidden.
    Measured { blocked: usize, total: usize },
    /// Every list failed or came back blank.
    FetchFailed,
    /// No rule survived parsing, or no bait could be built from them.
    NoUsableRules,
    /// The environment refused to host the bait container.
    Faulted(ProbeFault),
    TimedOut,
}

impl AdBlockOutcome {
    pub fn to_reading(&self) -> Reading {
        match self {
            AdBlockOutcome::Measured { blocked, total } => {
                Reading::value(format!("{blocked}/{total}"))
            }
            AdBlockOutcome::FetchFailed => Reading::fault(ProbeFault::failed("fetch failed")),
            AdBlockOutcome::NoUsableRules => Reading::fault(ProbeFault::Empty),
            AdBlockOutcome::Faulted(fault) => Reading::fault(fault.clone()),
            AdBlockOutcome::TimedOut => Reading::fault(ProbeFault::Timeout),
        }
    }

    pub fn detected(&self) -> bool {
        matches!(self, AdBlockOutcome::Measured { blocked, .. } if *blocked > 0)
    }
}

/// Outcome plus the phases the run went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionReport {
    pub outcome: AdBlockOutcome,
    pub trace: Vec<DetectorPhase>,
}

impl DetectionReport {
    pub fn visited(&self, phase: DetectorPhase) -> bool {
        self.trace.contains(&phase)
    }
}

#[derive(Debug, Clone)]
pub struct AdBlockSettings {
    pub filter_lists: Vec<String>,
    pub timeout: Duration,
    pub settle: Duration,
    pub selection: BaitSelection,
}

impl AdBlockSettings {
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            filter_lists: config.filter_lists.clone(),
            timeout: config.budgets.adblock(),
            settle: config.budgets.bait_settle(),
            selection: config.bait_selection,
        }
    }
}

impl Default for AdBlockSettings {
    fn default() -> Self {
        Self::from_config(&CollectorConfig::default())
    }
}

// Shared between the driving future and the timeout branch.
struct DetectorRun {
    trace: Mutex<Vec<DetectorPhase>>,
    resolution: OnceCell<AdBlockOutcome>,
}

impl DetectorRun {
    fn new() -> Self {
        Self {
            trace: Mutex::new(vec![DetectorPhase::Idle]),
            resolution: OnceCell::new(),
        }
    }

    fn enter(&self, phase: DetectorPhase) {
        log::trace!("ad-blocker detector entering {phase:?}");
        if let Ok(mut trace) = self.trace.lock() {
            trace.push(phase);
        }
    }

    /// First caller wins; later outcomes are dropped.
    fn resolve(&self, outcome: AdBlockOutcome) -> bool {
        match self.resolution.set(outcome) {
            Ok(()) => {
                self.enter(DetectorPhase::Resolved);
                true
            }
            Err(ignored) => {
                log::debug!("ad-blocker detector already resolved, ignoring {ignored:?}");
                false
            }
        }
    }

    fn into_report(self) -> DetectionReport {
        let outcome = self
            .resolution
            .into_inner()
            .unwrap_or(AdBlockOutcome::TimedOut);
        let trace = self.trace.into_inner().unwrap_or_default();
        DetectionReport { outcome, trace }
    }
}

pub struct AdBlockerHeuristicDetector {
    source: Arc<dyn FilterListSource>,
    settings: AdBlockSettings,
    events: Option<Arc<EventDispatcher>>,
}

impl AdBlockerHeuristicDetector {
    pub fn new(source: Arc<dyn FilterListSource>, settings: AdBlockSettings) -> Self {
        Self {
            source,
            settings,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &AdBlockSettings {
        &self.settings
    }

    pub async fn detect(&self, env: &dyn BrowserEnvironment) -> DetectionReport {
        log::debug!("ad-blocker detection starting");
        let run = DetectorRun::new();

        let driven = tokio::time::timeout(self.settings.timeout, self.drive(env, &run)).await;
        if driven.is_err() {
            log::warn!(
                "ad-blocker detection timed out after {:?}",
                self.settings.timeout
            );
            run.resolve(AdBlockOutcome::TimedOut);
        }

        let report = run.into_report();
        if let Some(events) = &self.events {
            events.dispatch(CollectionEvent::AdBlock(AdBlockEvent {
                outcome: report.outcome.clone(),
                timestamp: chrono::Utc::now(),
            }));
        }
        report
    }

    async fn drive(&self, env: &dyn BrowserEnvironment, run: &DetectorRun) {
        run.enter(DetectorPhase::FetchingLists);
        let text = self.fetch_lists().await;
        if text.trim().is_empty() {
            log::error!("ad-blocker detection could not fetch any filter list");
            run.resolve(AdBlockOutcome::FetchFailed);
            return;
        }
        log::debug!("fetched {} characters of filter rules", text.len());

        run.enter(DetectorPhase::ParsingRules);
        let selectors = parse_cosmetic_selectors(&text);
        if selectors.is_empty() {
            log::warn!("no usable element-hiding rules in the filter lists");
            run.resolve(AdBlockOutcome::NoUsableRules);
            return;
        }
        log::debug!("parsed {} usable selectors", selectors.len());

        run.enter(DetectorPhase::BaitingDom);
        let chosen = choose_selectors(&selectors, self.settings.selection);
        let house = match BaitHouse::build(env, &chosen) {
            Ok(house) => house,
            Err(fault) => {
                log::warn!("could not attach bait container: {fault}");
                run.resolve(AdBlockOutcome::Faulted(fault));
                return;
            }
        };
        if house.is_empty() {
            log::warn!("all {} bait selectors were malformed", house.skipped());
            run.resolve(AdBlockOutcome::NoUsableRules);
            return;
        }
        log::debug!(
            "attached {} baits ({} skipped)",
            house.len(),
            house.skipped()
        );

        // Give the blocker time to act.
        tokio::time::sleep(self.settings.settle).await;

        run.enter(DetectorPhase::Measuring);
        let total = house.len();
        let blocked = house.count_blocked();
        drop(house);

        log::debug!("{blocked} of {total} baits were blocked");
        run.resolve(AdBlockOutcome::Measured { blocked, total });
    }

    async fn fetch_lists(&self) -> String {
        let fetches = self.settings.filter_lists.iter().map(|url| async move {
            match self.source.fetch(url).await {
                Ok(text) => text,
                Err(err) => {
                    log::debug!("filter list {url} unavailable: {err}");
                    String::new()
                }
            }
        });
        join_all(fetches).await.join("\n")
    }
}

/// Registry adapter for the detector.
pub struct AdBlockProbe {
    detector: AdBlockerHeuristicDetector,
}

impl AdBlockProbe {
    pub fn new(detector: AdBlockerHeuristicDetector) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl SuspendingProbe for AdBlockProbe {
    fn name(&self) -> &'static str {
        keys::AD_BLOCKER
    }

    fn key(&self) -> &'static str {
        keys::AD_BLOCKER
    }

    // The detector's own timeout has to fire first.
    fn budget(&self, budgets: &ProbeBudgets) -> Duration {
        budgets.adblock().max(self.detector.settings.timeout) + SETTLE_GRACE
    }

    async fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        self.detector.detect(env).await.outcome.to_reading()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{ContentBlocker, SimulatedEnvironment};
    use crate::external_deps::filter_lists::{FilterListError, StaticFilterLists};

    struct FailingLists;

    #[async_trait]
    impl FilterListSource for FailingLists {
        async fn fetch(&self, url: &str) -> Result<String, FilterListError> {
            Err(FilterListError::Transport(format!("{url} unreachable")))
        }
    }

    struct HangingLists;

    #[async_trait]
    impl FilterListSource for HangingLists {
        async fn fetch(&self, _url: &str) -> Result<String, FilterListError> {
            std::future::pending().await
        }
    }

    fn settings(lists: &[&str]) -> AdBlockSettings {
        AdBlockSettings {
            filter_lists: lists.iter().map(|url| url.to_string()).collect(),
            timeout: Duration::from_millis(500),
            settle: Duration::from_millis(5),
            selection: BaitSelection::Exhaustive,
        }
    }

    fn detector(source: impl FilterListSource + 'static, lists: &[&str]) -> AdBlockerHeuristicDetector {
        AdBlockerHeuristicDetector::new(Arc::new(source), settings(lists))
    }

    #[tokio::test]
    async fn counts_blocked_baits_exactly() {
        let lists = StaticFilterLists::new()
            .with_list("https://one", "##.ad-banner\n##.sponsored\n##div > .nested")
            .with_list("https://two", "##.promo-box\n##.clean-slot");
        let blocker = ContentBlocker::new([".ad-banner", ".promo-box"]);
        let env = SimulatedEnvironment::desktop_chrome().with_content_blocker(blocker);

        let report = detector(lists, &["https://one", "https://two"]).detect(&env).await;

        assert_eq!(report.outcome, AdBlockOutcome::Measured { blocked: 2, total: 4 });
        assert_eq!(report.outcome.to_reading(), Reading::value("2/4"));
        assert_eq!(
            report.trace,
            vec![
                DetectorPhase::Idle,
                DetectorPhase::FetchingLists,
                DetectorPhase::ParsingRules,
                DetectorPhase::BaitingDom,
                DetectorPhase::Measuring,
                DetectorPhase::Resolved,
            ]
        );
        assert_eq!(env.attached_elements(), 0);
    }

    #[tokio::test]
    async fn no_blocker_reports_zero() {
        let env = SimulatedEnvironment::desktop_chrome();
        let report = detector(StaticFilterLists::uniform("##.ad"), &["https://a"])
            .detect(&env)
            .await;
        assert_eq!(report.outcome, AdBlockOutcome::Measured { blocked: 0, total: 1 });
        assert!(!report.outcome.detected());
    }

    #[tokio::test]
    async fn failed_fetches_resolve_as_fetch_failed() {
        let env = SimulatedEnvironment::desktop_chrome();
        let report = detector(FailingLists, &["https://a", "https://b"]).detect(&env).await;
        assert_eq!(report.outcome, AdBlockOutcome::FetchFailed);
        assert_eq!(
            report.outcome.to_reading(),
            Reading::fault(ProbeFault::failed("fetch failed"))
        );
        assert!(!report.visited(DetectorPhase::ParsingRules));

        let blank = detector(StaticFilterLists::uniform("  \n\t"), &["https://a"])
            .detect(&env)
            .await;
        assert_eq!(blank.outcome, AdBlockOutcome::FetchFailed);
    }

    #[tokio::test]
    async fn unusable_rules_never_enter_baiting() {
        let env = SimulatedEnvironment::desktop_chrome();
        let lists = StaticFilterLists::uniform("! header\n##a:hover\n##div > p\nexample.com##.x");
        let report = detector(lists, &["https://a"]).detect(&env).await;

        assert_eq!(report.outcome, AdBlockOutcome::NoUsableRules);
        assert!(!report.visited(DetectorPhase::BaitingDom));
        assert_eq!(env.attached_elements(), 0);
    }

    #[tokio::test]
    async fn all_malformed_baits_mean_no_usable_rules() {
        let env = SimulatedEnvironment::desktop_chrome();
        let lists = StaticFilterLists::uniform("##[href^=\"http\"]\n##[$=x]");
        let report = detector(lists, &["https://a"]).detect(&env).await;

        assert_eq!(report.outcome, AdBlockOutcome::NoUsableRules);
        assert!(report.visited(DetectorPhase::BaitingDom));
        assert!(!report.visited(DetectorPhase::Measuring));
        assert_eq!(env.attached_elements(), 0);
    }

    #[tokio::test]
    async fn global_timeout_resolves_once() {
        let env = SimulatedEnvironment::desktop_chrome();
        let mut settings = settings(&["https://a"]);
        settings.timeout = Duration::from_millis(20);
        let report = AdBlockerHeuristicDetector::new(Arc::new(HangingLists), settings)
            .detect(&env)
            .await;

        assert_eq!(report.outcome, AdBlockOutcome::TimedOut);
        assert_eq!(
            report.trace.iter().filter(|p| **p == DetectorPhase::Resolved).count(),
            1
        );
    }

    #[tokio::test]
    async fn timeout_during_settle_removes_baits() {
        let env = SimulatedEnvironment::desktop_chrome();
        let mut settings = settings(&["https://a"]);
        settings.timeout = Duration::from_millis(20);
        settings.settle = Duration::from_secs(5);
        let report = AdBlockerHeuristicDetector::new(
            Arc::new(StaticFilterLists::uniform("##.ad\n##.banner")),
            settings,
        )
        .detect(&env)
        .await;

        assert_eq!(report.outcome, AdBlockOutcome::TimedOut);
        assert!(report.visited(DetectorPhase::BaitingDom));
        assert_eq!(env.attached_elements(), 0);
    }

    #[tokio::test]
    async fn container_fault_is_reported_as_is() {
        struct NoDom;

        impl BrowserEnvironment for NoDom {
            fn navigator(&self) -> crate::environment::NavigatorInfo {
                Default::default()
            }
        }

        let report = detector(StaticFilterLists::uniform("##.ad"), &["https://a"])
            .detect(&NoDom)
            .await;

        assert_eq!(report.outcome, AdBlockOutcome::Faulted(ProbeFault::Unsupported));
        assert_eq!(
            report.outcome.to_reading(),
            Reading::fault(ProbeFault::Unsupported)
        );
        assert_ne!(report.outcome.to_reading(), AdBlockOutcome::NoUsableRules.to_reading());
        assert!(!report.visited(DetectorPhase::Measuring));
    }

    #[test]
    fn resolution_keeps_first_outcome() {
        let run = DetectorRun::new();
        assert!(run.resolve(AdBlockOutcome::NoUsableRules));
        assert!(!run.resolve(AdBlockOutcome::TimedOut));
        assert_eq!(run.into_report().outcome, AdBlockOutcome::NoUsableRules);
    }
}
