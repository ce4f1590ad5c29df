use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use fingerprint_probe::{
    BaitSelection, CollectorError, ContentBlocker, FingerprintCollector, MatchPayload,
    MatchStatus, MatchTransport, NoiseTarget, ProbeBudgets, ProbeFault, Reading, SimulatedApi,
    SimulatedEnvironment, StaticFilterLists, TransportError, TransportResponse, UNSTABLE_KEYS,
    collection::core::keys,
};
use http::HeaderMap;
use serde_json::Value;
use url::Url;

const NEW_USER: &str = r#"{"your_uuid":"abc","match_status":"NEW_USER"}"#;

const FILTER_TEXT: &str = "\
[Adblock Plus 2.0]
! Title: test list
##.ad-banner
##.sponsored-box
##div > .nested
example.org##.site-specific
##[data-ad-slot=\"top\"]";

/// Records every request and answers with a fixed response.
struct RecordingTransport {
    status: u16,
    body: &'static str,
    requests: Mutex<Vec<Bytes>>,
}

impl RecordingTransport {
    fn new(status: u16, body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            status,
            body,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn sent_payloads(&self) -> Vec<MatchPayload> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|body| serde_json::from_slice(body).unwrap())
            .collect()
    }
}

#[async_trait]
impl MatchTransport for RecordingTransport {
    async fn post(
        &self,
        _url: &Url,
        _headers: &HeaderMap,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(body);
        Ok(TransportResponse {
            status: self.status,
            body: Bytes::from_static(self.body.as_bytes()),
        })
    }
}

fn fast_budgets() -> ProbeBudgets {
    ProbeBudgets::default().scaled(0.05)
}

fn collector(
    env: Arc<SimulatedEnvironment>,
    lists: StaticFilterLists,
    transport: Arc<RecordingTransport>,
) -> FingerprintCollector {
    FingerprintCollector::builder()
        .with_environment(env)
        .with_endpoint("http://matcher.test/analyze")
        .with_filter_lists(["https://lists.test/a.txt", "https://lists.test/b.txt"])
        .with_filter_source(Arc::new(lists))
        .with_transport(transport)
        .with_budgets(fast_budgets())
        .with_bait_selection(BaitSelection::Exhaustive)
        .build()
        .unwrap()
}

#[tokio::test]
async fn analyze_submits_disjoint_groups_and_returns_response_unmodified() {
    let env = Arc::new(
        SimulatedEnvironment::desktop_chrome()
            .with_content_blocker(ContentBlocker::new([".ad-banner"])),
    );
    let transport = RecordingTransport::new(200, NEW_USER);
    let lists = StaticFilterLists::new()
        .with_list("https://lists.test/a.txt", FILTER_TEXT)
        .with_list("https://lists.test/b.txt", "");
    let collector = collector(env.clone(), lists, transport.clone());

    let response = collector.analyze().await.unwrap();

    assert_eq!(response.match_status, MatchStatus::NewUser);
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        serde_json::from_str::<Value>(NEW_USER).unwrap()
    );

    let payloads = transport.sent_payloads();
    assert_eq!(payloads.len(), 1);
    let payload = &payloads[0];

    let stable: BTreeSet<_> = payload.stable.keys().collect();
    let unstable: BTreeSet<_> = payload.unstable.keys().collect();
    assert!(!stable.is_empty());
    assert!(stable.is_disjoint(&unstable));
    assert!(unstable.iter().all(|key| UNSTABLE_KEYS.contains(&key.as_str())));
    assert!(stable.contains(&keys::USER_AGENT.to_string()));

    // `.ad-banner` hidden; `.sponsored-box` and the attribute bait visible.
    assert_eq!(
        payload.unstable.get(keys::AD_BLOCKER),
        Some(&Reading::value("1/3"))
    );
    assert_eq!(
        payload.unstable.get(keys::GEOLOCATION),
        Some(&Reading::fault(ProbeFault::PermissionDenied))
    );

    let noise: Vec<_> = payload.noise.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    assert_eq!(
        noise,
        vec![("audio", false), ("canvas", false), ("client_rects", false)]
    );
    assert_eq!(env.attached_elements(), 0);
}

#[tokio::test]
async fn hanging_capabilities_fall_back_within_their_budgets() {
    let env = Arc::new(
        SimulatedEnvironment::desktop_chrome()
            .with_battery(SimulatedApi::hanging())
            .with_media_devices(SimulatedApi::hanging())
            .with_script_load(SimulatedApi::hanging())
            .with_gpu_adapter(SimulatedApi::hanging()),
    );
    let transport = RecordingTransport::new(200, NEW_USER);
    let collector = collector(
        env.clone(),
        StaticFilterLists::uniform(FILTER_TEXT),
        transport,
    );

    let started = Instant::now();
    let payload = collector.collect().await;

    assert!(started.elapsed() < Duration::from_secs(3));
    let timeout = Reading::fault(ProbeFault::Timeout);
    assert_eq!(payload.unstable.get(keys::BATTERY), Some(&timeout));
    assert_eq!(payload.stable.get(keys::MEDIA_DEVICES), Some(&timeout));
    assert_eq!(payload.stable.get(keys::WEBGL_SCENE), Some(&timeout));
    assert_eq!(payload.stable.get(keys::WEBGPU_ADAPTER), Some(&timeout));
    assert!(payload.stable.get(keys::CANVAS).is_some_and(Reading::is_value));
    assert_eq!(env.attached_elements(), 0);
}

#[tokio::test]
async fn perturbed_signals_are_reported_as_noise() {
    let env = Arc::new(
        SimulatedEnvironment::desktop_chrome()
            .with_noise(NoiseTarget::Audio)
            .with_noise(NoiseTarget::ClientRects),
    );
    let collector = collector(
        env,
        StaticFilterLists::uniform(FILTER_TEXT),
        RecordingTransport::new(200, NEW_USER),
    );

    let payload = collector.collect().await;

    assert_eq!(payload.noise.get("audio"), Some(&true));
    assert_eq!(payload.noise.get("client_rects"), Some(&true));
    assert_eq!(payload.noise.get("canvas"), Some(&false));
}

#[tokio::test]
async fn unreachable_filter_lists_degrade_to_fetch_failed() {
    let collector = collector(
        Arc::new(SimulatedEnvironment::desktop_chrome()),
        StaticFilterLists::new(),
        RecordingTransport::new(200, NEW_USER),
    );

    let payload = collector.collect().await;

    assert_eq!(
        payload.unstable.get(keys::AD_BLOCKER),
        Some(&Reading::fault(ProbeFault::failed("fetch failed")))
    );
}

#[tokio::test]
async fn failed_submission_is_terminal_and_counted_once() {
    let transport = RecordingTransport::new(503, "unavailable");
    let collector = collector(
        Arc::new(SimulatedEnvironment::desktop_chrome()),
        StaticFilterLists::uniform(FILTER_TEXT),
        transport.clone(),
    );

    let err = collector.analyze().await.unwrap_err();

    match err {
        CollectorError::Submission(inner) => assert_eq!(inner.status(), Some(503)),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.sent_payloads().len(), 1);

    let snapshot = collector.metrics().unwrap().snapshot();
    assert_eq!(snapshot.global.runs, 1);
    assert_eq!(snapshot.global.submissions, 1);
    assert_eq!(snapshot.global.submission_failures, 1);
    assert!(snapshot.probe(keys::AD_BLOCKER).is_some());
}
