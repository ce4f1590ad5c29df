//! Wire contract and single-exchange client for the identity matching service.
//!
//! The collector posts one `{stable, unstable, noise}` document and hands the
//! decoded response back to the caller as is. Nothing here retries: a failed
//! exchange is terminal for the run.

pub mod reqwest_client;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::collection::core::{FingerprintMap, NoiseMap, Partitioned};

pub use reqwest_client::ReqwestMatchTransport;

/// Request body sent to the matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPayload {
    pub stable: FingerprintMap,
    pub unstable: FingerprintMap,
    pub noise: NoiseMap,
}

impl MatchPayload {
    pub fn new(partitioned: Partitioned, noise: NoiseMap) -> Self {
        Self {
            stable: partitioned.stable,
            unstable: partitioned.unstable,
            noise,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    NewUser,
    MatchFound,
}

// Any value that was present, `null` included, becomes `Some`. Paired with
// `default` so only a missing key reads as `None`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// One attribute compared against the stored profile.
///
/// `stored_value` is `None` when the key was absent and `Some(Value::Null)`
/// when the matcher sent an explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub key: String,
    #[serde(rename = "currentValue")]
    pub current_value: Value,
    #[serde(
        rename = "storedValue",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub stored_value: Option<Value>,
    #[serde(rename = "match")]
    pub matched: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetails {
    pub matched_uuid: String,
    /// Similarity in percent, `0..=100`.
    pub score: f64,
    #[serde(default)]
    pub comparison_table: Vec<ComparisonRow>,
}

/// Decoded matcher response. Fields this crate does not know about are kept
/// in `extra` so re-encoding yields the document that was received.
///
/// Optional fields distinguish a missing key (`None`) from an explicit
/// `null` (`Some(None)`), so both re-encode as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResponse {
    pub your_uuid: String,
    pub match_status: MatchStatus,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub match_details: Option<Option<MatchDetails>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub noise_report: Option<Option<BTreeMap<String, bool>>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub tampering_detected: Option<Option<bool>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub trust_adjustments: Option<Option<BTreeMap<String, i64>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MatchResponse {
    pub fn is_match(&self) -> bool {
        self.match_status == MatchStatus::MatchFound
    }

    pub fn details(&self) -> Option<&MatchDetails> {
        self.match_details.as_ref().and_then(Option::as_ref)
    }

    pub fn tampering(&self) -> Option<bool> {
        self.tampering_detected.flatten()
    }

    pub fn trust_adjustment(&self, key: &str) -> Option<i64> {
        self.trust_adjustments
            .as_ref()
            .and_then(Option::as_ref)
            .and_then(|adjustments| adjustments.get(key).copied())
    }

    /// Names of the probes the matcher reports as noisy, in key order.
    pub fn noisy_probes(&self) -> Vec<&str> {
        self.noise_report
            .iter()
            .flatten()
            .flatten()
            .filter(|(_, noisy)| **noisy)
            .map(|(probe, _)| probe.as_str())
            .collect()
    }
}

/// Raw answer of the transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("matcher transport error: {0}")]
    Transport(String),
}

/// Performs one HTTP POST. Implementations must not retry.
#[async_trait]
pub trait MatchTransport: Send + Sync {
    async fn post(
        &self,
        url: &Url,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("matcher responded with status {status}")]
    Status { status: u16, body: String },
    #[error("failed to decode matcher response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl SubmissionError {
    pub fn status(&self) -> Option<u16> {
        match self {
            SubmissionError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Sends a payload to the matcher and decodes its answer.
#[derive(Clone)]
pub struct ResultSubmitter {
    transport: Arc<dyn MatchTransport>,
    endpoint: Url,
}

impl ResultSubmitter {
    pub fn new(transport: Arc<dyn MatchTransport>, endpoint: Url) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Exactly one exchange; the first failure is returned as is.
    pub async fn submit(&self, payload: &MatchPayload) -> Result<MatchResponse, SubmissionError> {
        let body = serde_json::to_vec(payload).map_err(SubmissionError::Encode)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        log::debug!(
            "posting {} stable / {} unstable attributes to {}",
            payload.stable.len(),
            payload.unstable.len(),
            self.endpoint
        );
        let response = self
            .transport
            .post(&self.endpoint, &headers, Bytes::from(body))
            .await?;

        if !response.is_success() {
            return Err(SubmissionError::Status {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        serde_json::from_slice(&response.body).map_err(SubmissionError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::core::{Reading, keys};
    use serde_json::json;
    use std::sync::Mutex;

    struct StubTransport {
        status: u16,
        body: &'static str,
        requests: Mutex<Vec<(Url, HeaderMap, Bytes)>>,
    }

    impl StubTransport {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MatchTransport for StubTransport {
        async fn post(
            &self,
            url: &Url,
            headers: &HeaderMap,
            body: Bytes,
        ) -> Result<TransportResponse, TransportError> {
            self.requests
                .lock()
                .unwrap()
                .push((url.clone(), headers.clone(), body));
            Ok(TransportResponse {
                status: self.status,
                body: Bytes::from_static(self.body.as_bytes()),
            })
        }
    }

    struct BrokenTransport;

    #[async_trait]
    impl MatchTransport for BrokenTransport {
        async fn post(
            &self,
            _url: &Url,
            _headers: &HeaderMap,
            _body: Bytes,
        ) -> Result<TransportResponse, TransportError> {
            Err(TransportError::Transport("connection refused".into()))
        }
    }

    fn endpoint() -> Url {
        Url::parse("https://matcher.test/analyze").unwrap()
    }

    fn payload() -> MatchPayload {
        let mut stable = FingerprintMap::new();
        stable.insert(keys::USER_AGENT.into(), Reading::value("Mozilla/5.0"));
        let mut unstable = FingerprintMap::new();
        unstable.insert(keys::RTT.into(), Reading::value(50_i64));
        let mut noise = NoiseMap::new();
        noise.insert("canvas".into(), false);
        MatchPayload {
            stable,
            unstable,
            noise,
        }
    }

    #[tokio::test]
    async fn posts_once_and_returns_response_unmodified() {
        let literal = r#"{"your_uuid":"abc","match_status":"NEW_USER"}"#;
        let transport = Arc::new(StubTransport::new(200, literal));
        let submitter = ResultSubmitter::new(transport.clone(), endpoint());

        let response = submitter.submit(&payload()).await.unwrap();

        assert_eq!(response.your_uuid, "abc");
        assert_eq!(response.match_status, MatchStatus::NewUser);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::from_str::<Value>(literal).unwrap()
        );

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (url, headers, body) = &requests[0];
        assert_eq!(url, &endpoint());
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        let sent: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(
            sent,
            json!({
                "stable": {"user_agent": "Mozilla/5.0"},
                "unstable": {"rtt_ms": 50},
                "noise": {"canvas": false}
            })
        );
    }

    #[tokio::test]
    async fn error_status_is_not_retried() {
        let transport = Arc::new(StubTransport::new(500, "boom"));
        let submitter = ResultSubmitter::new(transport.clone(), endpoint());

        let err = submitter.submit(&payload()).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transport_and_decode_failures_surface() {
        let submitter = ResultSubmitter::new(Arc::new(BrokenTransport), endpoint());
        assert!(matches!(
            submitter.submit(&payload()).await,
            Err(SubmissionError::Transport(_))
        ));

        let submitter =
            ResultSubmitter::new(Arc::new(StubTransport::new(200, "<html>")), endpoint());
        assert!(matches!(
            submitter.submit(&payload()).await,
            Err(SubmissionError::Decode(_))
        ));
    }

    #[test]
    fn match_found_response_decodes_details_and_extras() {
        let raw = json!({
            "your_uuid": "visitor",
            "match_status": "MATCH_FOUND",
            "match_details": {
                "matched_uuid": "stored",
                "score": 92.5,
                "comparison_table": [
                    {"key": "timezone", "currentValue": "UTC", "storedValue": "UTC", "match": true},
                    {"key": "canvas_fingerprint", "currentValue": null, "match": false}
                ]
            },
            "noise_report": {"canvas": true, "audio": false, "client_rects": true},
            "tampering_detected": true,
            "trust_adjustments": {"user_agent": -20},
            "server_version": "2"
        });

        let response: MatchResponse = serde_json::from_value(raw.clone()).unwrap();
        assert!(response.is_match());
        let details = response.details().unwrap();
        assert_eq!(details.comparison_table.len(), 2);
        assert!(details.comparison_table[0].matched);
        assert_eq!(details.comparison_table[1].stored_value, None);
        assert_eq!(response.noisy_probes(), vec!["canvas", "client_rects"]);
        assert_eq!(response.tampering(), Some(true));
        assert_eq!(response.trust_adjustment("user_agent"), Some(-20));
        assert_eq!(response.extra.get("server_version"), Some(&json!("2")));
        assert_eq!(serde_json::to_value(&response).unwrap(), raw);
    }

    #[test]
    fn explicit_nulls_survive_reencoding() {
        let raw = json!({
            "your_uuid": "visitor",
            "match_status": "MATCH_FOUND",
            "match_details": {
                "matched_uuid": "stored",
                "score": 40.0,
                "comparison_table": [
                    {"key": "webgpu_adapter", "currentValue": "x", "storedValue": null, "match": false}
                ]
            },
            "noise_report": null,
            "tampering_detected": null,
            "trust_adjustments": null
        });

        let response: MatchResponse = serde_json::from_value(raw.clone()).unwrap();
        let row = &response.details().unwrap().comparison_table[0];
        assert_eq!(row.stored_value, Some(Value::Null));
        assert_eq!(response.noise_report, Some(None));
        assert_eq!(response.tampering(), None);
        assert!(response.noisy_probes().is_empty());
        assert_eq!(serde_json::to_value(&response).unwrap(), raw);

        let null_details = json!({
            "your_uuid": "visitor",
            "match_status": "NEW_USER",
            "match_details": null
        });
        let response: MatchResponse = serde_json::from_value(null_details.clone()).unwrap();
        assert_eq!(response.match_details, Some(None));
        assert!(response.details().is_none());
        assert_eq!(serde_json::to_value(&response).unwrap(), null_details);
    }
}
