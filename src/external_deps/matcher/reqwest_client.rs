//! Reqwest-based implementation of the `MatchTransport` trait.
//!
//! Thin adapter around `reqwest::Client` converting between the `http` types
//! used at the matcher boundary and the concrete transport.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap as HttpHeaderMap;
use reqwest::{Client, header::HeaderMap};
use url::Url;

use super::{MatchTransport, TransportError, TransportResponse};

/// Reqwest-backed transport used for the matcher exchange.
pub struct ReqwestMatchTransport {
    client: Client,
}

impl ReqwestMatchTransport {
    /// Creates a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MatchTransport for ReqwestMatchTransport {
    async fn post(
        &self,
        url: &Url,
        headers: &HttpHeaderMap,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(url.as_str())
            .headers(convert_headers(headers)?)
            .body(body)
            .send()
            .await
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        Ok(TransportResponse { status, body })
    }
}

fn convert_headers(headers: &HttpHeaderMap) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers.iter() {
        let name = reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        let value = reqwest::header::HeaderValue::from_bytes(value.as_bytes())
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        map.insert(name, value);
    }
    Ok(map)
}
