//! HTTP clients for the remote pipelines and compute APIs.
//!
//! Credential acquisition is out of scope: callers supply a bearer token in
//! the [`ServiceEndpoint`].

mod compute;
mod pipelines;

pub use compute::ComputeClient;
pub use pipelines::{Operation, OperationStatus, PipelinesClient};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{ConfigError, JobflowError, Result};

/// Default timeout for a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay between operation status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Where and how to reach a remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Base URL, e.g. `https://genomics.googleapis.com`.
    pub base_url: String,
    /// OAuth bearer token sent with every request.
    #[serde(default, skip_serializing)]
    pub bearer_token: Option<String>,
    /// Timeout for a single HTTP request.
    #[serde(default = "default_request_timeout", with = "millis")]
    pub request_timeout: Duration,
    /// Delay between operation status polls.
    #[serde(default = "default_poll_interval", with = "millis")]
    pub poll_interval: Duration,
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

impl ServiceEndpoint {
    /// Creates an endpoint with default timings and no token.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Durations stored as whole milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// The error envelope returned by the APIs.
#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Shared HTTP plumbing for the API clients.
#[derive(Debug, Clone)]
struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpClient {
    fn new(endpoint: &ServiceEndpoint) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref token) = endpoint.bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ConfigError::Invalid("invalid bearer token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("jobflow/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            timeout: endpoint.request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .timeout(self.timeout)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::extract_error(response).await)
        }
    }

    async fn extract_error(response: reqwest::Response) -> JobflowError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.error)
            .map(|error| error.message)
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| format!("HTTP {status}"));
        JobflowError::Api {
            status,
            message,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_defaults() {
        let endpoint = ServiceEndpoint::new("https://example.test/");
        assert_eq!(endpoint.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(endpoint.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(endpoint.bearer_token.is_none());
    }

    #[test]
    fn test_endpoint_from_json() {
        let endpoint: ServiceEndpoint =
            serde_json::from_str(r#"{"base_url": "http://localhost", "poll_interval": 250}"#)
                .unwrap();
        assert_eq!(endpoint.poll_interval, Duration::from_millis(250));
        assert_eq!(endpoint.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_url_joining() {
        let client = HttpClient::new(&ServiceEndpoint::new("http://localhost:1/")).unwrap();
        assert_eq!(client.url("/v2alpha1/pipelines:run"), "http://localhost:1/v2alpha1/pipelines:run");
    }

    #[test]
    fn test_bad_token_rejected() {
        let endpoint = ServiceEndpoint::new("http://localhost").with_bearer_token("bad\ntoken");
        assert!(HttpClient::new(&endpoint).is_err());
    }
}
