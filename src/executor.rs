//! Issues one HTTP request, times it, and classifies the outcome.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::models::{ErrorType, HttpMethod, RunStatus};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESPONSE_BODY_BYTES: usize = 10_000;

const DNS_ERROR_TOKENS: &[&str] = &[
    "name or service not known",
    "nodename nor servname provided",
    "dns error",
    "failed to lookup address",
];

/// One outbound firing request, built from a [`crate::models::Target`] snapshot.
#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

/// Result of one [`Executor::execute`] call, ready to fold into a [`crate::models::Run`].
#[derive(Clone, Debug)]
pub struct ExecutionOutcome {
    pub status: RunStatus,
    pub status_code: Option<i64>,
    pub latency_ms: f64,
    pub response_size_bytes: Option<i64>,
    pub error_message: Option<String>,
    pub error_type: Option<ErrorType>,
    pub response_headers: Option<String>,
    pub response_body: Option<String>,
}

/// Fires HTTP requests for the scheduler over one shared, pooled client.
pub struct Executor {
    client: Client,
}

impl Executor {
    /// Builds the shared client once. `default_timeout` is the total-request
    /// timeout; connect timeout is fixed at 10s per the classification contract.
    pub fn new(default_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(default_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(20)
            .build()?;
        Ok(Self { client })
    }

    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let start = std::time::Instant::now();

        let mut builder = self
            .client
            .request(request.method.into(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if request.method.carries_body() {
            if let Some(body) = &request.body {
                builder = match serde_json::from_str::<Value>(body) {
                    Ok(json) => builder.json(&json),
                    Err(_) => builder.body(body.clone()),
                };
            }
        }

        let result = builder.send().await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(response) => Self::classify_response(response, latency_ms).await,
            Err(err) => Self::classify_error(&err, latency_ms),
        }
    }

    async fn classify_response(response: reqwest::Response, latency_ms: f64) -> ExecutionOutcome {
        let status_code = response.status().as_u16() as i64;
        let response_headers = serde_json::to_string(
            &response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.to_string(), v.to_string()))
                })
                .collect::<HashMap<_, _>>(),
        )
        .ok();

        let bytes = response.bytes().await.unwrap_or_default();
        let response_size_bytes = Some(bytes.len() as i64);
        let body_slice: &[u8] = bytes.as_ref();
        let truncated =
            String::from_utf8_lossy(&body_slice[..body_slice.len().min(MAX_RESPONSE_BODY_BYTES)])
                .to_string();

        let (status, error_type, error_message) = match status_code {
            200..=299 => (RunStatus::Success, None, None),
            400..=499 => (
                RunStatus::Failed,
                Some(ErrorType::Http4xx),
                Some(format!("HTTP {status_code}")),
            ),
            500..=599 => (
                RunStatus::Failed,
                Some(ErrorType::Http5xx),
                Some(format!("HTTP {status_code}")),
            ),
            _ => (
                RunStatus::Failed,
                Some(ErrorType::HttpUnexpected),
                Some(format!("unexpected status {status_code}")),
            ),
        };

        ExecutionOutcome {
            status,
            status_code: Some(status_code),
            latency_ms,
            response_size_bytes,
            error_message,
            error_type,
            response_headers,
            response_body: Some(truncated),
        }
    }

    fn classify_error(err: &reqwest::Error, latency_ms: f64) -> ExecutionOutcome {
        let (status, error_type) = if err.is_timeout() {
            (RunStatus::Timeout, ErrorType::Timeout)
        } else if err.is_connect() {
            let message = format!("{err:?}").to_lowercase();
            if DNS_ERROR_TOKENS.iter().any(|token| message.contains(token)) {
                (RunStatus::DnsError, ErrorType::Dns)
            } else {
                (RunStatus::ConnectionError, ErrorType::Connection)
            }
        } else {
            (RunStatus::Failed, ErrorType::Unknown)
        };

        ExecutionOutcome {
            status,
            status_code: None,
            latency_ms,
            response_size_bytes: None,
            error_message: Some(err.to_string()),
            error_type: Some(error_type),
            response_headers: None,
            response_body: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor() -> Executor {
        Executor::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn success_status_yields_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;

        let outcome = executor()
            .execute(ExecutionRequest {
                url: format!("{}/ping", server.uri()),
                method: HttpMethod::Get,
                headers: HashMap::new(),
                body: None,
            })
            .await;

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.status_code, Some(200));
        assert!(outcome.latency_ms >= 0.0);
        assert_eq!(outcome.response_body.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn server_error_is_classified_http_5xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boom"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let outcome = executor()
            .execute(ExecutionRequest {
                url: format!("{}/boom", server.uri()),
                method: HttpMethod::Get,
                headers: HashMap::new(),
                body: None,
            })
            .await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.status_code, Some(503));
        assert_eq!(outcome.error_type, Some(ErrorType::Http5xx));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let outcome = Executor::new(Duration::from_millis(200))
            .unwrap()
            .execute(ExecutionRequest {
                url: format!("{}/slow", server.uri()),
                method: HttpMethod::Get,
                headers: HashMap::new(),
                body: None,
            })
            .await;

        assert_eq!(outcome.status, RunStatus::Timeout);
        assert_eq!(outcome.status_code, None);
        assert_eq!(outcome.error_type, Some(ErrorType::Timeout));
    }

    #[tokio::test]
    async fn connection_refused_is_classified() {
        // Port 1 is reserved and never accepts connections.
        let outcome = executor()
            .execute(ExecutionRequest {
                url: "http://127.0.0.1:1/".to_string(),
                method: HttpMethod::Get,
                headers: HashMap::new(),
                body: None,
            })
            .await;

        assert_eq!(outcome.status, RunStatus::ConnectionError);
        assert_eq!(outcome.status_code, None);
    }

    #[tokio::test]
    async fn unresolvable_host_is_classified_as_dns_error() {
        // `.invalid` is reserved by RFC 2606 and never resolves.
        let outcome = executor()
            .execute(ExecutionRequest {
                url: "http://this-host-does-not-exist.invalid/".to_string(),
                method: HttpMethod::Get,
                headers: HashMap::new(),
                body: None,
            })
            .await;

        assert_eq!(outcome.status, RunStatus::DnsError);
        assert_eq!(outcome.error_type, Some(ErrorType::Dns));
    }
}
