// OpenAI-compatible HTTP plumbing shared by the embedding and generation gateways


use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::{RagError, Result};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const BACKOFF_UNIT_MS: u64 = 500;

/// Failure of a single API call after retries were exhausted
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("client error: HTTP {0}")]
    Client(u16),
    #[error("server error: HTTP {0}")]
    Server(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ApiError {
    /// Convert into the crate error, labelling timeouts with the operation that hung
    #[inline]
    pub fn into_rag_error(self, operation: &str, wrap: fn(String) -> RagError) -> RagError {
        match self {
            Self::Timeout => RagError::Timeout {
                operation: operation.to_string(),
            },
            other => wrap(format!("{} failed: {}", operation, other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    api_key: String,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff_unit: Duration,
}

impl ApiClient {
    /// Build a client from the `[api]` config section and an already resolved key
    #[inline]
    pub fn new(config: &ApiConfig, api_key: String) -> Result<Self> {
        let base_url = config.base_url()?;

        Ok(Self {
            base_url,
            api_key,
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
            retry_attempts: config.retry_attempts.max(1),
            backoff_unit: Duration::from_millis(BACKOFF_UNIT_MS),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Scale the wait between retries; tests set this to zero
    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint relative to the base URL, keeping any base path such as `/v1`
    #[inline]
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let url = format!("{}/{}", base, path.trim_start_matches('/'));
        Url::parse(&url).map_err(|e| RagError::Config(format!("Invalid endpoint {}: {}", url, e)))
    }

    /// POST a JSON body and return the response text
    #[inline]
    pub fn post_json<T: Serialize>(
        &self,
        url: &Url,
        body: &T,
    ) -> std::result::Result<String, ApiError> {
        let request_json = serde_json::to_string(body).map_err(ApiError::Encode)?;
        let authorization = format!("Bearer {}", self.api_key.trim());

        self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("Authorization", &authorization)
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn make_request_with_retry<F>(
        &self,
        mut request_fn: F,
    ) -> std::result::Result<String, ApiError>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let api_error = match &error {
                        ureq::Error::StatusCode(status) if *status == 429 || *status >= 500 => {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                            ApiError::Server(*status)
                        }
                        ureq::Error::StatusCode(status) => {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(ApiError::Client(*status));
                        }
                        ureq::Error::Timeout(_) => {
                            warn!(
                                "Request timed out, attempt {}/{}",
                                attempt, self.retry_attempts
                            );
                            ApiError::Timeout
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            ApiError::Transport(error.to_string())
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            return Err(ApiError::Transport(error.to_string()));
                        }
                    };

                    last_error = Some(api_error);

                    if attempt < self.retry_attempts {
                        let factor = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) as u32;
                        let delay = self.backoff_unit * factor;
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error
            .unwrap_or_else(|| ApiError::Transport("request failed after retries".to_string())))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
