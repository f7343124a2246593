//! Remote license validation client.
//!
//! Translates a license key + calling domain into a verdict by POSTing to the
//! validation authority. Stateless: a single bounded-timeout request, no
//! internal retries. Retry and fallback policy live in the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{LicenseStatus, Verdict, VerdictSource};

/// Default hard timeout for a validation call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How a validation attempt failed. The orchestrator treats every class as
/// non-fatal; the split exists for logging and for persisting `Rejected` as a
/// `status = error` record.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Timeout, DNS failure, connection refused, TLS failure. The authority
    /// never saw the request (or we never saw its answer).
    #[error("license server unreachable: {0}")]
    Network(String),

    /// The authority was reachable and explicitly rejected the key.
    #[error("license rejected: {0}")]
    Rejected(String),

    /// A 2xx response that does not parse into the expected shape.
    #[error("malformed response from license server: {0}")]
    Malformed(String),
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    license_key: &'a str,
    domain: &'a str,
}

/// Wire shape of the authority's answer.
#[derive(Debug, Deserialize)]
struct ValidateResponse {
    status: LicenseStatus,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    valid_until: Option<i64>,
    #[serde(default)]
    features: Option<serde_json::Value>,
    #[serde(default)]
    msg: Option<String>,
}

/// Error payload the authority sends alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// A license validation backend. Implemented by the HTTP client in
/// production and by call-counting fakes in tests.
#[async_trait]
pub trait LicenseValidator: Send + Sync {
    async fn validate(&self, key: &str, domain: &str) -> Result<Verdict, ValidatorError>;
}

/// HTTP client for the external validation authority.
pub struct HttpValidator {
    url: String,
    http: reqwest::Client,
}

impl HttpValidator {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ValidatorError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("license-sentry/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ValidatorError::Network(e.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            http,
        })
    }
}

#[async_trait]
impl LicenseValidator for HttpValidator {
    async fn validate(&self, key: &str, domain: &str) -> Result<Verdict, ValidatorError> {
        let body = ValidateRequest {
            license_key: key,
            domain,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ValidatorError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
                error: None,
                msg: None,
            });
            let message = error_body
                .error
                .or(error_body.msg)
                .unwrap_or_else(|| format!("request failed: {}", status));
            return Err(ValidatorError::Rejected(message));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ValidatorError::Network(e.to_string()))?;

        let parsed: ValidateResponse =
            serde_json::from_str(&text).map_err(|e| ValidatorError::Malformed(e.to_string()))?;

        // Some authorities answer 200 with an explicit rejection payload.
        if parsed.status == LicenseStatus::Error || parsed.status == LicenseStatus::Missing {
            return Err(ValidatorError::Rejected(
                parsed.msg.unwrap_or_else(|| "unknown license key".to_string()),
            ));
        }

        Ok(Verdict {
            status: parsed.status,
            company: parsed.company,
            valid_until: parsed.valid_until,
            features: parsed.features,
            msg: parsed.msg,
            source: VerdictSource::Remote,
        })
    }
}
