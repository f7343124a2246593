use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Last known validation outcome for a license.
///
/// `Missing` is synthesized when no record exists; it is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Expired,
    Error,
    Missing,
}

impl Default for LicenseStatus {
    fn default() -> Self {
        LicenseStatus::Error
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Error => "error",
            LicenseStatus::Missing => "missing",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LicenseStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LicenseStatus::Active),
            "expired" => Ok(LicenseStatus::Expired),
            "error" => Ok(LicenseStatus::Error),
            "missing" => Ok(LicenseStatus::Missing),
            _ => Err(()),
        }
    }
}

/// The persisted license row. One row per key; the "current" license is the
/// most recently created row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub license_key: String,
    /// Issued-to organization, set from the authority's response.
    pub company: Option<String>,
    /// Unix seconds; None means no expiry enforced.
    pub valid_until: Option<i64>,
    pub status: LicenseStatus,
    /// Capability flags returned by the authority (JSON object).
    pub features: Option<serde_json::Value>,
    /// When this record was last confirmed, successfully or not.
    pub last_checked: Option<i64>,
    /// Incremented on failed revalidation attempts, reset on success.
    pub validation_attempts: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl LicenseRecord {
    /// Whether `last_checked` falls within the TTL window as of `now`.
    pub fn is_fresh(&self, now: i64, ttl_secs: i64) -> bool {
        match self.last_checked {
            Some(checked) => now - checked <= ttl_secs,
            None => false,
        }
    }
}

/// Where a verdict came from, so consumers can tell a fresh authority answer
/// from cached or degraded data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    /// Fresh answer from the remote authority.
    Remote,
    /// Stored record within its TTL window; no network call made.
    Cache,
    /// Cached data served because a revalidation attempt failed.
    Degraded,
    /// Synthesized locally (missing record, evaluation error, test bypass).
    Local,
}

/// The outcome of a license check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub status: LicenseStatus,
    pub company: Option<String>,
    pub valid_until: Option<i64>,
    pub features: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    pub source: VerdictSource,
}

impl Verdict {
    pub fn missing() -> Self {
        Self {
            status: LicenseStatus::Missing,
            company: None,
            valid_until: None,
            features: None,
            msg: None,
            source: VerdictSource::Local,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            status: LicenseStatus::Error,
            company: None,
            valid_until: None,
            features: None,
            msg: Some(msg.into()),
            source: VerdictSource::Local,
        }
    }

    /// Build a verdict from a stored record.
    pub fn from_record(record: &LicenseRecord, source: VerdictSource) -> Self {
        Self {
            status: record.status,
            company: record.company.clone(),
            valid_until: record.valid_until,
            features: record.features.clone(),
            msg: None,
            source,
        }
    }

    /// A verdict authorizes the instance only if the status is active and the
    /// expiry, when set, is still in the future. An `active` status with a
    /// past `valid_until` is not valid.
    pub fn is_valid(&self, now: i64) -> bool {
        self.status == LicenseStatus::Active
            && self.valid_until.map(|until| until > now).unwrap_or(true)
    }

    /// Whether the license carries a capability flag.
    pub fn has_feature(&self, name: &str) -> bool {
        self.features
            .as_ref()
            .and_then(|f| f.get(name))
            .map(|v| v.as_bool().unwrap_or(true))
            .unwrap_or(false)
    }
}

/// Fields written on a validation outcome. `last_checked` is always set
/// explicitly by the caller, never implied.
#[derive(Debug, Clone, Default)]
pub struct LicenseUpdate {
    pub company: Option<String>,
    pub valid_until: Option<i64>,
    pub status: LicenseStatus,
    pub features: Option<serde_json::Value>,
    pub last_checked: Option<i64>,
    /// New value for the attempts counter (0 resets it after a success).
    pub validation_attempts: i64,
}

/// Body for the submit/replace license operation.
#[derive(Debug, Deserialize)]
pub struct SetLicenseRequest {
    pub license_key: String,
}

/// Status + metadata returned to the administrative surface.
#[derive(Debug, Serialize)]
pub struct LicenseStatusResponse {
    #[serde(flatten)]
    pub verdict: Verdict,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<i64>,
    pub validation_attempts: i64,
}
