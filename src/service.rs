//! The license validation orchestrator.
//!
//! [`LicenseService`] is the single decision point for "is this instance
//! licensed right now". Every trigger (request gate, daily scheduler, startup
//! check, manual recheck) funnels through [`LicenseService::check_license`];
//! only this module decides whether a remote call happens. It balances
//! freshness (a 24h TTL on stored verdicts) against resilience (serving
//! cached data when the authority is unreachable).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::db::{self, queries, DbPool};
use crate::error::{AppError, Result};
use crate::models::{
    LicenseRecord, LicenseStatus, LicenseStatusResponse, LicenseUpdate, Verdict, VerdictSource,
};
use crate::validator::{LicenseValidator, ValidatorError};

/// Message attached to verdicts served from cache after a failed
/// revalidation attempt.
const DEGRADED_MSG: &str = "using cached license data, license server unreachable";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub license: Arc<LicenseService>,
    /// Path prefixes the gate lets through without a license check.
    pub exempt_paths: Arc<Vec<String>>,
}

/// Orchestrates license checks: cache freshness, remote validation, and the
/// degrade-gracefully fallback policy.
///
/// Constructed once at startup and shared by reference; the last verdict is
/// instance state, not a global.
pub struct LicenseService {
    pool: DbPool,
    validator: Arc<dyn LicenseValidator>,
    domain: String,
    ttl_secs: i64,
    /// Process-lifetime "schema ensured" flag. An optimization only; the
    /// migration runner itself is idempotent.
    schema_ready: AtomicBool,
    /// Last verdict produced, served when the backing store is unreachable.
    last_verdict: RwLock<Option<Verdict>>,
    #[cfg(feature = "test-bypass")]
    test_mode: bool,
}

impl LicenseService {
    pub fn new(pool: DbPool, validator: Arc<dyn LicenseValidator>, config: &Config) -> Self {
        Self {
            pool,
            validator,
            domain: config.license_domain.clone(),
            ttl_secs: config.cache_ttl.as_secs() as i64,
            schema_ready: AtomicBool::new(false),
            last_verdict: RwLock::new(None),
            #[cfg(feature = "test-bypass")]
            test_mode: config.test_mode,
        }
    }

    /// Determine whether this instance is licensed right now.
    ///
    /// Never fails: storage and network problems degrade to cached data or an
    /// `error` verdict, they do not propagate.
    pub async fn check_license(&self) -> Verdict {
        self.check_inner(false).await
    }

    /// Like [`check_license`](Self::check_license) but revalidates even when
    /// the stored verdict is still fresh. Used by the manual recheck
    /// operation.
    pub async fn force_recheck(&self) -> Verdict {
        self.check_inner(true).await
    }

    async fn check_inner(&self, force: bool) -> Verdict {
        if let Err(e) = self.ensure_schema() {
            tracing::warn!("License schema check failed: {}", e);
        }

        let record = match self.load_current() {
            Ok(record) => record,
            Err(e) => {
                // Store unreachable: fall back to the last in-memory verdict
                // rather than flapping every request to `error`.
                tracing::error!("Failed to load license record: {}", e);
                return self
                    .cached_verdict()
                    .unwrap_or_else(|| Verdict::error("license state unavailable"));
            }
        };

        let Some(record) = record else {
            return self.remember(Verdict::missing());
        };

        #[cfg(feature = "test-bypass")]
        if self.test_mode {
            tracing::warn!("LICENSE_TEST_MODE active, skipping remote validation");
            return self.remember(Verdict {
                status: LicenseStatus::Active,
                company: record.company.clone(),
                valid_until: Some(queries::now() + 365 * 86_400),
                features: record.features.clone(),
                msg: Some("test mode".to_string()),
                source: VerdictSource::Local,
            });
        }

        let now = queries::now();
        let needs_revalidation = force || !record.is_fresh(now, self.ttl_secs);

        if !needs_revalidation {
            tracing::debug!(key = %record.license_key, "License verdict served from cache");
            return self.remember(Verdict::from_record(&record, VerdictSource::Cache));
        }

        match self.validator.validate(&record.license_key, &self.domain).await {
            Ok(verdict) => {
                // Persist the fresh verdict; a bookkeeping failure must not
                // discard an answer the authority already gave us.
                if let Err(e) = self.persist_verdict(&record.license_key, &verdict, now) {
                    tracing::warn!("Failed to persist license verdict: {}", e);
                }
                tracing::info!(
                    key = %record.license_key,
                    status = %verdict.status,
                    "License revalidated"
                );
                self.remember(verdict)
            }
            Err(err) => self.apply_fallback(&record, err, now),
        }
    }

    /// Fallback policy after a failed revalidation attempt.
    ///
    /// The freshness test runs against the record as it was read *before* the
    /// attempt: a failed attempt must not retroactively invalidate a cache
    /// window that was valid when the check began.
    fn apply_fallback(&self, record: &LicenseRecord, err: ValidatorError, read_at: i64) -> Verdict {
        tracing::warn!(
            key = %record.license_key,
            "License revalidation failed: {}",
            err
        );

        if let Err(e) = self.bump_failed_attempt(&record.license_key, read_at) {
            tracing::warn!("Failed to record validation attempt: {}", e);
        }

        if record.status == LicenseStatus::Active && record.is_fresh(read_at, self.ttl_secs) {
            let mut verdict = Verdict::from_record(record, VerdictSource::Degraded);
            verdict.msg = Some(DEGRADED_MSG.to_string());
            return self.remember(verdict);
        }

        self.remember(Verdict::error(err.to_string()))
    }

    /// Submit or replace the license key: validate immediately and persist.
    ///
    /// Unlike the check path, storage failures here surface to the caller so
    /// an operator is not told "saved" when nothing was.
    pub async fn set_license(&self, key: &str) -> Result<Verdict> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::BadRequest("license_key must not be empty".into()));
        }

        self.ensure_schema()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let now = queries::now();
        let verdict = match self.validator.validate(key, &self.domain).await {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::warn!(key = %key, "License submission failed validation: {}", err);
                Verdict::error(err.to_string())
            }
        };

        let conn = self.pool.get()?;
        queries::upsert_license(
            &conn,
            key,
            &LicenseUpdate {
                company: verdict.company.clone(),
                valid_until: verdict.valid_until,
                status: persistable_status(verdict.status),
                features: verdict.features.clone(),
                last_checked: Some(now),
                validation_attempts: 0,
            },
        )?;

        Ok(self.remember(verdict))
    }

    /// Remove the current license entirely (unregister).
    pub fn remove_license(&self) -> Result<usize> {
        let conn = self.pool.get()?;
        let removed = queries::delete_all_licenses(&conn)?;
        if let Ok(mut cached) = self.last_verdict.write() {
            *cached = None;
        }
        tracing::info!("License removed ({} record(s) deleted)", removed);
        Ok(removed)
    }

    /// Current status plus record metadata for the administrative surface.
    pub async fn current_status(&self) -> LicenseStatusResponse {
        let verdict = self.check_license().await;
        let record = self.load_current().unwrap_or_default();
        let valid = verdict.is_valid(queries::now());

        LicenseStatusResponse {
            valid,
            license_key: record.as_ref().map(|r| r.license_key.clone()),
            last_checked: record.as_ref().and_then(|r| r.last_checked),
            validation_attempts: record.as_ref().map(|r| r.validation_attempts).unwrap_or(0),
            verdict,
        }
    }

    /// Days until expiry for the current verdict, if an expiry is set.
    pub fn days_until_expiry(verdict: &Verdict) -> Option<i64> {
        verdict
            .valid_until
            .map(|until| (until - queries::now()).div_euclid(86_400))
    }

    fn ensure_schema(&self) -> std::result::Result<(), db::MigrationError> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        db::ensure_schema(&self.pool)?;
        self.schema_ready.store(true, Ordering::Release);
        Ok(())
    }

    fn load_current(&self) -> Result<Option<LicenseRecord>> {
        let conn = self.pool.get()?;
        queries::get_current_license(&conn)
    }

    fn persist_verdict(&self, key: &str, verdict: &Verdict, checked_at: i64) -> Result<()> {
        let conn = self.pool.get()?;
        queries::upsert_license(
            &conn,
            key,
            &LicenseUpdate {
                company: verdict.company.clone(),
                valid_until: verdict.valid_until,
                status: persistable_status(verdict.status),
                features: verdict.features.clone(),
                last_checked: Some(checked_at),
                validation_attempts: 0,
            },
        )?;
        Ok(())
    }

    fn bump_failed_attempt(&self, key: &str, when: i64) -> Result<()> {
        let conn = self.pool.get()?;
        queries::record_failed_attempt(&conn, key, when)?;
        Ok(())
    }

    fn cached_verdict(&self) -> Option<Verdict> {
        self.last_verdict.read().ok().and_then(|v| v.clone())
    }

    fn remember(&self, verdict: Verdict) -> Verdict {
        if let Ok(mut cached) = self.last_verdict.write() {
            *cached = Some(verdict.clone());
        }
        verdict
    }
}

/// `missing` is synthesized, never stored; map it to `error` if an authority
/// ever hands it back on a persisting path.
fn persistable_status(status: LicenseStatus) -> LicenseStatus {
    match status {
        LicenseStatus::Missing => LicenseStatus::Error,
        other => other,
    }
}
