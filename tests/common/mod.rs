//! Test utilities and fixtures for license-sentry integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Extension;
use axum::routing::get;
use axum::Router;
use tempfile::TempDir;

pub use license_sentry::config::Config;
pub use license_sentry::db::{create_pool, ensure_schema, queries, DbPool};
pub use license_sentry::handlers::{self, admin};
pub use license_sentry::middleware::{license_gate, AuthContext, Role};
pub use license_sentry::models::*;
pub use license_sentry::service::{AppState, LicenseService};
pub use license_sentry::validator::{LicenseValidator, ValidatorError};

pub fn now() -> i64 {
    queries::now()
}

/// A config pointing at a throwaway database and an unreachable authority.
pub fn test_config(db_path: &str) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: db_path.to_string(),
        license_server_url: "http://127.0.0.1:9/validate".to_string(),
        license_domain: "test.local".to_string(),
        validation_timeout: Duration::from_millis(500),
        cache_ttl: Duration::from_secs(24 * 3600),
        check_hour: 6,
        expiry_warn_days: 30,
        extra_exempt_paths: vec![],
        dev_mode: true,
        #[cfg(feature = "test-bypass")]
        test_mode: false,
    }
}

/// What the fake authority should answer next.
#[derive(Clone)]
pub enum FakeResponse {
    Verdict(Verdict),
    Network(String),
    Rejected(String),
    Malformed(String),
}

/// Call-counting, programmable stand-in for the remote authority.
pub struct FakeValidator {
    calls: AtomicUsize,
    response: Mutex<FakeResponse>,
}

impl FakeValidator {
    pub fn with_response(response: FakeResponse) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Mutex::new(response),
        })
    }

    /// Answers `active` with an expiry `days` from now.
    pub fn active(days: i64) -> Arc<Self> {
        Self::with_response(FakeResponse::Verdict(active_verdict(days)))
    }

    pub fn unreachable() -> Arc<Self> {
        Self::with_response(FakeResponse::Network("connection refused".to_string()))
    }

    pub fn rejecting(msg: &str) -> Arc<Self> {
        Self::with_response(FakeResponse::Rejected(msg.to_string()))
    }

    pub fn set_response(&self, response: FakeResponse) {
        *self.response.lock().unwrap() = response;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LicenseValidator for FakeValidator {
    async fn validate(&self, _key: &str, _domain: &str) -> Result<Verdict, ValidatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.response.lock().unwrap().clone() {
            FakeResponse::Verdict(v) => Ok(v),
            FakeResponse::Network(msg) => Err(ValidatorError::Network(msg)),
            FakeResponse::Rejected(msg) => Err(ValidatorError::Rejected(msg)),
            FakeResponse::Malformed(msg) => Err(ValidatorError::Malformed(msg)),
        }
    }
}

pub fn active_verdict(days: i64) -> Verdict {
    Verdict {
        status: LicenseStatus::Active,
        company: Some("Acme Corp".to_string()),
        valid_until: Some(now() + days * 86_400),
        features: Some(serde_json::json!({ "reports": true })),
        msg: None,
        source: VerdictSource::Remote,
    }
}

/// Everything a service-level test needs, with the tempdir kept alive.
pub struct Harness {
    pub service: Arc<LicenseService>,
    pub pool: DbPool,
    pub validator: Arc<FakeValidator>,
    _dir: TempDir,
}

impl Harness {
    pub fn from_parts(
        service: Arc<LicenseService>,
        pool: DbPool,
        validator: Arc<FakeValidator>,
        dir: TempDir,
    ) -> Self {
        Self {
            service,
            pool,
            validator,
            _dir: dir,
        }
    }
}

pub fn setup(validator: Arc<FakeValidator>) -> Harness {
    let dir = tempfile::tempdir().expect("Failed to create tempdir");
    let db_path = dir.path().join("test.db");
    let db_path = db_path.to_str().expect("tempdir path not utf-8");

    let pool = create_pool(db_path).expect("Failed to create pool");
    ensure_schema(&pool).expect("Failed to migrate test database");

    let config = test_config(db_path);
    let service = Arc::new(LicenseService::new(
        pool.clone(),
        validator.clone(),
        &config,
    ));

    Harness {
        service,
        pool,
        validator,
        _dir: dir,
    }
}

/// Insert a license row directly, bypassing validation.
pub fn insert_license(
    pool: &DbPool,
    key: &str,
    status: LicenseStatus,
    valid_until: Option<i64>,
    last_checked: Option<i64>,
) -> LicenseRecord {
    let conn = pool.get().expect("Failed to get connection");
    queries::upsert_license(
        &conn,
        key,
        &LicenseUpdate {
            company: Some("Acme Corp".to_string()),
            valid_until,
            status,
            features: None,
            last_checked,
            validation_attempts: 0,
        },
    )
    .expect("Failed to insert test license")
}

pub fn get_record(pool: &DbPool, key: &str) -> Option<LicenseRecord> {
    let conn = pool.get().expect("Failed to get connection");
    queries::get_license_by_key(&conn, key).expect("Failed to load license")
}

/// The full administrative surface behind the gate, as main() wires it.
pub fn admin_app(harness: &Harness) -> Router {
    let state = AppState {
        db: harness.pool.clone(),
        license: harness.service.clone(),
        exempt_paths: Arc::new(vec![
            "/health".to_string(),
            "/license".to_string(),
            "/auth".to_string(),
        ]),
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/license",
            get(admin::get_license_status)
                .put(admin::set_license)
                .delete(admin::remove_license),
        )
        .route("/license/recheck", axum::routing::post(admin::recheck_license))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            license_gate,
        ))
        .with_state(state)
}

/// A router with the gate in front: one plain business route, one API route,
/// plus the exempt health and license-status endpoints.
pub fn gate_app(harness: &Harness, role: Option<Role>) -> Router {
    let state = AppState {
        db: harness.pool.clone(),
        license: harness.service.clone(),
        exempt_paths: Arc::new(vec![
            "/health".to_string(),
            "/license".to_string(),
            "/auth".to_string(),
        ]),
    };

    let mut app = Router::new()
        .route("/assets", get(|| async { "assets" }))
        .route(
            "/api/assets",
            get(|Extension(verdict): Extension<Verdict>| async move {
                verdict.company.unwrap_or_default()
            }),
        )
        .route("/health", get(handlers::health))
        .route("/license", get(admin::get_license_status))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            license_gate,
        ));

    if let Some(role) = role {
        app = app.layer(Extension(AuthContext { role }));
    }

    app.with_state(state)
}
