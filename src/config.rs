use std::env;
use std::time::Duration;

/// Built-in paths the license gate never blocks. License administration and
/// auth must stay reachable so an operator can fix a lapsed license.
pub const DEFAULT_EXEMPT_PATHS: &[&str] = &["/health", "/license", "/auth"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Remote validation authority endpoint.
    pub license_server_url: String,
    /// Domain reported to the authority alongside the key.
    pub license_domain: String,
    /// Hard timeout for a single validation call.
    pub validation_timeout: Duration,
    /// Maximum age of a stored verdict before revalidation.
    pub cache_ttl: Duration,
    /// Local hour (0-23) of the daily scheduled check.
    pub check_hour: u32,
    /// Emit an expiry warning when this many days (or fewer) remain.
    pub expiry_warn_days: i64,
    /// Extra gate-exempt path prefixes, in addition to the built-ins.
    pub extra_exempt_paths: Vec<String>,
    pub dev_mode: bool,
    /// Skip remote validation entirely. Only honored when the crate is built
    /// with the `test-bypass` feature; the field does not exist otherwise.
    #[cfg(feature = "test-bypass")]
    pub test_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("LICENSE_SENTRY_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let timeout_ms: u64 = env::var("LICENSE_VALIDATION_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10_000);

        let ttl_hours: u64 = env::var("LICENSE_CACHE_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);

        let check_hour: u32 = env::var("LICENSE_CHECK_HOUR")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|h| *h < 24)
            .unwrap_or(6);

        let expiry_warn_days: i64 = env::var("LICENSE_EXPIRY_WARN_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let extra_exempt_paths = env::var("LICENSE_EXEMPT_PATHS")
            .map(|v| {
                v.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "license_sentry.db".to_string()),
            license_server_url: env::var("LICENSE_SERVER_URL")
                .unwrap_or_else(|_| "https://licensing.example.com/api/validate".to_string()),
            license_domain: env::var("LICENSE_DOMAIN")
                .unwrap_or_else(|_| "localhost".to_string()),
            validation_timeout: Duration::from_millis(timeout_ms),
            cache_ttl: Duration::from_secs(ttl_hours * 3600),
            check_hour,
            expiry_warn_days,
            extra_exempt_paths,
            dev_mode,
            #[cfg(feature = "test-bypass")]
            test_mode: env::var("LICENSE_TEST_MODE")
                .map(|v| v == "1" || v == "true")
                .unwrap_or(false),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// All gate-exempt path prefixes: built-ins plus configured extras.
    pub fn exempt_paths(&self) -> Vec<String> {
        DEFAULT_EXEMPT_PATHS
            .iter()
            .map(|p| p.to_string())
            .chain(self.extra_exempt_paths.iter().cloned())
            .collect()
    }
}
