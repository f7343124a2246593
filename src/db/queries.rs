//! License state queries.
//!
//! All functions take a plain connection so callers control pooling and
//! transactions. Writes are keyed by `license_key` with insert-or-update
//! semantics so racing revalidation attempts cannot corrupt state;
//! last-writer-wins on the timestamp and status fields.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{AppError, Result};
use crate::models::{LicenseRecord, LicenseUpdate};

use super::from_row::{query_one, LICENSE_COLS};

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// The current license: the most recently created row across all keys.
pub fn get_current_license(conn: &Connection) -> Result<Option<LicenseRecord>> {
    query_one(
        conn,
        &format!(
            "SELECT {LICENSE_COLS} FROM licenses ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ),
        &[],
    )
}

pub fn get_license_by_key(conn: &Connection, key: &str) -> Result<Option<LicenseRecord>> {
    query_one(
        conn,
        &format!("SELECT {LICENSE_COLS} FROM licenses WHERE license_key = ?1"),
        &[&key],
    )
}

/// Insert a new record for `key` or update the existing one. Always touches
/// `updated_at`; `last_checked` and `validation_attempts` come from the
/// update struct, never implicitly.
pub fn upsert_license(
    conn: &Connection,
    key: &str,
    update: &LicenseUpdate,
) -> Result<LicenseRecord> {
    let now = now();
    let features = update
        .features
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO licenses (license_key, company, valid_until, status, features,
                               last_checked, validation_attempts, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(license_key) DO UPDATE SET
             company = excluded.company,
             valid_until = excluded.valid_until,
             status = excluded.status,
             features = excluded.features,
             last_checked = excluded.last_checked,
             validation_attempts = excluded.validation_attempts,
             updated_at = excluded.updated_at",
        params![
            key,
            update.company,
            update.valid_until,
            update.status.to_string(),
            features,
            update.last_checked,
            update.validation_attempts,
            now,
        ],
    )?;

    get_license_by_key(conn, key)?
        .ok_or_else(|| AppError::Internal(format!("license {} missing after upsert", key)))
}

/// Update only the freshness timestamp. Used when a validation attempt fails
/// but the record itself should keep its status.
pub fn touch_last_checked(conn: &Connection, key: &str, when: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE licenses SET last_checked = ?2, updated_at = ?3 WHERE license_key = ?1",
        params![key, when, now()],
    )?;
    Ok(changed > 0)
}

/// Bookkeeping for a failed revalidation: bump the attempts counter and touch
/// the freshness timestamp, leaving status and expiry untouched.
pub fn record_failed_attempt(conn: &Connection, key: &str, when: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE licenses
         SET validation_attempts = validation_attempts + 1, last_checked = ?2, updated_at = ?3
         WHERE license_key = ?1",
        params![key, when, now()],
    )?;
    Ok(changed > 0)
}

/// Delete all license records (unregister).
pub fn delete_all_licenses(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM licenses", [])
        .map_err(Into::into)
}
