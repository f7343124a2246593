//! Row mapping helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::{LicenseRecord, LicenseStatus};

/// Column list matching [`LicenseRecord::from_row`]. Keep in sync.
pub const LICENSE_COLS: &str = "license_key, company, valid_until, status, features, \
     last_checked, validation_attempts, created_at, updated_at";

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on unexpected stored values.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse an optional TEXT column holding JSON.
fn parse_json(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<Option<serde_json::Value>> {
    match row.get::<_, Option<String>>(col)? {
        Some(text) => serde_json::from_str(&text).map(Some).map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                col,
                col_name.to_string(),
                rusqlite::types::Type::Text,
            )
        }),
        None => Ok(None),
    }
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

impl FromRow for LicenseRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseRecord {
            license_key: row.get(0)?,
            company: row.get(1)?,
            valid_until: row.get(2)?,
            status: parse_enum::<LicenseStatus>(row, 3, "status")?,
            features: parse_json(row, 4, "features")?,
            last_checked: row.get(5)?,
            validation_attempts: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}
