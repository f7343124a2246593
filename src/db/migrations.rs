//! Database migration ledger.
//!
//! Migrations are embedded in the binary and run automatically on startup.
//! Each migration is a numbered SQL script applied exactly once, recorded in
//! the `schema_migrations` table together with a SHA-256 checksum of its SQL.
//! A checksum mismatch on an already-applied version aborts startup rather
//! than silently running against an unexpected schema.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A forward-only schema migration.
pub struct Migration {
    /// Version number (sequential, starting from 1).
    pub version: i64,
    /// Human-readable description (include app version for traceability).
    pub description: &'static str,
    /// The migration script. The ledger checksum is computed over this text,
    /// so applied migrations must never be edited; add a new one instead.
    pub sql: &'static str,
}

/// All migrations in order. Add new migrations to the end of this list.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "v0.1.0 licenses table",
        sql: r#"
            CREATE TABLE licenses (
                license_key TEXT PRIMARY KEY,
                company TEXT,
                valid_until INTEGER,
                status TEXT NOT NULL CHECK (status IN ('active', 'expired', 'error')),
                features TEXT,
                last_checked INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX idx_licenses_created ON licenses(created_at DESC);
        "#,
    },
    Migration {
        version: 2,
        description: "v0.2.0 track failed revalidation attempts",
        sql: r#"
            ALTER TABLE licenses ADD COLUMN validation_attempts INTEGER NOT NULL DEFAULT 0;
        "#,
    },
];

/// Migration errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(
        "Migration {version} checksum mismatch (ledger {recorded}, binary {computed}); \
         an applied migration was edited"
    )]
    ChecksumMismatch {
        version: i64,
        recorded: String,
        computed: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

fn checksum(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn ensure_ledger(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            checksum TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        );
        "#,
    )
}

fn applied_checksum(conn: &Connection, version: i64) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT checksum FROM schema_migrations WHERE version = ?1",
        params![version],
        |row| row.get(0),
    )
    .optional()
}

/// Run pending migrations.
///
/// Each migration runs in its own immediate transaction. The applied set is
/// re-checked inside the transaction, so two processes racing at startup
/// cannot apply the same version twice: the loser observes the winner's
/// ledger row and skips.
pub fn run_migrations(conn: &mut Connection) -> Result<(), MigrationError> {
    ensure_ledger(conn)?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        let expected = checksum(migration.sql);

        if let Some(recorded) = applied_checksum(conn, migration.version)? {
            if recorded != expected {
                return Err(MigrationError::ChecksumMismatch {
                    version: migration.version,
                    recorded,
                    computed: expected,
                });
            }
            continue;
        }

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Another process may have applied this version between our read and
        // taking the write lock.
        if applied_checksum(&tx, migration.version)?.is_some() {
            continue;
        }

        tracing::info!(
            "Running migration {}: {}",
            migration.version,
            migration.description
        );

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, description, checksum, applied_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                migration.version,
                migration.description,
                expected,
                chrono::Utc::now().timestamp()
            ],
        )?;
        tx.commit()?;
        applied += 1;
    }

    if applied > 0 {
        tracing::info!("{} migration(s) applied", applied);
    } else {
        tracing::debug!("Schema up to date ({} migrations)", MIGRATIONS.len());
    }

    Ok(())
}
