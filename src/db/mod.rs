mod from_row;
pub mod migrations;
pub mod queries;

pub use migrations::{run_migrations, MigrationError};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}

/// Bring the schema up to date. Safe to call on every process start and
/// before any write; pending migrations are applied once, applied versions
/// are verified against the ledger and skipped.
pub fn ensure_schema(pool: &DbPool) -> Result<(), MigrationError> {
    let mut conn = pool.get()?;
    migrations::run_migrations(&mut conn)
}
