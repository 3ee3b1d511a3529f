//! Database collaborator: pooled `SQLite` connections, schema and models

pub mod models;
mod schema;
pub mod user;

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::{Error, Result};

pub use models::{Entity, ModelRegistry};
pub use schema::SCHEMA_VERSION;
pub use user::{User, UserRepo};

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Longest a caller waits for a pooled connection
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the database
///
/// # Errors
///
/// Returns error if database cannot be opened or initialized
pub fn init<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::builder()
        .max_size(4)
        .connection_timeout(CONNECTION_TIMEOUT)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    schema::init(&conn)?;

    tracing::info!(version = SCHEMA_VERSION, "database initialized");
    Ok(pool)
}

/// Initialize an in-memory database
///
/// # Errors
///
/// Returns error if database cannot be initialized
pub fn init_memory() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .connection_timeout(CONNECTION_TIMEOUT)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    schema::init(&conn)?;

    Ok(pool)
}

/// Apply the schema to a scratch in-memory database
///
/// # Errors
///
/// Returns error if any migration fails
pub fn self_check() -> Result<()> {
    let conn = Connection::open_in_memory()?;
    schema::init(&conn)
}

/// Count the rows of `table`
///
/// # Errors
///
/// Returns error if the table does not exist or cannot be read
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM \"{}\"", table.replace('"', "\"\""));
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}
