//! User repository for CRUD operations

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};

use super::DbPool;
use super::models::Entity;
use crate::{Error, Result};

/// A user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for User {
    const TABLE: &'static str = "users";
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            created_at: parse_datetime(&row.get::<_, String>(2)?),
        })
    }
}

/// User repository
#[derive(Clone)]
pub struct UserRepo {
    pool: DbPool,
}

impl UserRepo {
    /// Create a new user repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<super::DbConn> {
        self.pool.get().map_err(|e| Error::Database(e.to_string()))
    }

    /// Create a user
    ///
    /// # Errors
    ///
    /// Returns error if the username is taken or the insert fails
    pub fn create(&self, username: &str) -> Result<User> {
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO users (username, created_at) VALUES (?1, ?2)",
            [username, &now.to_rfc3339()],
        )?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            created_at: now,
        })
    }

    /// Find a user by username
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, username, created_at FROM users WHERE username = ?1",
                [username],
                User::from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// List all users, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, username, created_at FROM users ORDER BY id")?;
        let users = stmt
            .query_map([], User::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Change a user's username, returning true if the user existed
    ///
    /// # Errors
    ///
    /// Returns error if the new username is taken or the update fails
    pub fn rename(&self, id: i64, username: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET username = ?1 WHERE id = ?2",
            rusqlite::params![username, id],
        )?;
        Ok(changed > 0)
    }

    /// Delete a user, returning true if the user existed
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}
