//! SQLite-backed local backend
//!
//! Stores bookmarks, users and one-time login codes in a single database
//! file. Every successful write is also published on the attached
//! [`ChangeFeed`], which plays the part of the hosted realtime service for
//! subscribers in the same process.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{BackendError, BackendResult};
use super::schema::{init_schema, needs_init};
use super::BookmarkBackend;
use crate::auth::User;
use crate::config::Config;
use crate::models::{Bookmark, BookmarkId, ChangeEvent, NewBookmark};
use crate::realtime::ChangeFeed;

/// How long an issued login code stays valid
pub const LOGIN_CODE_TTL_SECS: i64 = 600;

/// Local backend over a single SQLite database
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
}

impl SqliteBackend {
    /// Open or create the database at the configured path
    pub fn open(config: &Config) -> BackendResult<Self> {
        let path = config.database_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BackendError::from_io(e, parent.to_path_buf()))?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            init_schema(&conn)?;
            info!("Initialized bookmarks database at {:?}", path);
        }

        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> BackendResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            feed: ChangeFeed::default(),
        }
    }

    /// Publish writes on a shared feed instead of a private one
    pub fn with_feed(mut self, feed: ChangeFeed) -> Self {
        self.feed = feed;
        self
    }

    /// The feed this backend publishes its writes on
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    // ==================== Bookmarks ====================

    /// Get a bookmark by ID
    pub fn get(&self, id: &BookmarkId) -> BackendResult<Option<Bookmark>> {
        let conn = self.conn();
        let bookmark = conn
            .query_row(
                "SELECT id, title, url, user_id, created_at FROM bookmarks WHERE id = ?",
                params![id.as_str()],
                row_to_bookmark,
            )
            .optional()?;
        Ok(bookmark)
    }

    /// Count bookmarks of one owner
    pub fn count(&self, owner_id: &str) -> BackendResult<i64> {
        let conn = self.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM bookmarks WHERE user_id = ?",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Users & login codes ====================

    /// Find a user by e-mail, creating one if needed
    ///
    /// An existing user's full name is updated when a new one is given.
    pub fn ensure_user(&self, email: &str, full_name: Option<&str>) -> BackendResult<User> {
        let conn = self.conn();

        if let Some(mut user) = conn
            .query_row(
                "SELECT id, email, full_name FROM users WHERE email = ?",
                params![email],
                row_to_user,
            )
            .optional()?
        {
            if let Some(name) = full_name {
                conn.execute(
                    "UPDATE users SET full_name = ? WHERE id = ?",
                    params![name, user.id],
                )?;
                user.full_name = Some(name.to_string());
            }
            return Ok(user);
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
            full_name: full_name.map(str::to_string),
        };
        conn.execute(
            "INSERT INTO users (id, email, full_name, created_at) VALUES (?, ?, ?, ?)",
            params![user.id, email, user.full_name, Utc::now().timestamp_millis()],
        )?;
        info!("Created user {} for {}", user.id, email);
        Ok(user)
    }

    /// Get a user by ID
    pub fn get_user(&self, id: &str) -> BackendResult<Option<User>> {
        let conn = self.conn();
        let user = conn
            .query_row(
                "SELECT id, email, full_name FROM users WHERE id = ?",
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Issue a one-time login code for the user with this e-mail
    pub fn issue_login_code(&self, email: &str, full_name: Option<&str>) -> BackendResult<String> {
        let user = self.ensure_user(email, full_name)?;
        let code = Uuid::new_v4().simple().to_string();

        self.conn().execute(
            "INSERT INTO login_codes (code, user_id, issued_at) VALUES (?, ?, ?)",
            params![code, user.id, Utc::now().timestamp_millis()],
        )?;

        debug!("Issued login code for user {}", user.id);
        Ok(code)
    }

    /// Consume a login code, returning its user
    ///
    /// Returns `None` for unknown, already used or expired codes. A code can
    /// be redeemed at most once.
    pub fn redeem_login_code(&self, code: &str) -> BackendResult<Option<User>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let issued: Option<(String, i64)> = tx
            .query_row(
                "SELECT user_id, issued_at FROM login_codes WHERE code = ?",
                params![code],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((user_id, issued_at)) = issued else {
            return Ok(None);
        };

        tx.execute("DELETE FROM login_codes WHERE code = ?", params![code])?;

        let age_ms = Utc::now().timestamp_millis() - issued_at;
        let user = if age_ms > LOGIN_CODE_TTL_SECS * 1000 {
            debug!("Login code for user {} expired", user_id);
            None
        } else {
            tx.query_row(
                "SELECT id, email, full_name FROM users WHERE id = ?",
                params![user_id],
                row_to_user,
            )
            .optional()?
        };

        tx.commit()?;
        Ok(user)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BookmarkBackend for SqliteBackend {
    fn fetch_snapshot(&self, owner_id: &str) -> BackendResult<Vec<Bookmark>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, title, url, user_id, created_at FROM bookmarks
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;

        let bookmarks = stmt
            .query_map(params![owner_id], row_to_bookmark)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bookmarks)
    }

    fn insert(&self, new: &NewBookmark) -> BackendResult<Bookmark> {
        let now = Utc::now();
        // Stored with millisecond precision; keep the returned record identical
        let created_at = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);

        let bookmark = Bookmark {
            id: BookmarkId::new(),
            title: new.title.clone(),
            url: new.url.clone(),
            owner_id: new.user_id.clone(),
            created_at,
        };

        self.conn().execute(
            "INSERT INTO bookmarks (id, title, url, user_id, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                bookmark.id.as_str(),
                bookmark.title,
                bookmark.url,
                bookmark.owner_id,
                bookmark.created_at.timestamp_millis(),
            ],
        )?;

        debug!("Inserted bookmark {} for {}", bookmark.id, bookmark.owner_id);
        self.feed
            .publish(&bookmark.owner_id, ChangeEvent::Insert(bookmark.clone()));
        Ok(bookmark)
    }

    fn delete(&self, owner_id: &str, id: &BookmarkId) -> BackendResult<()> {
        let rows = self.conn().execute(
            "DELETE FROM bookmarks WHERE id = ? AND user_id = ?",
            params![id.as_str(), owner_id],
        )?;
        if rows == 0 {
            return Err(BackendError::NotFound { id: id.clone() });
        }

        debug!("Deleted bookmark {}", id);
        self.feed.publish(owner_id, ChangeEvent::Delete(id.clone()));
        Ok(())
    }
}

fn row_to_bookmark(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bookmark> {
    let id: String = row.get(0)?;
    let created_at: i64 = row.get(4)?;

    Ok(Bookmark {
        id: id.into(),
        title: row.get(1)?,
        url: row.get(2)?,
        owner_id: row.get(3)?,
        created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
    })
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
    })
}
