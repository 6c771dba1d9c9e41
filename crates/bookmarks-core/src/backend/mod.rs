//! Persistence collaborator
//!
//! The session talks to persistence only through [`BookmarkBackend`].
//! [`SqliteBackend`] is the local implementation: a single SQLite file
//! holding the `bookmarks`, `users` and `login_codes` tables, publishing
//! every write on an in-process [`ChangeFeed`](crate::realtime::ChangeFeed).

mod error;
pub mod schema;
mod sqlite;

use std::sync::Arc;

pub use error::{BackendError, BackendResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::{SqliteBackend, LOGIN_CODE_TTL_SECS};

use crate::models::{Bookmark, BookmarkId, NewBookmark};

/// Persistence operations the session needs
pub trait BookmarkBackend {
    /// All bookmarks of one owner, newest first
    fn fetch_snapshot(&self, owner_id: &str) -> BackendResult<Vec<Bookmark>>;

    /// Store a validated bookmark; the backend assigns `id` and `created_at`
    fn insert(&self, bookmark: &NewBookmark) -> BackendResult<Bookmark>;

    /// Delete one of the owner's bookmarks
    ///
    /// A bookmark that does not exist or belongs to someone else is
    /// `NotFound`, and nothing is deleted.
    fn delete(&self, owner_id: &str, id: &BookmarkId) -> BackendResult<()>;
}

impl<T: BookmarkBackend + ?Sized> BookmarkBackend for Arc<T> {
    fn fetch_snapshot(&self, owner_id: &str) -> BackendResult<Vec<Bookmark>> {
        (**self).fetch_snapshot(owner_id)
    }

    fn insert(&self, bookmark: &NewBookmark) -> BackendResult<Bookmark> {
        (**self).insert(bookmark)
    }

    fn delete(&self, owner_id: &str, id: &BookmarkId) -> BackendResult<()> {
        (**self).delete(owner_id, id)
    }
}

impl<T: BookmarkBackend + ?Sized> BookmarkBackend for &T {
    fn fetch_snapshot(&self, owner_id: &str) -> BackendResult<Vec<Bookmark>> {
        (**self).fetch_snapshot(owner_id)
    }

    fn insert(&self, bookmark: &NewBookmark) -> BackendResult<Bookmark> {
        (**self).insert(bookmark)
    }

    fn delete(&self, owner_id: &str, id: &BookmarkId) -> BackendResult<()> {
        (**self).delete(owner_id, id)
    }
}
