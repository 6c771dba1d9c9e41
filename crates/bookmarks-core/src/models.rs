//! Data models for Bookmarks
//!
//! Field names follow the persisted `bookmarks` table
//! (`id`, `title`, `url`, `user_id`, `created_at`) so records read from
//! SQLite and records decoded from realtime payloads share one shape.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque bookmark identifier, assigned by the backend at creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkId(String);

impl BookmarkId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BookmarkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BookmarkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BookmarkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A saved bookmark
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bookmark {
    /// Unique identifier
    pub id: BookmarkId,
    /// Display title
    pub title: String,
    /// Absolute URL
    pub url: String,
    /// Owning user
    #[serde(rename = "user_id")]
    pub owner_id: String,
    /// When this bookmark was created (sole sort key)
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    /// Create a bookmark with a fresh ID, stamped now
    pub fn new(
        owner_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::with_id(BookmarkId::new(), owner_id, title, url)
    }

    /// Create a bookmark with a specific ID (for loading from storage)
    pub fn with_id(
        id: BookmarkId,
        owner_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
            owner_id: owner_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Host of the URL without a leading `www.`
    ///
    /// Falls back to the raw URL when it cannot be parsed.
    pub fn domain(&self) -> String {
        match Url::parse(&self.url) {
            Ok(url) => match url.host_str() {
                Some(host) => host.strip_prefix("www.").unwrap_or(host).to_string(),
                None => self.url.clone(),
            },
            Err(_) => self.url.clone(),
        }
    }

    /// Creation date as shown in lists, e.g. `Jan 5, 2025`
    pub fn created_label(&self) -> String {
        self.created_at.format("%b %-d, %Y").to_string()
    }
}

/// Fields supplied when inserting a bookmark
///
/// The backend assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

impl NewBookmark {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            user_id: user_id.into(),
        }
    }
}

/// Kind of a change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

/// A change to one user's bookmarks, as delivered by a change stream
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(Bookmark),
    Update(Bookmark),
    Delete(BookmarkId),
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Insert(_) => ChangeKind::Insert,
            ChangeEvent::Update(_) => ChangeKind::Update,
            ChangeEvent::Delete(_) => ChangeKind::Delete,
        }
    }

    /// ID of the bookmark this event is about
    pub fn id(&self) -> &BookmarkId {
        match self {
            ChangeEvent::Insert(b) | ChangeEvent::Update(b) => &b.id,
            ChangeEvent::Delete(id) => id,
        }
    }

    /// Owner of the record, when the event carries one
    ///
    /// Delete events only carry the ID.
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            ChangeEvent::Insert(b) | ChangeEvent::Update(b) => Some(&b.owner_id),
            ChangeEvent::Delete(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_change_event_accessors() {
        let bookmark = Bookmark::new("user-1", "Ex", "https://ex.com");
        let insert = ChangeEvent::Insert(bookmark.clone());
        assert_eq!(insert.kind(), ChangeKind::Insert);
        assert_eq!(insert.id(), &bookmark.id);
        assert_eq!(insert.owner_id(), Some("user-1"));

        let delete = ChangeEvent::Delete(bookmark.id.clone());
        assert_eq!(delete.kind(), ChangeKind::Delete);
        assert_eq!(delete.owner_id(), None);
        assert_eq!(delete.kind().to_string(), "delete");
    }

    #[test]
    fn test_bookmark_new() {
        let bookmark = Bookmark::new("user-1", "Example", "https://example.com");
        assert_eq!(bookmark.owner_id, "user-1");
        assert_eq!(bookmark.title, "Example");
        assert_eq!(bookmark.url, "https://example.com");
        assert!(!bookmark.id.as_str().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(BookmarkId::new(), BookmarkId::new());
    }

    #[test]
    fn test_domain_strips_www() {
        let bookmark = Bookmark::new("u", "Rust", "https://www.rust-lang.org/learn");
        assert_eq!(bookmark.domain(), "rust-lang.org");

        let bookmark = Bookmark::new("u", "Docs", "https://docs.rs/tokio");
        assert_eq!(bookmark.domain(), "docs.rs");
    }

    #[test]
    fn test_domain_falls_back_to_raw_url() {
        let bookmark = Bookmark::new("u", "Broken", "not a url");
        assert_eq!(bookmark.domain(), "not a url");
    }

    #[test]
    fn test_created_label() {
        let mut bookmark = Bookmark::new("u", "Example", "https://example.com");
        bookmark.created_at = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();
        assert_eq!(bookmark.created_label(), "Jan 5, 2025");
    }

    #[test]
    fn test_wire_field_names() {
        let json = r#"{
            "id": "a",
            "title": "Ex",
            "url": "https://ex.com",
            "user_id": "user-1",
            "created_at": "2024-03-01T10:30:00.123456+00:00"
        }"#;
        let bookmark: Bookmark = serde_json::from_str(json).unwrap();
        assert_eq!(bookmark.id, BookmarkId::from("a"));
        assert_eq!(bookmark.owner_id, "user-1");

        let value = serde_json::to_value(&bookmark).unwrap();
        assert_eq!(value["user_id"], "user-1");
        assert!(value.get("owner_id").is_none());
    }
}
