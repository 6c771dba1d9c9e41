//! Bookmarks Core Library
//!
//! This crate provides the core functionality for Bookmarks, a personal
//! bookmark list that stays live across every open session of the same
//! user.
//!
//! # Architecture
//!
//! - **Reconciliation store**: merges the initial snapshot, the live change
//!   stream and local optimistic edits into one de-duplicated list
//! - **Collaborators**: authentication, persistence and change stream,
//!   each behind a trait and passed in explicitly
//! - **Session**: drives one store from those collaborators
//!
//! # Quick Start
//!
//! ```text
//! let backend = Arc::new(SqliteBackend::open(&config)?);
//! let auth = LocalAuth::from_config(Arc::clone(&backend), &config);
//! let user = require_user(&auth)?;
//!
//! let mut session = BookmarkSession::start(user, Arc::clone(&backend), backend.feed())?;
//! session.add("Rust", "https://www.rust-lang.org")?;
//!
//! while let Some(update) = session.next_update().await {
//!     // re-render session.bookmarks()
//! }
//! ```
//!
//! # Modules
//!
//! - `store`: reconciliation store (no I/O, cannot fail)
//! - `models`: bookmarks and change events
//! - `validation`: checks run before any backend call
//! - `auth`: users, sessions, login callback handling
//! - `backend`: persistence trait and the SQLite implementation
//! - `realtime`: change streams (in-process feed, poller, websocket client)
//! - `session`: the per-user session
//! - `config`: application configuration

pub mod auth;
pub mod backend;
pub mod config;
pub mod models;
pub mod realtime;
pub mod session;
pub mod store;
pub mod validation;

pub use auth::{AuthError, AuthProvider, LocalAuth, Session, User};
pub use backend::{BackendError, BookmarkBackend, SqliteBackend};
pub use config::Config;
pub use models::{Bookmark, BookmarkId, ChangeEvent, ChangeKind, NewBookmark};
pub use realtime::{ChangeFeed, ChangeStream, RealtimeClient, SnapshotPoller, SubscriptionStatus};
pub use session::{BookmarkSession, SessionError, SessionUpdate};
pub use store::{ReconciliationStore, Removal};
pub use validation::ValidationError;
