//! Command handlers

pub mod auth;
pub mod bookmark;
pub mod config;
pub mod status;
pub mod watch;

use bookmarks_core::SessionError;

/// Turn a session error into a CLI error led by its user-facing message
pub fn session_error(error: SessionError) -> anyhow::Error {
    let message = error.user_message();
    anyhow::Error::new(error).context(message)
}
