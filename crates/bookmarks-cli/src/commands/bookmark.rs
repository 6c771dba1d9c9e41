//! Bookmark command handlers

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use bookmarks_core::auth::home_redirect;
use bookmarks_core::{AuthProvider, Bookmark, BookmarkSession, LocalAuth, SqliteBackend};

use super::session_error;
use crate::output::{short_id, Output};
use crate::prompt::confirm;

type Session = BookmarkSession<Arc<SqliteBackend>>;

fn open_session(auth: &LocalAuth, backend: Arc<SqliteBackend>) -> Result<Session> {
    BookmarkSession::for_current_user(auth, backend).map_err(session_error)
}

/// Like [`open_session`], but for read-only surfaces
fn open_home(auth: &LocalAuth, backend: Arc<SqliteBackend>) -> Result<Session> {
    let user = auth.current_user().context("Failed to read session")?;
    if home_redirect(user.as_ref()).is_some() {
        bail!("Not signed in. Run `bookmarks login code <email>` to get a login code.");
    }
    open_session(auth, backend)
}

/// List bookmarks, newest first
pub fn list(auth: &LocalAuth, backend: Arc<SqliteBackend>, output: &Output) -> Result<()> {
    let session = open_home(auth, backend)?;
    output.print_bookmarks(session.bookmarks());
    session.close();
    Ok(())
}

/// Add a bookmark
pub fn add(
    auth: &LocalAuth,
    backend: Arc<SqliteBackend>,
    title: &str,
    url: &str,
    output: &Output,
) -> Result<()> {
    let mut session = open_session(auth, backend)?;
    let bookmark = session.add(title, url).map_err(session_error)?;

    if output.is_json() {
        output.print_bookmark(&bookmark);
    } else if output.is_quiet() {
        println!("{}", bookmark.id);
    } else {
        output.success(&format!(
            "Added bookmark: {} ({})",
            bookmark.title,
            short_id(bookmark.id.as_str())
        ));
    }
    Ok(())
}

/// Delete a bookmark by ID or unique ID prefix
pub fn delete(
    auth: &LocalAuth,
    backend: Arc<SqliteBackend>,
    id: &str,
    output: &Output,
) -> Result<()> {
    let mut session = open_home(auth, backend)?;
    let bookmark = find_bookmark(session.bookmarks(), id)?.clone();

    // Confirm deletion
    if output.should_prompt() {
        println!(
            "Delete bookmark: {} - {}",
            short_id(bookmark.id.as_str()),
            bookmark.title
        );
        if !confirm("Are you sure you want to delete this bookmark?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    session.delete(&bookmark.id).map_err(session_error)?;

    output.success(&format!("Deleted bookmark: {}", bookmark.title));
    Ok(())
}

/// Find a bookmark by full ID or unique prefix
pub fn find_bookmark<'a>(bookmarks: &'a [Bookmark], id: &str) -> Result<&'a Bookmark> {
    let id = id.trim();
    if id.is_empty() {
        bail!("Bookmark ID is required");
    }

    if let Some(exact) = bookmarks.iter().find(|b| b.id.as_str() == id) {
        return Ok(exact);
    }

    let matches: Vec<_> = bookmarks
        .iter()
        .filter(|b| b.id.as_str().starts_with(id))
        .collect();

    match matches.as_slice() {
        [] => bail!("No bookmark found matching: {}", id),
        [only] => Ok(only),
        _ => bail!(
            "Ambiguous ID prefix '{}' matches {} bookmarks. Use more characters.",
            id,
            matches.len()
        ),
    }
}
