//! Authentication collaborator
//!
//! Users sign in by exchanging a one-time code for a session. The callback
//! helpers here turn the outcome of that exchange into the redirect target
//! a web surface would send the browser to.

mod local;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::BackendError;

pub use local::LocalAuth;

/// Where a failed login callback sends the user
pub const AUTH_FAILED_PATH: &str = "/login?error=auth_failed";

/// Login surface path
pub const LOGIN_PATH: &str = "/login";

/// Home surface path
pub const HOME_PATH: &str = "/";

/// A signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

impl User {
    /// Full name if set, otherwise the local part of the e-mail
    pub fn display_name(&self) -> String {
        if let Some(name) = self.full_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        match self.email.as_deref() {
            Some(email) => email.split('@').next().unwrap_or(email).to_string(),
            None => self.id.clone(),
        }
    }

    /// Uppercase first letter of the e-mail, for avatars
    pub fn avatar_initial(&self) -> Option<char> {
        self.email
            .as_deref()?
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
    }
}

/// A signed-in session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Start a session for a user with a fresh access token
    pub fn new(user: User) -> Self {
        Self {
            user,
            access_token: Uuid::new_v4().simple().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Authentication failures
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not signed in")]
    NoSession,

    #[error("Missing login code")]
    MissingCode,

    #[error("Login code is invalid or expired")]
    InvalidCode,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl AuthError {
    /// Message suitable for showing inline
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::NoSession => "You must be logged in to add bookmarks",
            AuthError::MissingCode | AuthError::InvalidCode => "Authentication failed",
            AuthError::Backend(_) => "An unexpected error occurred",
        }
    }
}

/// Identity operations the session and surfaces need
pub trait AuthProvider {
    /// The signed-in user, if any
    fn current_user(&self) -> Result<Option<User>, AuthError>;

    /// Exchange a one-time login code for a session
    fn exchange_code(&self, code: &str) -> Result<Session, AuthError>;

    /// End the current session; signing out twice is not an error
    fn sign_out(&self) -> Result<(), AuthError>;
}

/// Handle the login callback and return the redirect target
///
/// A successful exchange goes to `{origin}{next}` (`next` defaults to `/`);
/// a missing code or a failed exchange goes to the login page with
/// `error=auth_failed`.
pub fn handle_callback<A>(auth: &A, origin: &str, code: Option<&str>, next: Option<&str>) -> String
where
    A: AuthProvider + ?Sized,
{
    let origin = origin.trim_end_matches('/');

    let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
        warn!("Login callback without a code");
        return format!("{}{}", origin, AUTH_FAILED_PATH);
    };

    match auth.exchange_code(code) {
        Ok(session) => {
            info!("Signed in user {}", session.user.id);
            format!("{}{}", origin, safe_next(next))
        }
        Err(e) => {
            warn!("Login code exchange failed: {}", e);
            format!("{}{}", origin, AUTH_FAILED_PATH)
        }
    }
}

/// Redirect for the login surface: home when someone is already signed in
pub fn login_redirect(user: Option<&User>) -> Option<&'static str> {
    user.map(|_| HOME_PATH)
}

/// Redirect for the home surface: login when nobody is signed in
pub fn home_redirect(user: Option<&User>) -> Option<&'static str> {
    match user {
        Some(_) => None,
        None => Some(LOGIN_PATH),
    }
}

/// The signed-in user, or [`AuthError::NoSession`]
pub fn require_user<A>(auth: &A) -> Result<User, AuthError>
where
    A: AuthProvider + ?Sized,
{
    auth.current_user()?.ok_or(AuthError::NoSession)
}

/// Only same-origin absolute paths are followed
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => HOME_PATH,
    }
}
