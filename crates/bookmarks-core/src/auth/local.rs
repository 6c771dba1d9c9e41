//! Local authentication
//!
//! Login codes live in the SQLite database; the signed-in session is a
//! JSON file in the data directory, written atomically.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::{AuthError, AuthProvider, Session, User};
use crate::backend::{BackendError, SqliteBackend};
use crate::config::Config;

/// [`AuthProvider`] over the local database and a session file
pub struct LocalAuth {
    backend: Arc<SqliteBackend>,
    session_path: PathBuf,
}

impl LocalAuth {
    pub fn new(backend: Arc<SqliteBackend>, session_path: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            session_path: session_path.into(),
        }
    }

    /// Use the session file from the configured data directory
    pub fn from_config(backend: Arc<SqliteBackend>, config: &Config) -> Self {
        Self::new(backend, config.session_path())
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Issue a one-time login code for an e-mail address
    pub fn issue_code(&self, email: &str, full_name: Option<&str>) -> Result<String, AuthError> {
        Ok(self.backend.issue_login_code(email, full_name)?)
    }

    /// The stored session, if its user still exists
    pub fn session(&self) -> Result<Option<Session>, AuthError> {
        let content = match fs::read_to_string(&self.session_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BackendError::ReadError {
                    path: self.session_path.clone(),
                    source: e,
                }
                .into())
            }
        };

        let session: Session = serde_json::from_str(&content).map_err(BackendError::from)?;

        if self.backend.get_user(&session.user.id)?.is_none() {
            debug!("Stored session refers to unknown user {}", session.user.id);
            return Ok(None);
        }
        Ok(Some(session))
    }

    fn save_session(&self, session: &Session) -> Result<(), AuthError> {
        let data = serde_json::to_vec_pretty(session).map_err(BackendError::from)?;
        atomic_write(&self.session_path, &data)?;
        Ok(())
    }
}

impl AuthProvider for LocalAuth {
    fn current_user(&self) -> Result<Option<User>, AuthError> {
        Ok(self.session()?.map(|session| session.user))
    }

    fn exchange_code(&self, code: &str) -> Result<Session, AuthError> {
        let user = self
            .backend
            .redeem_login_code(code)?
            .ok_or(AuthError::InvalidCode)?;

        let session = Session::new(user);
        self.save_session(&session)?;
        info!("Session started for user {}", session.user.id);
        Ok(session)
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.session_path) {
            Ok(()) => {
                info!("Signed out");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError::from_io(e, self.session_path.clone()).into()),
        }
    }
}

/// Write data atomically: temp file in the same directory, sync, rename
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), BackendError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BackendError::from_io(e, parent.to_path_buf()))?;
    }

    let temp_path = path.with_extension("tmp");
    let io_err = |e: io::Error| BackendError::from_io(e, temp_path.clone());

    let mut file = File::create(&temp_path).map_err(io_err)?;
    file.write_all(data).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;

    fs::rename(&temp_path, path).map_err(|e| BackendError::from_io(e, path.to_path_buf()))?;
    Ok(())
}
