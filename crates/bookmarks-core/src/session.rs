//! Bookmark session
//!
//! Wires the collaborators to a [`ReconciliationStore`] for one signed-in
//! user: load the snapshot, follow the change stream, add bookmarks and
//! delete them optimistically with rollback.
//!
//! The session is the only writer of its store. Backend calls are
//! synchronous; only waiting for the next change is async.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::auth::{require_user, AuthError, AuthProvider, User};
use crate::backend::{BackendError, BookmarkBackend};
use crate::models::{Bookmark, BookmarkId, ChangeKind};
use crate::realtime::{ChangeStream, OwnerFilter, Subscription, SubscriptionStatus, SubscriptionUpdate};
use crate::store::ReconciliationStore;
use crate::validation::{validate_new_bookmark, ValidationError};

/// Errors from session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Failed to load bookmarks: {0}")]
    Load(#[source] BackendError),

    #[error("Failed to add bookmark: {0}")]
    Insert(#[source] BackendError),

    #[error("Failed to delete bookmark: {0}")]
    Delete(#[source] BackendError),
}

impl SessionError {
    /// Transient message for the user
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::Validation(e) => e.user_message(),
            SessionError::Auth(e) => e.user_message(),
            SessionError::Load(_) => "Failed to load bookmarks",
            SessionError::Insert(_) => "Failed to add bookmark. Please try again.",
            SessionError::Delete(_) => "Failed to delete bookmark",
        }
    }
}

/// Something that happened to the session while following changes
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A change event was applied; `changed` is false for echoes and no-ops
    Applied {
        kind: ChangeKind,
        id: BookmarkId,
        changed: bool,
    },
    /// The subscription status changed
    Status(SubscriptionStatus),
}

/// One user's live bookmark list
pub struct BookmarkSession<B: BookmarkBackend> {
    user: User,
    backend: B,
    store: ReconciliationStore,
    subscription: Option<Subscription>,
    status: Option<SubscriptionStatus>,
}

impl<B: BookmarkBackend> BookmarkSession<B> {
    /// Load the user's snapshot without following changes
    pub fn open(user: User, backend: B) -> Result<Self, SessionError> {
        let mut store = ReconciliationStore::new(user.id.clone());
        let snapshot = backend.fetch_snapshot(&user.id).map_err(SessionError::Load)?;
        store.initialize(snapshot);

        info!("Loaded {} bookmarks for user {}", store.len(), user.id);

        Ok(Self {
            user,
            backend,
            store,
            subscription: None,
            status: None,
        })
    }

    /// Open a session for whoever is signed in
    pub fn for_current_user<A>(auth: &A, backend: B) -> Result<Self, SessionError>
    where
        A: AuthProvider + ?Sized,
    {
        let user = require_user(auth)?;
        Self::open(user, backend)
    }

    /// Subscribe, then load the snapshot
    ///
    /// Changes made while the snapshot loads are queued on the
    /// subscription and applied afterwards. A failed subscribe is logged
    /// and reported as `ChannelError`; the session stays usable without
    /// live updates.
    pub fn start<S>(user: User, backend: B, stream: &S) -> Result<Self, SessionError>
    where
        S: ChangeStream + ?Sized,
    {
        let subscription = subscribe(stream, &user);
        let mut session = Self::open(user, backend)?;
        session.status = Some(match &subscription {
            Some(subscription) => subscription.status(),
            None => SubscriptionStatus::ChannelError,
        });
        session.subscription = subscription;
        Ok(session)
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Current list, newest first
    pub fn bookmarks(&self) -> &[Bookmark] {
        self.store.snapshot()
    }

    /// Subscription status, `None` when not following changes
    pub fn status(&self) -> Option<SubscriptionStatus> {
        self.status
    }

    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    /// Validate and add a bookmark
    ///
    /// Nothing is sent to the backend when validation fails. The created
    /// record is applied right away; its echo from the change stream is
    /// absorbed by the store.
    pub fn add(&mut self, title: &str, url: &str) -> Result<Bookmark, SessionError> {
        let new = validate_new_bookmark(&self.user.id, title, url)?;

        let created = self.backend.insert(&new).map_err(|e| {
            error!("Failed to add bookmark: {}", e);
            SessionError::Insert(e)
        })?;

        self.store.apply_insert(created.clone());
        Ok(created)
    }

    /// Delete optimistically, restoring the record if the backend fails
    ///
    /// The backend only deletes bookmarks owned by this session's user.
    pub fn delete(&mut self, id: &BookmarkId) -> Result<(), SessionError> {
        let removal = self.store.local_delete(id);

        if let Err(e) = self.backend.delete(&self.user.id, id) {
            error!("Failed to delete bookmark {}: {}", id, e);
            if let Some(removal) = removal {
                self.store.restore(removal);
            }
            return Err(SessionError::Delete(e));
        }

        debug!("Deleted bookmark {}", id);
        Ok(())
    }

    /// Re-fetch the snapshot and replace the list with it
    pub fn resync(&mut self) -> Result<(), SessionError> {
        let snapshot = self
            .backend
            .fetch_snapshot(&self.user.id)
            .map_err(SessionError::Load)?;
        self.store.initialize(snapshot);
        info!("Resynced {} bookmarks", self.store.len());
        Ok(())
    }

    /// Apply every change already queued, without waiting
    pub fn apply_pending(&mut self) -> usize {
        let Some(subscription) = self.subscription.as_mut() else {
            return 0;
        };

        let mut applied = 0;
        while let Some(event) = subscription.try_next_event() {
            if self.store.apply(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next change or status update and apply it
    ///
    /// Returns `None` when not subscribed or once the stream has ended.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let update = self.subscription.as_mut()?.next().await;

        match update {
            Some(SubscriptionUpdate::Event(event)) => {
                let kind = event.kind();
                let id = event.id().clone();
                let changed = self.store.apply(event);
                debug!("Applied {} {} (changed: {})", kind, id, changed);
                Some(SessionUpdate::Applied { kind, id, changed })
            }
            Some(SubscriptionUpdate::Status(status)) => {
                if status.is_failure() {
                    warn!("Bookmark subscription status: {}", status);
                } else {
                    info!("Bookmark subscription status: {}", status);
                }
                self.status = Some(status);
                Some(SessionUpdate::Status(status))
            }
            None => {
                self.subscription = None;
                self.status = Some(SubscriptionStatus::Closed);
                None
            }
        }
    }

    /// Stop following changes and end the session
    pub fn close(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
            debug!("Session for {} closed", self.user.id);
        }
    }
}

fn subscribe<S>(stream: &S, user: &User) -> Option<Subscription>
where
    S: ChangeStream + ?Sized,
{
    match stream.subscribe(OwnerFilter::new(user.id.clone())) {
        Ok(subscription) => Some(subscription),
        Err(e) => {
            error!("Failed to subscribe to bookmark changes: {}", e);
            None
        }
    }
}
