//! Live bookmark list

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use bookmarks_core::auth::require_user;
use bookmarks_core::{
    BookmarkBackend, BookmarkSession, ChangeStream, Config, LocalAuth, RealtimeClient,
    SessionError, SessionUpdate, SnapshotPoller, SqliteBackend, SubscriptionStatus,
};

use super::session_error;
use crate::output::{Output, OutputFormat};
use crate::prompt;

/// How often the poller re-reads the database when no realtime server is set
const POLL_INTERVAL: Duration = Duration::from_secs(2);

type Session = BookmarkSession<Arc<SqliteBackend>>;

/// What a status change meant for the list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusAction {
    /// Nothing to do
    None,
    /// Live updates stopped; changes may be missed until reconnect
    Interrupted,
    /// Reconnected after an interruption and re-fetched the list
    Resynced,
}

/// Re-fetches the list once a subscription recovers from a failure
#[derive(Debug, Default)]
struct Recovery {
    degraded: bool,
}

impl Recovery {
    /// React to a status reported by the session
    ///
    /// A failed resync leaves the list degraded so the next `Subscribed`
    /// tries again.
    fn on_status<B: BookmarkBackend>(
        &mut self,
        session: &mut BookmarkSession<B>,
        status: SubscriptionStatus,
    ) -> Result<StatusAction, SessionError> {
        if status.is_failure() {
            self.degraded = true;
            return Ok(StatusAction::Interrupted);
        }
        if status == SubscriptionStatus::Subscribed && self.degraded {
            session.resync()?;
            self.degraded = false;
            return Ok(StatusAction::Resynced);
        }
        Ok(StatusAction::None)
    }
}

/// Pick the change stream for this configuration
fn change_stream(
    auth: &LocalAuth,
    backend: &Arc<SqliteBackend>,
    config: &Config,
) -> Result<Box<dyn ChangeStream>> {
    match config.active_realtime_url() {
        Some(url) => {
            let mut client = RealtimeClient::new(url).with_heartbeat(config.heartbeat());
            if let Some(api_key) = &config.api_key {
                client = client.with_api_key(api_key.clone());
            }
            if let Some(session) = auth.session().context("Failed to read session")? {
                client = client.with_access_token(session.access_token);
            }
            info!("Watching bookmarks via realtime server {}", url);
            Ok(Box::new(client))
        }
        None => {
            info!("Watching bookmarks by polling every {:?}", POLL_INTERVAL);
            Ok(Box::new(SnapshotPoller::new(backend.clone(), POLL_INTERVAL)))
        }
    }
}

/// Follow the bookmark list until interrupted
pub async fn run(
    auth: &LocalAuth,
    backend: Arc<SqliteBackend>,
    config: &Config,
    output: &Output,
) -> Result<()> {
    let user = require_user(auth).context(
        "Not signed in. Run `bookmarks login code <email>` to get a login code.",
    )?;
    let stream = change_stream(auth, &backend, config)?;
    let mut session =
        BookmarkSession::start(user, backend, stream.as_ref()).map_err(session_error)?;

    render(&session, output);

    let mut recovery = Recovery::default();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing session");
                break;
            }
            update = session.next_update() => {
                let Some(update) = update else {
                    output.warn("Live updates stopped");
                    break;
                };
                match update {
                    SessionUpdate::Applied { kind, id, changed } => {
                        if output.is_json() {
                            println!(
                                "{}",
                                serde_json::json!({
                                    "event": "change",
                                    "kind": kind.to_string(),
                                    "id": id.as_str(),
                                    "changed": changed,
                                })
                            );
                        } else if changed {
                            render(&session, output);
                        }
                    }
                    SessionUpdate::Status(status) => {
                        if output.is_json() {
                            println!(
                                "{}",
                                serde_json::json!({"event": "status", "status": status.to_string()})
                            );
                        }
                        match recovery.on_status(&mut session, status) {
                            Ok(StatusAction::None) => {}
                            Ok(StatusAction::Interrupted) => output.warn(&format!(
                                "Live updates interrupted ({}); reconnecting",
                                status
                            )),
                            Ok(StatusAction::Resynced) => render(&session, output),
                            Err(e) => {
                                error!("Resync failed: {}", e);
                                output.warn(e.user_message());
                            }
                        }
                    }
                }
            }
        }
    }

    session.close();
    Ok(())
}

fn render(session: &Session, output: &Output) {
    match output.format {
        OutputFormat::Human => {
            if prompt::is_terminal() {
                print!("\x1B[2J\x1B[H");
            }
            let status = session
                .status()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "OFFLINE".to_string());
            println!("{} [{}]", heading(session), status);
            println!();
            output.print_bookmarks(session.bookmarks());
            println!();
            println!("Press Ctrl-C to stop.");
        }
        OutputFormat::Json => output.print_bookmarks(session.bookmarks()),
        OutputFormat::Quiet => {}
    }
}

fn heading(session: &Session) -> String {
    format!("Bookmarks for {}", session.user().display_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use bookmarks_core::backend::BackendResult;
    use bookmarks_core::realtime::{OwnerFilter, Subscription, SubscriptionSink};
    use bookmarks_core::{NewBookmark, User};

    /// Change stream whose sink the test drives by hand
    #[derive(Default)]
    struct ManualStream {
        sink: Mutex<Option<SubscriptionSink>>,
    }

    impl ChangeStream for ManualStream {
        fn subscribe(&self, _filter: OwnerFilter) -> BackendResult<Subscription> {
            let (subscription, sink) = Subscription::channel();
            sink.set_status(SubscriptionStatus::Subscribed);
            *self.sink.lock().unwrap() = Some(sink);
            Ok(subscription)
        }
    }

    fn alice() -> User {
        User {
            id: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            full_name: None,
        }
    }

    async fn next_status(session: &mut Session) -> SubscriptionStatus {
        let wait = async {
            loop {
                match session.next_update().await {
                    Some(SessionUpdate::Status(status)) => return status,
                    Some(SessionUpdate::Applied { .. }) => continue,
                    None => panic!("subscription ended"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("timed out waiting for a status")
    }

    #[tokio::test]
    async fn test_reconnect_resyncs_missed_writes() {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let stream = ManualStream::default();
        let mut session = BookmarkSession::start(alice(), Arc::clone(&backend), &stream).unwrap();
        let sink = stream.sink.lock().unwrap().take().unwrap();
        let mut recovery = Recovery::default();

        let status = next_status(&mut session).await;
        assert_eq!(status, SubscriptionStatus::Subscribed);
        assert_eq!(recovery.on_status(&mut session, status).unwrap(), StatusAction::None);

        // Flips quickly; the write in between is never delivered
        sink.set_status(SubscriptionStatus::ChannelError);
        backend
            .insert(&NewBookmark::new("alice", "Missed", "https://missed.example"))
            .unwrap();
        sink.set_status(SubscriptionStatus::Subscribed);

        let status = next_status(&mut session).await;
        assert_eq!(status, SubscriptionStatus::ChannelError);
        assert_eq!(
            recovery.on_status(&mut session, status).unwrap(),
            StatusAction::Interrupted
        );
        assert!(session.bookmarks().is_empty());

        let status = next_status(&mut session).await;
        assert_eq!(status, SubscriptionStatus::Subscribed);
        assert_eq!(
            recovery.on_status(&mut session, status).unwrap(),
            StatusAction::Resynced
        );
        assert_eq!(session.bookmarks().len(), 1);
        assert_eq!(session.bookmarks()[0].title, "Missed");

        // Back to normal: another Subscribed does nothing
        assert_eq!(
            recovery
                .on_status(&mut session, SubscriptionStatus::Subscribed)
                .unwrap(),
            StatusAction::None
        );
    }

    #[tokio::test]
    async fn test_timeout_also_marks_degraded() {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let mut session = BookmarkSession::open(alice(), Arc::clone(&backend)).unwrap();
        let mut recovery = Recovery::default();

        assert_eq!(
            recovery
                .on_status(&mut session, SubscriptionStatus::TimedOut)
                .unwrap(),
            StatusAction::Interrupted
        );
        assert_eq!(
            recovery
                .on_status(&mut session, SubscriptionStatus::Connecting)
                .unwrap(),
            StatusAction::None
        );
        assert_eq!(
            recovery
                .on_status(&mut session, SubscriptionStatus::Subscribed)
                .unwrap(),
            StatusAction::Resynced
        );
    }
}
