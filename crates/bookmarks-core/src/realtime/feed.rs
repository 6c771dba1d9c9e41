//! In-process change feed
//!
//! Broadcasts backend writes to every subscriber in the same process.
//! Each subscription gets its own forwarding task that applies the owner
//! filter and stops on cancel.

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::subscription::{OwnerFilter, Subscription, SubscriptionSink, SubscriptionStatus};
use super::ChangeStream;
use crate::backend::{BackendError, BackendResult};
use crate::models::ChangeEvent;

/// Default number of buffered events per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct FeedItem {
    owner_id: String,
    event: ChangeEvent,
}

/// Broadcast change stream for one process
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<FeedItem>,
}

impl ChangeFeed {
    /// Create a feed buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a change about one owner's bookmarks
    ///
    /// Returns the number of subscribers that will see it.
    pub fn publish(&self, owner_id: &str, event: ChangeEvent) -> usize {
        let item = FeedItem {
            owner_id: owner_id.to_string(),
            event,
        };
        self.tx.send(item).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeStream for ChangeFeed {
    fn subscribe(&self, filter: OwnerFilter) -> BackendResult<Subscription> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            BackendError::Subscription("change feed requires a Tokio runtime".to_string())
        })?;

        // Receiver exists before we report Subscribed, so nothing published
        // after this point is missed.
        let rx = self.tx.subscribe();
        let (subscription, sink) = Subscription::channel();
        sink.set_status(SubscriptionStatus::Subscribed);

        runtime.spawn(forward(rx, filter, sink));
        Ok(subscription)
    }
}

async fn forward(
    mut rx: broadcast::Receiver<FeedItem>,
    filter: OwnerFilter,
    mut sink: SubscriptionSink,
) {
    let mut lagged = false;

    loop {
        tokio::select! {
            _ = sink.cancelled() => {
                debug!("Change feed subscription for {} cancelled", filter.owner_id());
                break;
            }
            item = rx.recv() => match item {
                Ok(item) => {
                    if lagged {
                        lagged = false;
                        sink.set_status(SubscriptionStatus::Subscribed);
                    }
                    if filter.matches(&item.owner_id) && !sink.send(item.event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Change feed subscriber lagged, {} events missed", missed);
                    lagged = true;
                    sink.set_status(SubscriptionStatus::ChannelError);
                }
                Err(RecvError::Closed) => {
                    sink.set_status(SubscriptionStatus::Closed);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bookmark;
    use crate::realtime::SubscriptionUpdate;

    async fn next_event(subscription: &mut Subscription) -> Option<ChangeEvent> {
        loop {
            match subscription.next().await? {
                SubscriptionUpdate::Event(event) => return Some(event),
                SubscriptionUpdate::Status(_) => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_own_changes_only() {
        let feed = ChangeFeed::default();
        let mut subscription = feed.subscribe(OwnerFilter::new("alice")).unwrap();
        assert_eq!(subscription.status(), SubscriptionStatus::Subscribed);

        let theirs = Bookmark::new("bob", "Bob's", "https://bob.example");
        let mine = Bookmark::new("alice", "Alice's", "https://alice.example");
        feed.publish("bob", ChangeEvent::Insert(theirs));
        feed.publish("alice", ChangeEvent::Insert(mine.clone()));

        assert_eq!(
            next_event(&mut subscription).await,
            Some(ChangeEvent::Insert(mine))
        );
    }

    #[tokio::test]
    async fn test_feed_closed_ends_subscription() {
        let feed = ChangeFeed::default();
        let mut subscription = feed.subscribe(OwnerFilter::new("alice")).unwrap();
        drop(feed);

        assert_eq!(next_event(&mut subscription).await, None);
        assert_eq!(subscription.status(), SubscriptionStatus::Closed);
    }

    #[tokio::test]
    async fn test_cancel_releases_receiver() {
        let feed = ChangeFeed::default();
        let subscription = feed.subscribe(OwnerFilter::new("alice")).unwrap();
        assert_eq!(feed.subscriber_count(), 1);

        subscription.cancel();

        for _ in 0..100 {
            if feed.subscriber_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_subscribe_outside_runtime_fails() {
        let feed = ChangeFeed::default();
        let err = feed.subscribe(OwnerFilter::new("alice")).unwrap_err();
        assert!(matches!(err, BackendError::Subscription(_)));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let feed = ChangeFeed::default();
        assert_eq!(feed.publish("alice", ChangeEvent::Delete("x".into())), 0);
    }
}
