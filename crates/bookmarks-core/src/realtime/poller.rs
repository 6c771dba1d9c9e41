//! Snapshot polling change stream
//!
//! Fetches the owner's snapshot on an interval and turns the difference
//! between consecutive snapshots into change events. Used when writes come
//! from another process sharing the same database, where the in-process
//! feed never sees them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::subscription::{OwnerFilter, Subscription, SubscriptionSink, SubscriptionStatus};
use super::ChangeStream;
use crate::backend::{BackendError, BackendResult, BookmarkBackend};
use crate::models::{Bookmark, BookmarkId, ChangeEvent};

const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Change stream that polls a backend
pub struct SnapshotPoller<B> {
    backend: Arc<B>,
    interval: Duration,
}

impl<B> SnapshotPoller<B> {
    pub fn new(backend: Arc<B>, interval: Duration) -> Self {
        Self {
            backend,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<B> ChangeStream for SnapshotPoller<B>
where
    B: BookmarkBackend + Send + Sync + 'static,
{
    /// Takes the baseline snapshot before returning
    ///
    /// A session that loads its own snapshot after subscribing therefore
    /// never sees a write that the poller has already folded into its
    /// baseline. If the baseline fetch fails the subscription starts in
    /// `ChannelError` and the first successful poll becomes the baseline.
    fn subscribe(&self, filter: OwnerFilter) -> BackendResult<Subscription> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            BackendError::Subscription("snapshot poller requires a Tokio runtime".to_string())
        })?;

        let (subscription, sink) = Subscription::channel();
        let baseline = match self.backend.fetch_snapshot(filter.owner_id()) {
            Ok(snapshot) => {
                sink.set_status(SubscriptionStatus::Subscribed);
                Some(snapshot)
            }
            Err(e) => {
                warn!("Baseline snapshot failed: {}", e);
                sink.set_status(SubscriptionStatus::ChannelError);
                None
            }
        };

        runtime.spawn(poll(
            Arc::clone(&self.backend),
            self.interval,
            filter,
            baseline,
            sink,
        ));
        Ok(subscription)
    }
}

async fn poll<B>(
    backend: Arc<B>,
    interval: Duration,
    filter: OwnerFilter,
    mut previous: Option<Vec<Bookmark>>,
    mut sink: SubscriptionSink,
) where
    B: BookmarkBackend + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = sink.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let backend = Arc::clone(&backend);
        let owner_id = filter.owner_id().to_string();
        let fetched = tokio::task::spawn_blocking(move || backend.fetch_snapshot(&owner_id)).await;

        match fetched {
            Ok(Ok(current)) => {
                if let Some(previous) = &previous {
                    for event in diff_snapshots(previous, &current) {
                        debug!("Polled {} for {}", event.kind(), event.id());
                        if !sink.send(event) {
                            return;
                        }
                    }
                }
                previous = Some(current);
                sink.set_status(SubscriptionStatus::Subscribed);
            }
            Ok(Err(e)) => {
                warn!("Snapshot poll failed: {}", e);
                sink.set_status(SubscriptionStatus::ChannelError);
            }
            Err(e) => {
                warn!("Snapshot poll task failed: {}", e);
                sink.set_status(SubscriptionStatus::ChannelError);
            }
        }
    }

    sink.set_status(SubscriptionStatus::Closed);
}

/// Change events that turn `previous` into `current`
///
/// Deletes come first, then updates, then inserts oldest-first so that
/// prepending each one leaves the newest at the front.
pub fn diff_snapshots(previous: &[Bookmark], current: &[Bookmark]) -> Vec<ChangeEvent> {
    let before: HashMap<&BookmarkId, &Bookmark> = previous.iter().map(|b| (&b.id, b)).collect();
    let after: HashMap<&BookmarkId, &Bookmark> = current.iter().map(|b| (&b.id, b)).collect();

    let mut events = Vec::new();

    for record in previous {
        if !after.contains_key(&record.id) {
            events.push(ChangeEvent::Delete(record.id.clone()));
        }
    }

    for record in current {
        if let Some(old) = before.get(&record.id) {
            if *old != record {
                events.push(ChangeEvent::Update(record.clone()));
            }
        }
    }

    for record in current.iter().rev() {
        if !before.contains_key(&record.id) {
            events.push(ChangeEvent::Insert(record.clone()));
        }
    }

    events
}
