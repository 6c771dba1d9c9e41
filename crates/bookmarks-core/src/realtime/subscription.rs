//! Cancellable subscriptions
//!
//! A [`Subscription`] is the consumer half: an event source, a status
//! signal and a cancel handle. The producer half, [`SubscriptionSink`], is
//! owned by whatever task feeds it.
//!
//! Every status transition is queued, so a consumer that falls behind
//! still sees a brief `ChannelError` between two `Subscribed`s.

use tokio::sync::{mpsc, oneshot, watch};

use crate::models::ChangeEvent;

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Attempting to connect or join
    Connecting,
    /// Joined and receiving changes
    Subscribed,
    /// The server or feed reported an error
    ChannelError,
    /// Join or heartbeat reply did not arrive in time
    TimedOut,
    /// Delivery has stopped
    Closed,
}

impl SubscriptionStatus {
    /// Whether this status means changes may currently be missed
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::ChannelError | SubscriptionStatus::TimedOut
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubscriptionStatus::Connecting => "CONNECTING",
            SubscriptionStatus::Subscribed => "SUBSCRIBED",
            SubscriptionStatus::ChannelError => "CHANNEL_ERROR",
            SubscriptionStatus::TimedOut => "TIMED_OUT",
            SubscriptionStatus::Closed => "CLOSED",
        };
        write!(f, "{}", name)
    }
}

/// Restricts a subscription to one owner's rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerFilter {
    owner_id: String,
}

impl OwnerFilter {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn matches(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }

    /// Row filter in the realtime server's syntax, e.g. `user_id=eq.42`
    pub fn to_filter_string(&self) -> String {
        format!("user_id=eq.{}", self.owner_id)
    }
}

/// Something the subscription delivered
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionUpdate {
    Event(ChangeEvent),
    Status(SubscriptionStatus),
}

/// Stops a subscription. Consumed on use, so it fires at most once.
#[derive(Debug)]
pub struct CancelHandle {
    tx: oneshot::Sender<()>,
}

impl CancelHandle {
    pub fn cancel(self) {
        let _ = self.tx.send(());
    }
}

/// Consumer half of a subscription
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    transitions: mpsc::UnboundedReceiver<SubscriptionStatus>,
    transitions_closed: bool,
    status: watch::Receiver<SubscriptionStatus>,
    cancel: Option<CancelHandle>,
}

/// Producer half of a subscription
#[derive(Debug)]
pub struct SubscriptionSink {
    events: mpsc::UnboundedSender<ChangeEvent>,
    transitions: mpsc::UnboundedSender<SubscriptionStatus>,
    status: watch::Sender<SubscriptionStatus>,
    cancelled: oneshot::Receiver<()>,
    done: bool,
}

impl Subscription {
    /// Create a connected subscription/sink pair
    pub fn channel() -> (Subscription, SubscriptionSink) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (transition_tx, transition_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SubscriptionStatus::Connecting);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let subscription = Subscription {
            events: event_rx,
            transitions: transition_rx,
            transitions_closed: false,
            status: status_rx,
            cancel: Some(CancelHandle { tx: cancel_tx }),
        };
        let sink = SubscriptionSink {
            events: event_tx,
            transitions: transition_tx,
            status: status_tx,
            cancelled: cancel_rx,
            done: false,
        };
        (subscription, sink)
    }

    /// Latest status
    pub fn status(&self) -> SubscriptionStatus {
        *self.status.borrow()
    }

    /// Wait for the next event or status change
    ///
    /// Status changes are reported before queued events. Returns `None`
    /// once the producer has stopped and everything was drained.
    pub async fn next(&mut self) -> Option<SubscriptionUpdate> {
        loop {
            tokio::select! {
                biased;
                transition = self.transitions.recv(), if !self.transitions_closed => {
                    match transition {
                        Some(status) => return Some(SubscriptionUpdate::Status(status)),
                        None => self.transitions_closed = true,
                    }
                }
                event = self.events.recv() => {
                    return event.map(SubscriptionUpdate::Event);
                }
            }
        }
    }

    /// Take a queued event without waiting
    pub fn try_next_event(&mut self) -> Option<ChangeEvent> {
        self.events.try_recv().ok()
    }

    /// Stop delivery and release the subscription
    pub fn cancel(mut self) {
        if let Some(handle) = self.cancel.take() {
            handle.cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.cancel.take() {
            handle.cancel();
        }
    }
}

impl SubscriptionSink {
    /// Forward an event; returns false once the consumer is gone
    pub fn send(&self, event: ChangeEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Record a status; repeats of the current status are dropped
    pub fn set_status(&self, status: SubscriptionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            let _ = self.transitions.send(status);
        }
    }

    /// Whether the consumer cancelled or dropped the subscription
    pub fn is_cancelled(&mut self) -> bool {
        if !self.done {
            self.done = !matches!(
                self.cancelled.try_recv(),
                Err(oneshot::error::TryRecvError::Empty)
            );
        }
        self.done
    }

    /// Resolves when the consumer cancels or drops the subscription
    pub async fn cancelled(&mut self) {
        if self.done {
            return;
        }
        let _ = (&mut self.cancelled).await;
        self.done = true;
    }
}
