//! Change-stream collaborator
//!
//! A change stream delivers insert/update/delete notifications about one
//! owner's bookmarks. Delivery is at-least-once with no ordering guarantee
//! relative to local actions; the reconciliation store makes that safe.
//!
//! ## Implementations
//!
//! - [`ChangeFeed`]: in-process broadcast fed by [`SqliteBackend`] writes
//! - [`SnapshotPoller`]: diffs periodic snapshots, for changes made by
//!   other processes against the same database
//! - [`RealtimeClient`]: websocket client for a hosted realtime server
//!   speaking Phoenix-channel JSON frames
//!
//! ## Usage
//!
//! ```ignore
//! let mut subscription = stream.subscribe(OwnerFilter::new(&user.id))?;
//! while let Some(update) = subscription.next().await {
//!     // ...
//! }
//! subscription.cancel();
//! ```
//!
//! [`SqliteBackend`]: crate::backend::SqliteBackend

mod client;
mod feed;
mod message;
mod poller;
mod subscription;

pub use client::RealtimeClient;
pub use feed::ChangeFeed;
pub use message::{ChannelMessage, ServerEvent, BOOKMARKS_TOPIC};
pub use poller::{diff_snapshots, SnapshotPoller};
pub use subscription::{
    CancelHandle, OwnerFilter, Subscription, SubscriptionSink, SubscriptionStatus,
    SubscriptionUpdate,
};

use crate::backend::BackendResult;

/// Source of live change notifications
pub trait ChangeStream {
    /// Start delivering changes that match the filter
    ///
    /// Must be called from within a Tokio runtime. The returned
    /// subscription stops delivery when cancelled or dropped.
    fn subscribe(&self, filter: OwnerFilter) -> BackendResult<Subscription>;
}
