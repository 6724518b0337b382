//! Storage abstractions for bot persistence.
//!
//! The store owns every durable fact the bot knows about:
//!
//! ```text
//! guild_channels   server -> output channel (one per server)
//! track_urls       (server, url) pairs to scrape
//! keyword_pings    (server, user, keyword) subscriptions
//! seen_ads         (server, listing id) pairs already published
//! ```
//!
//! Everything else (the in-memory [`State`](crate::models::State)) is a
//! projection rebuilt from [`ListingStore::snapshot`] at startup.

pub mod migrations;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{ChannelId, ListingId, ServerId, UserId};

// Re-export for convenience
pub use sqlite::SqliteStore;

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of [`ListingStore::mark_seen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkSeen {
    /// `true` when this call inserted the row
    pub first_time: bool,
}

/// A single keyword subscription row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub server: ServerId,
    pub user: UserId,
    pub keyword: String,
}

/// Everything needed to rebuild the in-memory projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub bindings: Vec<(ServerId, ChannelId)>,
    /// Tracked URLs in insertion order
    pub urls: Vec<(ServerId, String)>,
    pub subscriptions: Vec<Subscription>,
}

/// Trait for persistence backends.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Bind a server's output channel, replacing any earlier binding.
    async fn bind_channel(&self, server: &ServerId, channel: &ChannelId) -> StoreResult<()>;

    /// Remove a server's binding. Returns whether a row was removed.
    async fn unbind_channel(&self, server: &ServerId) -> StoreResult<bool>;

    /// Track a URL. Fails with [`StoreError::AlreadyTracked`] on duplicates.
    async fn add_url(&self, server: &ServerId, url: &str) -> StoreResult<()>;

    /// Stop tracking a URL. Returns whether a row was removed.
    async fn remove_url(&self, server: &ServerId, url: &str) -> StoreResult<bool>;

    async fn list_urls(&self, server: &ServerId) -> StoreResult<Vec<String>>;

    /// Subscribe a user to a keyword. Duplicates are accepted silently.
    async fn add_subscription(
        &self,
        server: &ServerId,
        user: &UserId,
        keyword: &str,
    ) -> StoreResult<()>;

    /// Drop a subscription. Returns whether a row was removed.
    async fn remove_subscription(
        &self,
        server: &ServerId,
        user: &UserId,
        keyword: &str,
    ) -> StoreResult<bool>;

    async fn list_subscriptions(&self, server: &ServerId, user: &UserId)
    -> StoreResult<Vec<String>>;

    async fn subscribers_for(&self, server: &ServerId, keyword: &str) -> StoreResult<Vec<UserId>>;

    /// Atomically record a listing as seen for a server.
    ///
    /// Two concurrent calls for the same pair never both report
    /// `first_time == true`.
    async fn mark_seen(&self, server: &ServerId, listing: &ListingId) -> StoreResult<MarkSeen>;

    /// Load bindings, URLs and subscriptions.
    async fn snapshot(&self) -> StoreResult<Snapshot>;

    /// Delete seen rows first recorded before `before`. Returns rows removed.
    async fn prune_seen(&self, before: DateTime<Utc>) -> StoreResult<usize>;
}
