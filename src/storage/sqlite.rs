//! SQLite-backed [`ListingStore`].
//!
//! A single [`rusqlite::Connection`] sits behind a mutex; every call runs on
//! the blocking pool so the async runtime never waits on disk.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;
use crate::models::{ChannelId, ListingId, ServerId, UserId};
use crate::storage::{ListingStore, MarkSeen, Snapshot, StoreResult, Subscription, migrations};

/// Format written by SQLite's `CURRENT_TIMESTAMP`.
const SQLITE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Store backed by a single SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        log::info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `work` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            work(&mut guard)
        })
        .await?
    }
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn bind_channel(&self, server: &ServerId, channel: &ChannelId) -> StoreResult<()> {
        let (server, channel) = (server.to_string(), channel.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO guild_channels (guild, channel) VALUES (?1, ?2)
                 ON CONFLICT(guild) DO UPDATE SET channel = excluded.channel",
                params![server, channel],
            )?;
            Ok(())
        })
        .await
    }

    async fn unbind_channel(&self, server: &ServerId) -> StoreResult<bool> {
        let server = server.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM guild_channels WHERE guild = ?1",
                params![server],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn add_url(&self, server: &ServerId, url: &str) -> StoreResult<()> {
        let (server, url) = (server.to_string(), url.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM track_urls WHERE guild = ?1 AND url = ?2",
                    params![server, url],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(StoreError::AlreadyTracked);
            }
            tx.execute(
                "INSERT INTO track_urls (guild, url) VALUES (?1, ?2)",
                params![server, url],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn remove_url(&self, server: &ServerId, url: &str) -> StoreResult<bool> {
        let (server, url) = (server.to_string(), url.to_string());
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM track_urls WHERE guild = ?1 AND url = ?2",
                params![server, url],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list_urls(&self, server: &ServerId) -> StoreResult<Vec<String>> {
        let server = server.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT url FROM track_urls WHERE guild = ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![server], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<String>, _>>()?)
        })
        .await
    }

    async fn add_subscription(
        &self,
        server: &ServerId,
        user: &UserId,
        keyword: &str,
    ) -> StoreResult<()> {
        let (server, user, keyword) = (server.to_string(), user.to_string(), keyword.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO keyword_pings (user, guild, keyword) VALUES (?1, ?2, ?3)",
                params![user, server, keyword],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove_subscription(
        &self,
        server: &ServerId,
        user: &UserId,
        keyword: &str,
    ) -> StoreResult<bool> {
        let (server, user, keyword) = (server.to_string(), user.to_string(), keyword.to_string());
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM keyword_pings WHERE user = ?1 AND guild = ?2 AND keyword = ?3",
                params![user, server, keyword],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list_subscriptions(
        &self,
        server: &ServerId,
        user: &UserId,
    ) -> StoreResult<Vec<String>> {
        let (server, user) = (server.to_string(), user.to_string());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT keyword FROM keyword_pings WHERE guild = ?1 AND user = ?2 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![server, user], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<String>, _>>()?)
        })
        .await
    }

    async fn subscribers_for(&self, server: &ServerId, keyword: &str) -> StoreResult<Vec<UserId>> {
        let (server, keyword) = (server.to_string(), keyword.to_string());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user FROM keyword_pings WHERE guild = ?1 AND keyword = ?2 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![server, keyword], |row| {
                row.get::<_, String>(0).map(UserId::from)
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn mark_seen(&self, server: &ServerId, listing: &ListingId) -> StoreResult<MarkSeen> {
        let (server, id) = (server.to_string(), listing.value());
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO seen_ads (ad_id, guild) VALUES (?1, ?2)",
                params![id, server],
            )?;
            Ok(MarkSeen {
                first_time: inserted == 1,
            })
        })
        .await
    }

    async fn snapshot(&self) -> StoreResult<Snapshot> {
        self.with_conn(|conn| {
            let bindings = {
                let mut stmt = conn.prepare("SELECT guild, channel FROM guild_channels")?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        ServerId::from(row.get::<_, String>(0)?),
                        ChannelId::from(row.get::<_, String>(1)?),
                    ))
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let urls = {
                let mut stmt = conn.prepare("SELECT guild, url FROM track_urls ORDER BY id")?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        ServerId::from(row.get::<_, String>(0)?),
                        row.get::<_, String>(1)?,
                    ))
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let subscriptions = {
                let mut stmt =
                    conn.prepare("SELECT guild, user, keyword FROM keyword_pings ORDER BY id")?;
                let rows = stmt.query_map([], |row| {
                    Ok(Subscription {
                        server: ServerId::from(row.get::<_, String>(0)?),
                        user: UserId::from(row.get::<_, String>(1)?),
                        keyword: row.get::<_, String>(2)?,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            Ok(Snapshot {
                bindings,
                urls,
                subscriptions,
            })
        })
        .await
    }

    async fn prune_seen(&self, before: DateTime<Utc>) -> StoreResult<usize> {
        let cutoff = before.format(SQLITE_TIMESTAMP).to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM seen_ads WHERE timestamp < ?1",
                params![cutoff],
            )?;
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
impl SqliteStore {
    /// Move a seen row `days` into the past.
    pub(crate) async fn backdate_seen(&self, server: &ServerId, listing: &ListingId, days: i64) {
        let (server, id) = (server.to_string(), listing.value());
        let modifier = format!("-{days} days");
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE seen_ads SET timestamp = datetime('now', ?1) WHERE ad_id = ?2 AND guild = ?3",
                params![modifier, id, server],
            )?;
            Ok(())
        })
        .await
        .unwrap();
    }
}
