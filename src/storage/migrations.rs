//! Database migration runner.
//!
//! Migrations run in order on every [`SqliteStore`](super::SqliteStore) open.
//! Each one is guarded by the `user_version` pragma so it runs exactly once.
//! Tables are created with `IF NOT EXISTS` so databases written by earlier
//! deployments of the bot are adopted in place.

use rusqlite::Connection;

use crate::error::StoreError;
use crate::storage::StoreResult;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// v001: the four core tables.
const V001_INITIAL: &str = r#"
CREATE TABLE IF NOT EXISTS guild_channels (
    id      INTEGER PRIMARY KEY,
    guild   VARCHAR(32) UNIQUE NOT NULL,
    channel VARCHAR(32) NOT NULL
);

CREATE TABLE IF NOT EXISTS track_urls (
    id    INTEGER PRIMARY KEY,
    guild VARCHAR(32) NOT NULL,
    url   VARCHAR(128) NOT NULL
);

CREATE TABLE IF NOT EXISTS keyword_pings (
    id      INTEGER PRIMARY KEY,
    user    VARCHAR(32) NOT NULL,
    guild   VARCHAR(32) NOT NULL,
    keyword VARCHAR(32) NOT NULL,
    UNIQUE (user, guild, keyword)
);

CREATE TABLE IF NOT EXISTS seen_ads (
    ad_id     INT NOT NULL,
    guild     VARCHAR(32) NOT NULL,
    timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (ad_id, guild)
);
"#;

/// v002: enforce `(guild, url)` uniqueness, dropping older duplicates first.
const V002_TRACK_URLS_UNIQUE: &str = r#"
DELETE FROM track_urls
 WHERE id NOT IN (SELECT MIN(id) FROM track_urls GROUP BY guild, url);

CREATE UNIQUE INDEX IF NOT EXISTS idx_track_urls_guild_url
    ON track_urls(guild, url);

CREATE INDEX IF NOT EXISTS idx_seen_ads_timestamp
    ON seen_ads(timestamp);
"#;

/// Run all pending migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    log::debug!(
        "Schema version {} (target {})",
        current,
        CURRENT_VERSION
    );

    if current < 1 {
        log::info!("Applying migration v001_initial");
        conn.execute_batch(V001_INITIAL)
            .map_err(|e| StoreError::Migration(format!("v001_initial: {e}")))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    if current < 2 {
        log::info!("Applying migration v002_track_urls_unique");
        conn.execute_batch(V002_TRACK_URLS_UNIQUE)
            .map_err(|e| StoreError::Migration(format!("v002_track_urls_unique: {e}")))?;
        conn.pragma_update(None, "user_version", 2)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_version(conn: &Connection) -> u32 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_migrates_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(user_version(&conn), CURRENT_VERSION);

        // Running again is a no-op.
        run_migrations(&conn).unwrap();
        assert_eq!(user_version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn test_adopts_legacy_database_with_duplicate_urls() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(V001_INITIAL).unwrap();
        conn.execute_batch(
            "INSERT INTO track_urls(guild, url) VALUES ('1', 'https://a');
             INSERT INTO track_urls(guild, url) VALUES ('1', 'https://a');
             INSERT INTO track_urls(guild, url) VALUES ('2', 'https://a');",
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM track_urls", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        let duplicate = conn.execute(
            "INSERT INTO track_urls(guild, url) VALUES ('1', 'https://a')",
            [],
        );
        assert!(duplicate.is_err());
    }
}
