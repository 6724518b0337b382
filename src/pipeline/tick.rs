// src/pipeline/tick.rs

//! One scrape-and-publish tick.
//!
//! A tick reloads the state from the store and snapshots the tracked URLs,
//! fetches them all concurrently, then
//! walks the results in plan order: every listing is checked against the
//! seen set and first sightings are formatted and published, with mentions
//! for subscribers whose keywords match.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{ChannelId, Config, Listing, ServerId, ServerPlan, State, TickPlan};
use crate::publisher::Publisher;
use crate::services::{KeywordMatcher, ListingFetcher, PageResult};
use crate::storage::ListingStore;

/// Counters for a single tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub pages_fetched: usize,
    pub fetch_failures: usize,
    pub listings_seen: usize,
    pub published: usize,
    pub skipped_unbound: usize,
    pub store_errors: usize,
    pub publish_errors: usize,
    pub pruned: usize,
}

/// Load the persisted state into a fresh in-memory projection.
pub async fn load_state(store: &dyn ListingStore) -> Result<State> {
    let snapshot = store.snapshot().await?;
    let state = State::from_snapshot(&snapshot);
    log::info!(
        "Loaded {} channel binding(s), {} tracked URL(s), {} keyword subscription(s)",
        state.binding_count(),
        state.url_count(),
        state.subscription_count()
    );
    Ok(state)
}

/// Runs ticks against shared state. At most one tick runs at a time.
pub struct Pipeline {
    store: Arc<dyn ListingStore>,
    state: Arc<Mutex<State>>,
    fetcher: Arc<ListingFetcher>,
    publisher: Arc<dyn Publisher>,
    matcher: KeywordMatcher,
    retention: Option<Duration>,
    running: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ListingStore>,
        state: Arc<Mutex<State>>,
        fetcher: Arc<ListingFetcher>,
        publisher: Arc<dyn Publisher>,
        config: &Config,
    ) -> Self {
        let days = config.scheduler.seen_retention_days;
        let retention = (days > 0).then(|| Duration::days(days as i64));

        Self {
            store,
            state,
            fetcher,
            publisher,
            matcher: KeywordMatcher::from_config(&config.notify),
            retention,
            running: Mutex::new(()),
        }
    }

    /// Run a tick unless one is already in flight.
    ///
    /// Returns `None` when the tick was skipped.
    pub async fn try_run(&self) -> Option<TickReport> {
        let Ok(_guard) = self.running.try_lock() else {
            log::warn!("Previous tick still running; skipping this one");
            return None;
        };
        Some(self.tick().await)
    }

    /// Run a tick, waiting for any in-flight tick to finish first.
    pub async fn run(&self) -> TickReport {
        let _guard = self.running.lock().await;
        self.tick().await
    }

    async fn tick(&self) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport::default();
        let plan = self.refresh_plan(&mut report).await;
        let targets = plan.targets();
        log::info!(
            "Tick started: {} URL(s) across {} server(s)",
            targets.len(),
            plan.servers.len()
        );

        let outcome = self.fetcher.fetch_all(targets).await;
        report.pages_fetched = outcome.pages.len();
        report.fetch_failures = outcome.failures.len();

        for page in outcome.pages {
            let Some(server) = plan.server(&page.server) else {
                continue;
            };
            self.process_page(server, page, &mut report).await;
        }

        if let Some(retention) = self.retention {
            report.pruned = self.prune(retention).await;
        }

        log::info!(
            "Tick finished in {:.1}s: {} page(s) fetched, {} failed, {} listing(s) seen, \
             {} published, {} skipped (no channel), {} store error(s), {} publish error(s)",
            started.elapsed().as_secs_f64(),
            report.pages_fetched,
            report.fetch_failures,
            report.listings_seen,
            report.published,
            report.skipped_unbound,
            report.store_errors,
            report.publish_errors
        );
        report
    }

    /// Reload the state from the store, then snapshot the plan.
    ///
    /// Other processes sharing the database may have changed it since the
    /// last tick. On a store failure the current in-memory state is used.
    async fn refresh_plan(&self, report: &mut TickReport) -> TickPlan {
        let mut state = self.state.lock().await;
        match self.store.snapshot().await {
            Ok(snapshot) => *state = State::from_snapshot(&snapshot),
            Err(e) => {
                log::error!("Failed to reload state, using cached copy: {}", e);
                report.store_errors += 1;
            }
        }
        state.plan()
    }

    async fn process_page(&self, plan: &ServerPlan, page: PageResult, report: &mut TickReport) {
        report.listings_seen += page.listings.len();

        // Unbound servers are not marked seen, so binding later flushes them.
        let Some(channel) = &plan.channel else {
            log::debug!(
                "Server {} has no channel; holding {} listing(s) from {}",
                plan.server,
                page.listings.len(),
                page.url
            );
            report.skipped_unbound += page.listings.len();
            return;
        };

        for listing in &page.listings {
            match self.store.mark_seen(&plan.server, &listing.id).await {
                Ok(seen) if !seen.first_time => continue,
                Ok(_) => {}
                Err(e) => {
                    log::error!(
                        "Failed to record listing {} for server {}: {}",
                        listing.id,
                        plan.server,
                        e
                    );
                    report.store_errors += 1;
                    continue;
                }
            }

            let mentions = self.mentions(plan, listing, report).await;
            self.publish(channel, listing, &mentions, report).await;
        }
    }

    /// Concatenated mention tokens for subscribers whose keywords match.
    ///
    /// A user subscribed to several matching keywords is mentioned once per
    /// keyword.
    async fn mentions(
        &self,
        plan: &ServerPlan,
        listing: &Listing,
        report: &mut TickReport,
    ) -> String {
        let mut users = Vec::new();
        for keyword in self.matcher.matching(&plan.keywords, listing) {
            match self.store.subscribers_for(&plan.server, keyword).await {
                Ok(subscribers) => users.extend(subscribers),
                Err(e) => {
                    log::error!(
                        "Failed to load subscribers of '{}' on server {}: {}",
                        keyword,
                        plan.server,
                        e
                    );
                    report.store_errors += 1;
                }
            }
        }
        users
            .iter()
            .map(|user| self.publisher.mention(user))
            .collect()
    }

    async fn publish(
        &self,
        channel: &ChannelId,
        listing: &Listing,
        mentions: &str,
        report: &mut TickReport,
    ) {
        let message = listing.format_message(mentions);
        match self.publisher.send(channel, &message).await {
            Ok(()) => report.published += 1,
            Err(e) => {
                log::error!("Failed to publish listing {}: {}", listing.id, e);
                report.publish_errors += 1;
            }
        }
    }

    async fn prune(&self, retention: Duration) -> usize {
        match self.store.prune_seen(Utc::now() - retention).await {
            Ok(removed) => {
                if removed > 0 {
                    log::info!(
                        "Pruned {} seen listing(s) older than {} day(s)",
                        removed,
                        retention.num_days()
                    );
                }
                removed
            }
            Err(e) => {
                log::error!("Failed to prune seen listings: {}", e);
                0
            }
        }
    }

    /// Shared handle to the in-memory projection.
    pub fn state(&self) -> Arc<Mutex<State>> {
        Arc::clone(&self.state)
    }

    /// Every server's channel binding.
    pub async fn bound_channels(&self) -> Vec<(ServerId, ChannelId)> {
        self.state.lock().await.bindings()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{ListingId, UserId};
    use crate::publisher::tests::RecordingPublisher;
    use crate::services::fetcher::tests::{StaticPages, fetcher, results_page};
    use crate::storage::SqliteStore;

    const URL_A: &str = "https://www.kijiji.ca/b-bikes/city-of-toronto/k0c644l1700273";
    const URL_B: &str = "https://www.kijiji.ca/b-desks/k0l0";

    pub(crate) struct Harness {
        pub(crate) store: Arc<SqliteStore>,
        pub(crate) state: Arc<Mutex<State>>,
        pub(crate) pages: Arc<StaticPages>,
        pub(crate) publisher: Arc<RecordingPublisher>,
        pub(crate) pipeline: Arc<Pipeline>,
    }

    impl Harness {
        pub(crate) fn new(config: &Config) -> Self {
            Self::with_store(config, SqliteStore::open_in_memory().unwrap())
        }

        pub(crate) fn with_store(config: &Config, store: SqliteStore) -> Self {
            let store = Arc::new(store);
            let state = Arc::new(Mutex::new(State::default()));
            let pages = Arc::new(StaticPages::default());
            let publisher = Arc::new(RecordingPublisher::default());
            let pipeline = Arc::new(Pipeline::new(
                store.clone(),
                state.clone(),
                Arc::new(fetcher(pages.clone())),
                publisher.clone(),
                config,
            ));
            Self {
                store,
                state,
                pages,
                publisher,
                pipeline,
            }
        }

        pub(crate) async fn track(&self, server: &str, url: &str) {
            let server = ServerId::new(server);
            self.store.add_url(&server, url).await.unwrap();
            self.state.lock().await.track_url(&server, url);
        }

        pub(crate) async fn bind(&self, server: &str, channel: &str) {
            let (server, channel) = (ServerId::new(server), ChannelId::new(channel));
            self.store.bind_channel(&server, &channel).await.unwrap();
            self.state.lock().await.bind_channel(server, channel);
        }

        pub(crate) async fn subscribe(&self, server: &str, user: &str, keyword: &str) {
            let (server, user) = (ServerId::new(server), UserId::new(user));
            self.store
                .add_subscription(&server, &user, keyword)
                .await
                .unwrap();
            self.state.lock().await.subscribe(&server, &user, keyword);
        }

        async fn is_seen(&self, server: &str, id: i64) -> bool {
            // mark_seen inserts when absent, so only use this after the fact
            !self
                .store
                .mark_seen(&ServerId::new(server), &ListingId::from(id))
                .await
                .unwrap()
                .first_time
        }
    }

    #[tokio::test]
    async fn test_first_sighting_publishes_in_order() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL_A).await;
        h.bind("s1", "c1").await;
        h.pages.set(URL_A, 200, results_page(&[(1, "Alpha"), (2, "Bravo")]));

        let report = h.pipeline.run().await;
        assert_eq!(report.published, 2);

        let sent = h.publisher.messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, ChannelId::new("c1"));
        assert!(sent[0].1.contains("**Kijiji Ad - Alpha!**"));
        assert!(sent[0].1.contains("https://www.kijiji.ca/v-item/1"));
        assert!(sent[1].1.contains("**Kijiji Ad - Bravo!**"));

        assert!(h.is_seen("s1", 1).await);
        assert!(h.is_seen("s1", 2).await);
    }

    #[tokio::test]
    async fn test_rescrape_is_idempotent() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL_A).await;
        h.bind("s1", "c1").await;
        h.pages.set(URL_A, 200, results_page(&[(1, "Alpha"), (2, "Bravo")]));

        h.pipeline.run().await;
        let report = h.pipeline.run().await;

        assert_eq!(report.listings_seen, 2);
        assert_eq!(report.published, 0);
        assert_eq!(h.publisher.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_only_new_listing_is_published() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL_A).await;
        h.bind("s1", "c1").await;
        h.pages.set(URL_A, 200, results_page(&[(1, "Alpha"), (2, "Bravo")]));
        h.pipeline.run().await;

        h.pages.set(
            URL_A,
            200,
            results_page(&[(1, "Alpha"), (2, "Bravo"), (3, "Delta")]),
        );
        let report = h.pipeline.run().await;

        assert_eq!(report.published, 1);
        let sent = h.publisher.messages();
        assert!(sent[2].1.contains("**Kijiji Ad - Delta!**"));
        assert!(h.is_seen("s1", 3).await);
    }

    #[tokio::test]
    async fn test_keyword_fanout_appends_mentions() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL_A).await;
        h.bind("s1", "c1").await;
        h.subscribe("s1", "100", "bike").await;
        h.subscribe("s1", "200", "red").await;
        h.subscribe("s1", "300", "car").await;
        h.pages.set(URL_A, 200, results_page(&[(1, "red bike for sale")]));

        h.pipeline.run().await;

        let sent = h.publisher.messages();
        assert!(sent[0].1.ends_with("\n\n<@100><@200>"));
    }

    #[tokio::test]
    async fn test_user_mentioned_for_each_matching_keyword() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL_A).await;
        h.bind("s1", "c1").await;
        h.subscribe("s1", "100", "bike").await;
        h.subscribe("s1", "100", "red").await;
        h.pages.set(URL_A, 200, results_page(&[(1, "red bike")]));

        h.pipeline.run().await;

        assert!(h.publisher.messages()[0].1.ends_with("\n\n<@100><@100>"));
    }

    #[tokio::test]
    async fn test_no_subscribers_leaves_empty_mention_run() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL_A).await;
        h.bind("s1", "c1").await;
        h.subscribe("s1", "100", "Bike").await;
        h.pages.set(URL_A, 200, results_page(&[(1, "red bike")]));

        h.pipeline.run().await;

        let sent = h.publisher.messages();
        assert!(sent[0].1.ends_with("https://www.kijiji.ca/v-item/1\n\n"));
    }

    #[tokio::test]
    async fn test_case_insensitive_mode_matches_any_case() {
        let mut config = Config::default();
        config.notify.case_insensitive = true;
        let h = Harness::new(&config);
        h.track("s1", URL_A).await;
        h.bind("s1", "c1").await;
        h.subscribe("s1", "100", "Bike").await;
        h.pages.set(URL_A, 200, results_page(&[(1, "red bike")]));

        h.pipeline.run().await;

        assert!(h.publisher.messages()[0].1.ends_with("<@100>"));
    }

    #[tokio::test]
    async fn test_unbound_server_catches_up_after_binding() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL_A).await;
        h.pages.set(URL_A, 200, results_page(&[(7, "Lamp")]));

        let report = h.pipeline.run().await;
        assert_eq!(report.published, 0);
        assert_eq!(report.skipped_unbound, 1);
        assert!(h.publisher.messages().is_empty());

        h.bind("s1", "c1").await;
        let report = h.pipeline.run().await;
        assert_eq!(report.published, 1);
        assert!(h.publisher.messages()[0].1.contains("Lamp"));
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_tick() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL_A).await;
        h.track("s1", URL_B).await;
        h.track("s2", URL_A).await;
        h.bind("s1", "c1").await;
        h.bind("s2", "c2").await;
        h.publisher
            .failing
            .lock()
            .unwrap()
            .push(ChannelId::new("c1"));
        h.pages.set(URL_A, 200, results_page(&[(1, "Alpha")]));
        h.pages.set(URL_B, 500, "oops");

        let report = h.pipeline.run().await;

        assert_eq!(report.fetch_failures, 1);
        assert_eq!(report.publish_errors, 1);
        assert_eq!(report.published, 1);
        assert_eq!(h.publisher.messages()[0].0, ChannelId::new("c2"));
    }

    #[tokio::test]
    async fn test_removed_url_is_not_fetched() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL_A).await;
        h.track("s1", URL_B).await;
        h.store
            .remove_url(&ServerId::new("s1"), URL_A)
            .await
            .unwrap();

        h.pipeline.run().await;

        let requests = h.pages.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![URL_B.to_string()]);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let h = Harness::new(&Config::default());
        let guard = h.pipeline.running.lock().await;
        assert!(h.pipeline.try_run().await.is_none());
        drop(guard);
        assert!(h.pipeline.try_run().await.is_some());
    }

    #[tokio::test]
    async fn test_retention_prunes_after_tick() {
        let mut config = Config::default();
        config.scheduler.seen_retention_days = 30;
        let h = Harness::new(&config);
        h.track("s1", URL_A).await;
        h.bind("s1", "c1").await;
        h.pages.set(URL_A, 200, results_page(&[(1, "Alpha")]));

        // Fresh rows are within the retention window.
        let report = h.pipeline.run().await;
        assert_eq!(report.published, 1);
        assert_eq!(report.pruned, 0);

        h.store
            .backdate_seen(&ServerId::new("s1"), &ListingId::from(1), 40)
            .await;
        let report = h.pipeline.run().await;
        assert_eq!(report.published, 0);
        assert_eq!(report.pruned, 1);

        // Pruned listings are new again.
        let report = h.pipeline.run().await;
        assert_eq!(report.published, 1);
        assert_eq!(h.publisher.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_changes_from_another_store_handle_reach_next_tick() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.db");
        let h = Harness::with_store(&Config::default(), SqliteStore::open(&path).unwrap());
        let other = SqliteStore::open(&path).unwrap();
        let server = ServerId::new("s1");
        h.pages.set(URL_A, 200, results_page(&[(1, "Alpha")]));

        other.add_url(&server, URL_A).await.unwrap();
        other
            .bind_channel(&server, &ChannelId::new("c1"))
            .await
            .unwrap();
        let report = h.pipeline.run().await;
        assert_eq!(report.published, 1);
        assert!(h.state.lock().await.is_tracked(&server, URL_A));

        other.remove_url(&server, URL_A).await.unwrap();
        h.pipeline.run().await;
        assert_eq!(h.pages.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_state_from_store() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL_A).await;
        h.bind("s1", "c1").await;
        h.subscribe("s1", "100", "bike").await;

        let state = load_state(h.store.as_ref()).await.unwrap();
        assert_eq!(state.url_count(), 1);
        assert_eq!(state.binding_count(), 1);
        assert_eq!(state.subscription_count(), 1);
    }
}
