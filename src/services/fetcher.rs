// src/services/fetcher.rs

//! Concurrent page fetching.
//!
//! Downloads every tracked search page for a tick and runs the extractor
//! over each body. Failed requests are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{Config, CrawlerConfig, FetchTarget, Listing, ServerId};
use crate::services::ListingExtractor;

/// A downloaded page.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    pub body: String,
}

/// Source of raw pages. The HTTP implementation is [`HttpPageSource`].
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<Page>;
}

/// [`PageSource`] over a shared `reqwest` client.
pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    /// Build a client with the configured User-Agent and timeout.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn get(&self, url: &str) -> Result<Page> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Page { status, body })
    }
}

/// Listings scraped from one tracked URL.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub server: ServerId,
    pub url: String,
    pub listings: Vec<Listing>,
}

/// Summary of a fetch run.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Successful pages, in target order
    pub pages: Vec<PageResult>,
    pub attempted: usize,
    pub failures: Vec<FetchTarget>,
}

/// Fetches and extracts tracked search pages.
pub struct ListingFetcher {
    source: Arc<dyn PageSource>,
    extractor: ListingExtractor,
    concurrency: usize,
    probe_marker: String,
}

impl ListingFetcher {
    pub fn new(
        source: Arc<dyn PageSource>,
        extractor: ListingExtractor,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            source,
            extractor,
            concurrency: config.max_concurrent.max(1),
            probe_marker: config.probe_marker.clone(),
        }
    }

    /// Build a fetcher that talks HTTP, from the full configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = HttpPageSource::new(&config.crawler)?;
        let extractor = ListingExtractor::new(&config.selectors, &config.crawler.site_url)?;
        Ok(Self::new(Arc::new(source), extractor, &config.crawler))
    }

    /// Fetch every target concurrently.
    ///
    /// Results come back in the order of `targets`; failures are omitted
    /// from `pages` and recorded in `failures`.
    pub async fn fetch_all(&self, targets: Vec<FetchTarget>) -> FetchOutcome {
        let mut outcome = FetchOutcome {
            attempted: targets.len(),
            ..FetchOutcome::default()
        };

        let mut results = stream::iter(targets)
            .map(|target| async move {
                let result = self.fetch_one(&target.url).await;
                (target, result)
            })
            .buffered(self.concurrency);

        while let Some((target, result)) = results.next().await {
            match result {
                Ok(listings) => {
                    log::debug!("Fetched {} listing(s) from {}", listings.len(), target.url);
                    outcome.pages.push(PageResult {
                        server: target.server,
                        url: target.url,
                        listings,
                    });
                }
                Err(error) => {
                    log::warn!(
                        "Failed to fetch {} for server {}: {}",
                        target.url,
                        target.server,
                        error
                    );
                    outcome.failures.push(target);
                }
            }
        }

        outcome
    }

    async fn fetch_one(&self, url: &str) -> Result<Vec<Listing>> {
        let page = self.source.get(url).await?;
        if !(200..300).contains(&page.status) {
            return Err(AppError::fetch(url, format!("status {}", page.status)));
        }
        Ok(self.extractor.extract(&page.body))
    }

    /// Check that `url` serves a search results page.
    ///
    /// Accepts only a 200 response whose body contains the probe marker.
    pub async fn probe(&self, url: &str) -> Result<()> {
        let page = self.source.get(url).await?;
        if page.status != 200 {
            return Err(AppError::probe(url, format!("status {}", page.status)));
        }
        if !page.body.contains(&self.probe_marker) {
            return Err(AppError::probe(
                url,
                format!("body does not contain '{}'", self.probe_marker),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::models::ListingSelectors;

    /// Serves canned pages keyed by URL; unknown URLs fail like a dead host.
    #[derive(Default)]
    pub(crate) struct StaticPages {
        pages: Mutex<HashMap<String, Page>>,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl StaticPages {
        pub(crate) fn set(&self, url: &str, status: u16, body: impl Into<String>) {
            self.pages.lock().unwrap().insert(
                url.to_string(),
                Page {
                    status,
                    body: body.into(),
                },
            );
        }
    }

    #[async_trait]
    impl PageSource for StaticPages {
        async fn get(&self, url: &str) -> Result<Page> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::fetch(url, "connection refused"))
        }
    }

    pub(crate) fn fetcher(source: Arc<StaticPages>) -> ListingFetcher {
        let extractor =
            ListingExtractor::new(&ListingSelectors::default(), "https://www.kijiji.ca").unwrap();
        ListingFetcher::new(source, extractor, &CrawlerConfig::default())
    }

    /// A results page with one `search-item` per `(id, title)`.
    pub(crate) fn results_page(items: &[(i64, &str)]) -> String {
        let mut html = String::from("<html><body><p>showing 1 - 20 of 40 results</p>");
        for (id, title) in items {
            html.push_str(&format!(
                r#"<div class="search-item" data-listing-id="{id}" data-vip-url="/v-item/{id}">
                     <div class="info-container">
                       <a class="title">{title}</a>
                       <div class="price">$10.00</div>
                       <div class="description">Listing {id}</div>
                     </div>
                   </div>"#
            ));
        }
        html.push_str("</body></html>");
        html
    }

    fn target(server: &str, url: &str) -> FetchTarget {
        FetchTarget {
            server: ServerId::new(server),
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_all_drops_failures_and_keeps_order() {
        let source = Arc::new(StaticPages::default());
        source.set("https://a", 200, results_page(&[(1, "one"), (2, "two")]));
        source.set("https://b", 503, "unavailable");
        source.set("https://d", 200, results_page(&[(3, "three")]));

        let outcome = fetcher(source)
            .fetch_all(vec![
                target("1", "https://a"),
                target("1", "https://b"),
                target("2", "https://c"),
                target("2", "https://d"),
            ])
            .await;

        assert_eq!(outcome.attempted, 4);
        assert_eq!(outcome.failures.len(), 2);
        let urls: Vec<&str> = outcome.pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a", "https://d"]);
        assert_eq!(outcome.pages[0].listings.len(), 2);
        assert_eq!(outcome.pages[1].server, ServerId::new("2"));
    }

    #[tokio::test]
    async fn test_probe_requires_ok_status_and_marker() {
        let source = Arc::new(StaticPages::default());
        source.set("https://ok", 200, "<p>showing 1 - 20</p>");
        source.set("https://empty", 200, "<p>No results</p>");
        source.set("https://gone", 404, "showing");
        let fetcher = fetcher(source);

        assert!(fetcher.probe("https://ok").await.is_ok());
        assert!(matches!(
            fetcher.probe("https://empty").await,
            Err(AppError::Probe { .. })
        ));
        assert!(matches!(
            fetcher.probe("https://gone").await,
            Err(AppError::Probe { .. })
        ));
        assert!(fetcher.probe("https://unreachable").await.is_err());
    }
}
