//! Service layer for the bot.
//!
//! This module contains the scraping logic:
//! - Page parsing (`ListingExtractor`)
//! - Concurrent fetching and URL probing (`ListingFetcher`)
//! - Keyword matching for mentions (`KeywordMatcher`)

mod extractor;
mod fanout;
pub(crate) mod fetcher;

pub use extractor::ListingExtractor;
pub use fanout::KeywordMatcher;
pub use fetcher::{FetchOutcome, HttpPageSource, ListingFetcher, Page, PageResult, PageSource};
