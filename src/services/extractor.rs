// src/services/extractor.rs

//! Search results page parser.
//!
//! Turns the HTML of a results page into [`Listing`] records using the
//! configured CSS selectors.

use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Listing, ListingId, ListingSelectors};

/// Parses search result pages into listings.
#[derive(Debug, Clone)]
pub struct ListingExtractor {
    item: Selector,
    info: Selector,
    title: Selector,
    price: Selector,
    description: Selector,
    id_attr: String,
    url_attr: String,
    site_url: String,
}

impl ListingExtractor {
    /// Compile the selectors. Fails if any selector is not valid CSS.
    pub fn new(selectors: &ListingSelectors, site_url: &str) -> Result<Self> {
        Ok(Self {
            item: parse_selector(&selectors.item_selector)?,
            info: parse_selector(&selectors.info_selector)?,
            title: parse_selector(&selectors.title_selector)?,
            price: parse_selector(&selectors.price_selector)?,
            description: parse_selector(&selectors.description_selector)?,
            id_attr: selectors.id_attr.clone(),
            url_attr: selectors.url_attr.clone(),
            site_url: site_url.trim_end_matches('/').to_string(),
        })
    }

    /// Extract every well-formed listing, in document order.
    ///
    /// Containers missing a required element or attribute are skipped.
    pub fn extract(&self, html: &str) -> Vec<Listing> {
        let document = Html::parse_document(html);
        let mut listings = Vec::new();
        let mut skipped = 0usize;

        for item in document.select(&self.item) {
            match self.parse_item(item) {
                Some(listing) => listings.push(listing),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::debug!(
                "Skipped {} malformed listing container(s), kept {}",
                skipped,
                listings.len()
            );
        }
        listings
    }

    fn parse_item(&self, item: ElementRef<'_>) -> Option<Listing> {
        let info = item.select(&self.info).next()?;
        let title = info.select(&self.title).next()?;
        let price = info.select(&self.price).next()?;
        let description = info.select(&self.description).next()?;

        let id = ListingId::parse(item.value().attr(&self.id_attr)?)?;
        let path = item.value().attr(&self.url_attr)?;

        Some(Listing::from_raw(
            id,
            format!("{}{}", self.site_url, path),
            own_text(title),
            own_text(price),
            own_text(description),
        ))
    }
}

/// First text node directly under `element`, ignoring descendant text.
fn own_text(element: ElementRef<'_>) -> &str {
    element
        .children()
        .find_map(|child| child.value().as_text())
        .map(|text| &**text)
        .unwrap_or("")
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
