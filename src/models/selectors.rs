// src/models/selectors.rs

//! CSS selectors for scraping a search results page.

use serde::{Deserialize, Serialize};

/// CSS selectors and attribute names used by the listing extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// Selector for each ad container on the page
    #[serde(default = "defaults::item")]
    pub item_selector: String,

    /// Selector for the info block within an ad container
    #[serde(default = "defaults::info")]
    pub info_selector: String,

    /// Selector for the title anchor within the info block
    #[serde(default = "defaults::title")]
    pub title_selector: String,

    /// Selector for the price block within the info block
    #[serde(default = "defaults::price")]
    pub price_selector: String,

    /// Selector for the description block within the info block
    #[serde(default = "defaults::description")]
    pub description_selector: String,

    /// Container attribute holding the listing id
    #[serde(default = "defaults::id_attr")]
    pub id_attr: String,

    /// Container attribute holding the site-relative ad path
    #[serde(default = "defaults::url_attr")]
    pub url_attr: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            item_selector: defaults::item(),
            info_selector: defaults::info(),
            title_selector: defaults::title(),
            price_selector: defaults::price(),
            description_selector: defaults::description(),
            id_attr: defaults::id_attr(),
            url_attr: defaults::url_attr(),
        }
    }
}

impl ListingSelectors {
    /// All selector strings paired with their config key, for validation.
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("selectors.item_selector", &self.item_selector),
            ("selectors.info_selector", &self.info_selector),
            ("selectors.title_selector", &self.title_selector),
            ("selectors.price_selector", &self.price_selector),
            ("selectors.description_selector", &self.description_selector),
        ]
    }
}

mod defaults {
    pub fn item() -> String {
        "div.search-item".into()
    }
    pub fn info() -> String {
        "div.info-container".into()
    }
    pub fn title() -> String {
        "a.title".into()
    }
    pub fn price() -> String {
        "div.price".into()
    }
    pub fn description() -> String {
        "div.description".into()
    }
    pub fn id_attr() -> String {
        "data-listing-id".into()
    }
    pub fn url_attr() -> String {
        "data-vip-url".into()
    }
}
