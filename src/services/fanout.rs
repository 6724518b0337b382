// src/services/fanout.rs

//! Keyword matching for subscriber mentions.

use crate::models::{Listing, NotifyConfig};

/// Decides which subscribed keywords a listing triggers.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMatcher {
    case_insensitive: bool,
}

impl KeywordMatcher {
    pub fn new(case_insensitive: bool) -> Self {
        Self { case_insensitive }
    }

    pub fn from_config(config: &NotifyConfig) -> Self {
        Self::new(config.case_insensitive)
    }

    /// Whether `keyword` occurs in the listing's title or description.
    pub fn matches(&self, keyword: &str, listing: &Listing) -> bool {
        if keyword.is_empty() {
            return false;
        }
        if self.case_insensitive {
            let keyword = keyword.to_lowercase();
            listing.title.to_lowercase().contains(&keyword)
                || listing.description.to_lowercase().contains(&keyword)
        } else {
            listing.title.contains(keyword) || listing.description.contains(keyword)
        }
    }

    /// The subset of `keywords` triggered by `listing`, order preserved.
    pub fn matching<'a>(&self, keywords: &'a [String], listing: &Listing) -> Vec<&'a str> {
        keywords
            .iter()
            .map(String::as_str)
            .filter(|keyword| self.matches(keyword, listing))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingId;

    fn listing(title: &str, description: &str) -> Listing {
        Listing::from_raw(ListingId::from(1), "https://x", title, "$1", description)
    }

    #[test]
    fn test_case_sensitive_by_default() {
        let matcher = KeywordMatcher::default();
        let ad = listing("Red Bike", "for sale");

        assert!(matcher.matches("Bike", &ad));
        assert!(!matcher.matches("bike", &ad));
        assert!(matcher.matches("sale", &ad));
        assert!(!matcher.matches("", &ad));
    }

    #[test]
    fn test_case_insensitive_mode() {
        let matcher = KeywordMatcher::new(true);
        assert!(matcher.matches("bike", &listing("Red BIKE", "")));
    }

    #[test]
    fn test_matches_sanitized_text() {
        // Asterisks are stripped before matching.
        let ad = listing("**bike**", "");
        assert!(KeywordMatcher::default().matches("bike", &ad));
    }

    #[test]
    fn test_matching_preserves_order() {
        let keywords = vec!["red".to_string(), "car".to_string(), "bike".to_string()];
        let ad = listing("red bike for sale", "");
        assert_eq!(
            KeywordMatcher::default().matching(&keywords, &ad),
            vec!["red", "bike"]
        );
    }
}
