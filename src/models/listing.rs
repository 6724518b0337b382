//! Listing data structure.

use crate::models::ListingId;

/// Placeholder published for an empty price or description.
pub const NOT_SPECIFIED: &str = "Not specified";

/// Horizontal rule opening every published ad.
const RULE: &str = "===========================================";

/// A classified ad extracted from a search results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Listing identifier (`data-listing-id`)
    pub id: ListingId,

    /// Canonical ad URL
    pub url: String,

    /// Ad title, sanitized
    pub title: String,

    /// Asking price as displayed
    pub price: String,

    /// Description snippet, sanitized
    pub description: String,
}

impl Listing {
    /// Build a listing from raw text nodes, applying normalization.
    ///
    /// Text is trimmed first, then back-ticks become `'` and asterisks are
    /// dropped from title and description, and finally an empty price or
    /// description becomes [`NOT_SPECIFIED`].
    pub fn from_raw(
        id: ListingId,
        url: impl Into<String>,
        title: &str,
        price: &str,
        description: &str,
    ) -> Self {
        let title = sanitize(title.trim());
        let price = or_not_specified(price.trim().to_string());
        let description = or_not_specified(sanitize(description.trim()));

        Self {
            id,
            url: url.into(),
            title,
            price,
            description,
        }
    }

    /// Render the chat message for this ad, with `mentions` appended verbatim.
    pub fn format_message(&self, mentions: &str) -> String {
        format!(
            "{RULE}\n\
             :newspaper: **Kijiji Ad - {title}!**\n\
             Title: ``{title}``\n\
             Price: ``{price}``\n\
             Description:```{desc}```\n\
             {url}\n\n\
             {mentions}",
            title = self.title,
            price = self.price,
            desc = self.description,
            url = self.url,
        )
    }
}

/// Replace characters that would break out of the message's code fences.
pub fn sanitize(text: &str) -> String {
    text.replace('`', "'").replace('*', "")
}

fn or_not_specified(text: String) -> String {
    if text.is_empty() {
        NOT_SPECIFIED.to_string()
    } else {
        text
    }
}
