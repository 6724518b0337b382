// src/models/ids.rs

//! Identifiers for chat entities and listings.
//!
//! Chat-platform ids are opaque strings so that 64-bit and wider snowflakes
//! survive the round trip through SQLite untouched.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

opaque_id!(
    /// A chat server (guild).
    ServerId
);
opaque_id!(
    /// A text channel inside a server.
    ChannelId
);
opaque_id!(
    /// A chat user.
    UserId
);

/// Identifier of a classified listing.
///
/// Compared and persisted by its integral value, displayed exactly as the
/// page delivered it.
#[derive(Debug, Clone, Eq)]
pub struct ListingId {
    value: i64,
    raw: String,
}

impl ListingId {
    /// Parse a listing id attribute. Returns `None` for non-integral ids.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let value = trimmed.parse::<i64>().ok()?;
        Some(Self {
            value,
            raw: trimmed.to_string(),
        })
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for ListingId {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Hash for ListingId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl From<i64> for ListingId {
    fn from(value: i64) -> Self {
        Self {
            value,
            raw: value.to_string(),
        }
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
