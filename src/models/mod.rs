// src/models/mod.rs

//! Domain models for the bot.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod ids;
mod listing;
mod selectors;
mod state;

// Re-export all public types
pub use config::{
    BotConfig, Config, CrawlerConfig, ENV_DB_PATH, ENV_TOKEN, ENV_USER_AGENT, LoggingConfig,
    NotifyConfig, SchedulerConfig, StorageConfig,
};
pub use ids::{ChannelId, ListingId, ServerId, UserId};
pub use listing::{Listing, NOT_SPECIFIED, sanitize};
pub use selectors::ListingSelectors;
pub use state::{FetchTarget, ServerPlan, State, TickPlan};
