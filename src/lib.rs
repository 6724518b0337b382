// src/lib.rs

//! Kijiji ad watcher library
//!
//! Scrapes tracked search pages on a timer and posts new ads into each
//! server's chat channel, pinging users whose keywords match.

pub mod commands;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod publisher;
pub mod services;
pub mod storage;
