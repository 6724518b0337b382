//! Ingestion and notification pipeline.
//!
//! - `Pipeline`: one tick of fetch, dedupe, format and publish
//! - `Scheduler`: drives ticks on a fixed interval

pub mod scheduler;
pub mod tick;

pub use scheduler::Scheduler;
pub use tick::{Pipeline, TickReport, load_state};
