//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `CheckpointStatus`: per-URL extraction state and its allowed transitions
//! - `CrawlRun`: in-memory progress of the current crawl, per category

mod checkpoint_status;
mod crawl_run;

// Re-export main types
pub use checkpoint_status::CheckpointStatus;
pub use crawl_run::{CategoryProgress, CrawlRun};
