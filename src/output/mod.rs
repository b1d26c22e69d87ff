//! Output module for run reports and store statistics
//!
//! This module handles:
//! - Formatting the end-of-run report of a harvest job
//! - Loading and displaying per-category statistics from the stores

pub mod report;
pub mod stats;

pub use report::{format_outcome, print_outcome};
pub use stats::{
    format_statistics, load_statistics, print_statistics, CategoryStatistics, HarvestStatistics,
};
