//! Configuration module for news-harvest
//!
//! This module loads the optional TOML settings file and the categories JSON
//! file, validates both, and turns them into [`Category`] and [`Source`]
//! values that stay immutable for the rest of a run.
//!
//! # Example
//!
//! ```no_run
//! use news_harvest::config::{load_categories, Settings};
//! use std::path::Path;
//!
//! let settings = Settings::default();
//! let set = load_categories(Path::new("config/categories.json"), &settings).unwrap();
//! println!("Loaded {} categories", set.categories.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Category, CategorySet, CrawlerSettings, ExtractorSettings, HttpSettings, OutputConfig,
    Pagination, Settings, Source, SourceSettings, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{
    compute_file_hash, load_categories, load_settings, load_settings_or_default, parse_categories,
};
pub use validation::validate;
