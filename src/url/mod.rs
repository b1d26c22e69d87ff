//! URL handling module for news-harvest
//!
//! This module provides URL normalization (the dedup key of the URL store)
//! and domain helpers shared by the source fetcher and the capability registry.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, registry_key, same_site};
pub use normalize::normalize_url;
