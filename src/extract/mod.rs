//! Extraction module: the article content phase
//!
//! - `scrapers`: the scraper capability, site profiles and the generic fallback
//! - `registry`: domain to scraper dispatch
//! - `pipeline`: the checkpointed, retrying extraction run

mod pipeline;
mod registry;
mod scrapers;

pub use pipeline::{CategoryReport, ExtractionPipeline, ExtractionReport};
pub use registry::CapabilityRegistry;
pub use scrapers::{
    default_site_profiles, ExtractedText, GenericScraper, ScrapeError, ScraperCapability,
    SelectorScraper, SiteProfile, GENERIC_SCRAPER_NAME,
};
