//! Domain to scraper dispatch

use crate::extract::scrapers::{
    default_site_profiles, GenericScraper, ScraperCapability, SelectorScraper, SiteProfile,
};
use crate::url::{extract_domain, registry_key};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Maps a URL's domain to the scraper that handles it
///
/// Lookup is an exact match on the host after lowercasing and stripping one
/// leading `www.`; anything else goes to the generic fallback.
pub struct CapabilityRegistry {
    by_domain: HashMap<String, Arc<dyn ScraperCapability>>,
    fallback: Arc<dyn ScraperCapability>,
}

impl CapabilityRegistry {
    /// Creates a registry with only the generic fallback
    pub fn new() -> Self {
        Self {
            by_domain: HashMap::new(),
            fallback: Arc::new(GenericScraper::new()),
        }
    }

    /// Creates a registry with every built-in site scraper
    pub fn with_default_sites() -> Self {
        let mut registry = Self::new();
        for profile in default_site_profiles() {
            registry.register_profile(&profile);
        }
        registry
    }

    /// Registers a scraper for a domain, replacing any previous one
    pub fn register(&mut self, domain: &str, capability: Arc<dyn ScraperCapability>) {
        self.by_domain.insert(registry_key(domain), capability);
    }

    /// Registers a [`SelectorScraper`] built from `profile`
    pub fn register_profile(&mut self, profile: &SiteProfile) {
        self.register(&profile.domain, Arc::new(SelectorScraper::new(profile)));
    }

    /// Replaces the generic fallback
    pub fn set_fallback(&mut self, capability: Arc<dyn ScraperCapability>) {
        self.fallback = capability;
    }

    /// Returns the scraper for `url`; never fails
    pub fn resolve(&self, url: &Url) -> Arc<dyn ScraperCapability> {
        extract_domain(url)
            .and_then(|domain| self.by_domain.get(&registry_key(&domain)))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Registered domains, sorted
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.by_domain.keys().cloned().collect();
        domains.sort();
        domains
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
