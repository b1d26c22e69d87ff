use crate::config::types::{Category, CategorySet, Settings, Source};
use crate::config::validation::{validate, validate_categories};
use crate::url::{extract_domain, registry_key};
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

/// Loads and validates a settings file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML settings file
///
/// # Returns
///
/// * `Ok(Settings)` - Successfully loaded and validated settings
/// * `Err(ConfigError)` - Failed to load, parse, or validate the settings
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use news_harvest::config::load_settings;
///
/// let settings = load_settings(Path::new("harvest.toml")).unwrap();
/// println!("Quota: {}", settings.crawler.urls_per_category);
/// ```
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&content)?;
    validate(&settings)?;
    Ok(settings)
}

/// Loads settings from `path` if given, otherwise returns the defaults
pub fn load_settings_or_default(path: Option<&Path>) -> Result<Settings, ConfigError> {
    match path {
        Some(path) => load_settings(path),
        None => Ok(Settings::default()),
    }
}

/// Computes a SHA-256 hash of a file's content
///
/// This is used to detect if the categories changed between runs.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_file_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read(path)?;
    Ok(hash_bytes(&content))
}

fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Loads the categories file and builds the category set
///
/// The file maps each category name to an ordered list of seed URLs. Seeds
/// are grouped into sources by domain, in order of first appearance, and
/// each source picks up its listing settings from `settings`.
///
/// # Arguments
///
/// * `path` - Path to the categories JSON file
/// * `settings` - Validated settings (quota, per-source floor, pagination)
///
/// # Returns
///
/// * `Ok(CategorySet)` - Categories with their sources and file hash
/// * `Err(ConfigError)` - Missing, malformed or invalid categories file
pub fn load_categories(path: &Path, settings: &Settings) -> Result<CategorySet, ConfigError> {
    let content = std::fs::read(path)?;
    parse_categories(&content, settings)
}

/// Parses categories from raw JSON bytes
pub fn parse_categories(content: &[u8], settings: &Settings) -> Result<CategorySet, ConfigError> {
    let raw: BTreeMap<String, Vec<String>> = serde_json::from_slice(content)?;
    validate_categories(&raw)?;

    let mut categories = Vec::with_capacity(raw.len());
    for (name, seeds) in &raw {
        categories.push(Category {
            name: name.clone(),
            quota: settings.crawler.urls_per_category,
            sources: group_sources(seeds, settings)?,
            min_per_source: settings.crawler.min_urls_per_source,
        });
    }

    Ok(CategorySet {
        categories,
        hash: hash_bytes(content),
    })
}

/// Groups seed URLs into sources keyed by normalized domain
fn group_sources(seeds: &[String], settings: &Settings) -> Result<Vec<Source>, ConfigError> {
    let mut sources: Vec<Source> = Vec::new();

    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;
        let domain = extract_domain(&url)
            .ok_or_else(|| ConfigError::InvalidUrl(format!("Seed URL '{}' has no host", seed)))?;
        let id = registry_key(&domain);

        if let Some(existing) = sources.iter_mut().find(|s| s.id == id) {
            if !existing.seeds.contains(&url) {
                existing.seeds.push(url);
            }
            continue;
        }

        let listing = settings.listing_settings(&id);

        sources.push(Source {
            id,
            seeds: vec![url],
            pagination: listing.pagination,
            max_pages: listing.max_pages,
            article_patterns: listing.article_patterns,
        });
    }

    Ok(sources)
}
