use crate::config::types::{
    CrawlerSettings, ExtractorSettings, HttpSettings, OutputConfig, Settings, SourceSettings,
    UserAgentConfig,
};
use crate::ConfigError;
use std::collections::BTreeMap;
use url::Url;

/// Upper bound for either worker pool
const MAX_POOL_SIZE: usize = 64;

/// Validates the entire settings structure
pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
    validate_crawler_settings(&settings.crawler)?;
    validate_extractor_settings(&settings.extractor)?;
    validate_user_agent_config(&settings.user_agent)?;
    validate_http_settings(&settings.http)?;
    validate_output_config(&settings.output)?;
    validate_source_settings(&settings.source)?;
    Ok(())
}

/// Validates crawl phase settings
fn validate_crawler_settings(config: &CrawlerSettings) -> Result<(), ConfigError> {
    if config.urls_per_category < 1 {
        return Err(ConfigError::Validation(
            "urls_per_category must be >= 1".to_string(),
        ));
    }

    validate_pool_size("max_workers", config.max_workers)?;

    if config.max_empty_batches < 1 {
        return Err(ConfigError::Validation(format!(
            "max_empty_batches must be >= 1, got {}",
            config.max_empty_batches
        )));
    }

    Ok(())
}

/// Validates extraction phase settings
fn validate_extractor_settings(config: &ExtractorSettings) -> Result<(), ConfigError> {
    validate_pool_size("workers", config.workers)?;

    if config.progress_interval < 1 {
        return Err(ConfigError::Validation(
            "progress_interval must be >= 1".to_string(),
        ));
    }

    if config.checkpoint_flush_interval < 1 {
        return Err(ConfigError::Validation(
            "checkpoint_flush_interval must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_pool_size(name: &str, size: usize) -> Result<(), ConfigError> {
    if size < 1 || size > MAX_POOL_SIZE {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_POOL_SIZE, size
        )));
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

/// Validates HTTP client timeouts
fn validate_http_settings(config: &HttpSettings) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 || config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "HTTP timeouts must be >= 1 second".to_string(),
        ));
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if config.categories_file.is_empty() {
        return Err(ConfigError::Validation(
            "categories_file cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates per-source listing settings
fn validate_source_settings(sources: &[SourceSettings]) -> Result<(), ConfigError> {
    for entry in sources {
        validate_domain_string(&entry.domain)?;

        if entry.max_pages < 1 {
            return Err(ConfigError::Validation(format!(
                "max_pages for '{}' must be >= 1",
                entry.domain
            )));
        }
    }
    Ok(())
}

/// Validates the raw categories mapping
pub fn validate_categories(raw: &BTreeMap<String, Vec<String>>) -> Result<(), ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::Validation(
            "categories file defines no categories".to_string(),
        ));
    }

    for (name, seeds) in raw {
        validate_category_name(name)?;

        if seeds.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Category '{}' must have at least one seed URL",
                name
            )));
        }

        for seed in seeds {
            let url = Url::parse(seed).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e))
            })?;

            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Validation(format!(
                    "Seed URL '{}' must use http or https",
                    seed
                )));
            }
        }
    }

    Ok(())
}

/// Category names become file and directory names
fn validate_category_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation(
            "Category name cannot be empty".to_string(),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "Category name '{}' may only contain letters, digits, '-' and '_'",
            name
        )));
    }

    Ok(())
}

/// Validates a domain string
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::Validation("Domain cannot be empty".to_string()));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}
