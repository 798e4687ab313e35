use crate::config::types::{Config, CrawlerConfig, FieldKind, FieldSpec, UserAgentConfig};
use crate::crawler::ExtractionSchema;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
///
/// Checks scalar limits, seeds and user agent, then compiles the extraction
/// schema so bad selectors and link patterns are reported before any fetch.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_seeds(&config.seeds)?;

    let fields = config.extraction.resolved_fields()?;
    validate_fields(&fields)?;
    ExtractionSchema::compile(&fields, config.extraction.resolved_link_pattern().as_deref())?;

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrency < 1 || config.max_concurrency > 256 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 256, got {}",
            config.max_concurrency
        )));
    }

    if config.max_per_host_concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "max_per_host_concurrency must be >= 1, got {}",
            config.max_per_host_concurrency
        )));
    }

    if config.max_per_host_concurrency > config.max_concurrency {
        return Err(ConfigError::Validation(format!(
            "max_per_host_concurrency ({}) cannot exceed max_concurrency ({})",
            config.max_per_host_concurrency, config.max_concurrency
        )));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_max_ms ({}) must be >= backoff_base_ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
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
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters, '-' and '_', got '{}'",
            config.crawler_name
        )));
    }

    if let Some(contact_url) = &config.contact_url {
        Url::parse(contact_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    if let Some(email) = &config.contact_email {
        validate_email(email)?;
    }

    Ok(())
}

/// Validates the seed list: non-empty, every entry an absolute http(s) URL
fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed target is required".to_string(),
        ));
    }

    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates field definitions recursively
fn validate_fields(fields: &[FieldSpec]) -> Result<(), ConfigError> {
    if fields.is_empty() {
        return Err(ConfigError::Validation(
            "extraction schema must define at least one field".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "field name cannot be empty".to_string(),
            ));
        }

        if !names.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate field name '{}'",
                field.name
            )));
        }

        match field.kind {
            FieldKind::Attribute if field.attribute.is_none() => {
                return Err(ConfigError::Validation(format!(
                    "field '{}' has kind 'attribute' but no attribute name",
                    field.name
                )));
            }
            FieldKind::Nested => validate_fields(&field.fields)?,
            _ => {}
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| ConfigError::Validation(format!("Invalid email format: '{}'", email)))?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
