use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The state store keeps this hash so a resumed run can warn when the
/// configuration changed underneath it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID: &str = r#"
seeds = ["https://www.albumoftheyear.org/album/1.php"]

[crawler]
max-concurrency = 4
max-per-host-concurrency = 1
max-retries = 2
request-timeout-ms = 5000
politeness-delay-ms = 250

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-email = "admin@example.com"

[output]
records-path = "./records.jsonl"
state-path = "./state.db"

[extraction]
link-pattern = "/album/"

[[extraction.field]]
name = "title"
selector = "h1.albumTitle"

[[extraction.field]]
name = "cover"
selector = "img.cover"
kind = "attribute"
attribute = "src"

[[extraction.field]]
name = "tracks"
selector = "tr"
kind = "nested"

[[extraction.field.fields]]
name = "number"
selector = "td.trackNumber"
kind = "number"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_concurrency, 4);
        assert_eq!(config.crawler.max_per_host_concurrency, 1);
        assert_eq!(config.crawler.politeness_delay_ms, 250);
        // Unset keys fall back to defaults
        assert_eq!(config.crawler.max_depth, 2);
        assert_eq!(config.user_agent.crawler_name, "TestHarvester");
        assert_eq!(config.output.state_path.as_deref(), Some("./state.db"));
        assert_eq!(config.extraction.fields.len(), 3);
        assert_eq!(config.extraction.fields[0].kind, FieldKind::Text);
        assert_eq!(config.extraction.fields[1].attribute.as_deref(), Some("src"));
        assert_eq!(config.extraction.fields[2].fields.len(), 1);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_kind_is_parse_error() {
        let content = r#"
seeds = ["https://example.com/"]
[[extraction.field]]
name = "title"
selector = "h1"
kind = "sparkle"
"#;
        assert!(matches!(parse_config(content), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_fields_is_validation_error() {
        let content = r#"seeds = ["https://example.com/"]"#;
        assert!(matches!(
            parse_config(content),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_preset_config() {
        let content = r#"
seeds = ["https://www.albumoftheyear.org/album/1.php"]
[extraction]
preset = "album"
"#;
        let config = parse_config(content).unwrap();
        assert!(config.extraction.resolved_fields().unwrap().len() > 5);
        assert!(config.extraction.resolved_link_pattern().is_some());
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }
}
