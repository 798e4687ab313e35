use crate::config::presets::{preset_fields, preset_link_pattern};
use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for aoty-harvest
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Targets the run starts from, at depth 0
    #[serde(default)]
    pub seeds: Vec<String>,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub user_agent: UserAgentConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Maximum number of in-flight fetches across all hosts
    pub max_concurrency: usize,

    /// Maximum number of in-flight fetches against a single host
    pub max_per_host_concurrency: usize,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Per-request timeout (milliseconds)
    pub request_timeout_ms: u64,

    /// Minimum spacing between dispatches to the same host (milliseconds)
    pub politeness_delay_ms: u64,

    /// Maximum link depth followed from the seeds
    pub max_depth: u32,

    /// First retry delay before jitter (milliseconds)
    pub backoff_base_ms: u64,

    /// Cap for any single retry delay, including Retry-After (milliseconds)
    pub backoff_max_ms: u64,

    /// How long in-flight fetches may run after cancellation (milliseconds)
    pub shutdown_grace_ms: u64,
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            max_per_host_concurrency: 2,
            max_retries: 3,
            request_timeout_ms: 10_000,
            politeness_delay_ms: 1_000,
            max_depth: 2,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: Option<String>,

    /// Email address for crawler-related contact
    pub contact_email: Option<String>,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`, with the
    /// parenthesised part omitted when no contact details are configured.
    pub fn header_value(&self) -> String {
        let contact: Vec<String> = [
            self.contact_url.as_ref().map(|url| format!("+{}", url)),
            self.contact_email.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if contact.is_empty() {
            format!("{}/{}", self.crawler_name, self.crawler_version)
        } else {
            format!(
                "{}/{} ({})",
                self.crawler_name,
                self.crawler_version,
                contact.join("; ")
            )
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "aoty-harvest".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
            contact_email: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    /// JSON Lines file receiving extracted records
    pub records_path: Option<String>,

    /// SQLite file holding the seen set and frontier snapshot between runs
    pub state_path: Option<String>,
}

/// Extraction schema configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExtractionConfig {
    /// Built-in schema to start from (e.g. "album")
    pub preset: Option<String>,

    /// Regex an absolute link must match to be followed
    pub link_pattern: Option<String>,

    /// Field definitions, appended after any preset fields
    #[serde(rename = "field")]
    pub fields: Vec<FieldSpec>,
}

impl ExtractionConfig {
    /// Returns the preset fields (if any) followed by the explicit fields
    pub fn resolved_fields(&self) -> Result<Vec<FieldSpec>, ConfigError> {
        let mut fields = match &self.preset {
            Some(name) => preset_fields(name)?,
            None => Vec::new(),
        };
        fields.extend(self.fields.iter().cloned());
        Ok(fields)
    }

    /// Returns the configured link pattern, falling back to the preset's
    pub fn resolved_link_pattern(&self) -> Option<String> {
        self.link_pattern.clone().or_else(|| {
            self.preset
                .as_deref()
                .and_then(preset_link_pattern)
                .map(str::to_string)
        })
    }
}

/// A single named field of the extraction schema
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldSpec {
    /// Field name in the extracted record
    pub name: String,

    /// CSS selector, evaluated against the document or the enclosing match
    pub selector: String,

    /// How the matched element is turned into a value
    #[serde(default)]
    pub kind: FieldKind,

    /// Attribute to read instead of the element text
    #[serde(default)]
    pub attribute: Option<String>,

    /// Sub-fields for `nested` kind
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl FieldSpec {
    pub fn new(name: &str, selector: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            kind,
            attribute: None,
            fields: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attribute = Some(attribute.to_string());
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.fields = fields;
        self
    }
}

/// Extraction rule for a field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    /// Trimmed text of the first match
    #[default]
    Text,
    /// Attribute value of the first match
    Attribute,
    /// Text (or attribute) of every match
    List,
    /// Number parsed from the first match's text (or attribute)
    Number,
    /// "Month Day, Year" date parsed from the first match
    Date,
    /// One sub-record per match
    Nested,
}
