//! Configuration module for aoty-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use aoty_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Crawling {} seeds", config.seeds.len());
//! ```

mod parser;
mod presets;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, ExtractionConfig, FieldKind, FieldSpec, OutputConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use presets::{
    preset_fields, preset_link_pattern, ALBUM_LINK_PATTERN, ARTIST_LINK_PATTERN,
    NEWS_LINK_PATTERN, PRESET_NAMES,
};
pub use validation::validate;
