//! Schema-driven HTML extraction
//!
//! This module turns a fetched body into an `ExtractedRecord`:
//! - Field values are pulled through a compiled, ordered list of selectors
//! - Outbound links are resolved, normalized and filtered for discovery
//!
//! Absent or unparsable fields become `None`. The only hard failure is a body
//! that is not markup at all.

use crate::config::{ExtractionConfig, FieldKind, FieldSpec};
use crate::url::{resolve_href, same_host};
use crate::ConfigError;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use url::Url;

/// Field name to extracted value; `None` marks a field that was not found
pub type FieldMap = BTreeMap<String, Option<FieldValue>>;

/// Attributes whose values are resolved against the page URL
const URL_ATTRIBUTES: &[&str] = &["href", "src", "srcset", "data-src"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("body is not valid markup: {0}")]
    InvalidMarkup(String),
}

/// A single extracted value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    List(Vec<String>),
    Records(Vec<FieldMap>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Structured output of parsing one page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    /// Target identifier the body was fetched from
    pub source: String,

    /// Every schema field, in schema name order
    pub fields: FieldMap,

    /// Newly discovered target identifiers, in document order
    pub links: Vec<String>,
}

impl ExtractedRecord {
    /// Returns a field's value, or None if absent or not found
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(Option::as_ref)
    }

    /// Shorthand for text fields
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    /// True when no schema field matched anything
    pub fn is_blank(&self) -> bool {
        self.fields.values().all(Option::is_none)
    }
}

#[derive(Debug, Clone)]
struct CompiledField {
    name: String,
    selector: Selector,
    kind: FieldKind,
    attribute: Option<String>,
    fields: Vec<CompiledField>,
}

/// Extraction schema resolved at configuration-load time
#[derive(Debug, Clone)]
pub struct ExtractionSchema {
    fields: Vec<CompiledField>,
    link_pattern: Option<Regex>,
}

impl ExtractionSchema {
    /// Compiles field selectors and the optional link inclusion pattern
    pub fn compile(fields: &[FieldSpec], link_pattern: Option<&str>) -> Result<Self, ConfigError> {
        let fields = compile_fields(fields)?;

        let link_pattern = link_pattern
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
            })
            .transpose()?;

        Ok(Self {
            fields,
            link_pattern,
        })
    }

    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ConfigError> {
        let fields = config.resolved_fields()?;
        Self::compile(&fields, config.resolved_link_pattern().as_deref())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn link_pattern(&self) -> Option<&str> {
        self.link_pattern.as_ref().map(Regex::as_str)
    }

    /// Decides whether a resolved link is followed
    ///
    /// With a pattern, the absolute URL must match it. Without one, only
    /// links on the source page's host are followed.
    fn follows(&self, link: &Url, source: &Url) -> bool {
        match &self.link_pattern {
            Some(pattern) => pattern.is_match(link.as_str()),
            None => same_host(link, source),
        }
    }
}

fn compile_fields(specs: &[FieldSpec]) -> Result<Vec<CompiledField>, ConfigError> {
    specs
        .iter()
        .map(|spec| {
            let selector =
                Selector::parse(&spec.selector).map_err(|e| ConfigError::InvalidSelector {
                    field: spec.name.clone(),
                    message: format!("'{}': {:?}", spec.selector, e),
                })?;

            Ok(CompiledField {
                name: spec.name.clone(),
                selector,
                kind: spec.kind,
                attribute: spec.attribute.clone(),
                fields: compile_fields(&spec.fields)?,
            })
        })
        .collect()
}

/// Parses a fetched body against the schema
///
/// # Example
///
/// ```
/// use aoty_harvest::config::{FieldKind, FieldSpec};
/// use aoty_harvest::crawler::{parse, ExtractionSchema};
/// use url::Url;
///
/// let schema = ExtractionSchema::compile(&[FieldSpec::new("title", "h1", FieldKind::Text)], None).unwrap();
/// let source = Url::parse("http://example.test/1").unwrap();
/// let record = parse("<h1>Foo</h1>", &source, &schema).unwrap();
/// assert_eq!(record.text("title"), Some("Foo"));
/// assert!(record.links.is_empty());
/// ```
pub fn parse(body: &str, source: &Url, schema: &ExtractionSchema) -> Result<ExtractedRecord, ParseError> {
    check_markup(body)?;

    let document = Html::parse_document(body);

    let fields = extract_fields(Scope::Document(&document), &schema.fields, source);
    let links = extract_links(&document, source, schema);

    Ok(ExtractedRecord {
        source: source.to_string(),
        fields,
        links,
    })
}

/// Rejects bodies that contain no tags or look binary
fn check_markup(body: &str) -> Result<(), ParseError> {
    if body.contains('\0') {
        return Err(ParseError::InvalidMarkup("body contains NUL bytes".to_string()));
    }

    let has_tag = body
        .as_bytes()
        .windows(2)
        .any(|w| w[0] == b'<' && (w[1].is_ascii_alphabetic() || w[1] == b'!' || w[1] == b'/'));

    if !has_tag {
        return Err(ParseError::InvalidMarkup("no tags found".to_string()));
    }

    Ok(())
}

#[derive(Clone, Copy)]
enum Scope<'a> {
    Document(&'a Html),
    Element(ElementRef<'a>),
}

impl<'a> Scope<'a> {
    fn select(self, selector: &Selector) -> Vec<ElementRef<'a>> {
        match self {
            Scope::Document(document) => document.select(selector).collect(),
            Scope::Element(element) => element.select(selector).collect(),
        }
    }
}

fn extract_fields(scope: Scope<'_>, fields: &[CompiledField], source: &Url) -> FieldMap {
    fields
        .iter()
        .map(|field| (field.name.clone(), extract_value(scope, field, source)))
        .collect()
}

fn extract_value(scope: Scope<'_>, field: &CompiledField, source: &Url) -> Option<FieldValue> {
    let matches = scope.select(&field.selector);

    match field.kind {
        FieldKind::Text | FieldKind::Attribute => matches
            .iter()
            .find_map(|el| raw_value(*el, field, source))
            .map(FieldValue::Text),
        FieldKind::Number => matches
            .first()
            .and_then(|el| raw_value(*el, field, source))
            .and_then(|raw| parse_number(&raw))
            .map(FieldValue::Number),
        FieldKind::Date => matches
            .first()
            .and_then(|el| raw_value(*el, field, source))
            .and_then(|raw| parse_date(&raw))
            .map(FieldValue::Date),
        FieldKind::List => {
            let items: Vec<String> = matches
                .iter()
                .filter_map(|el| raw_value(*el, field, source))
                .collect();
            (!items.is_empty()).then_some(FieldValue::List(items))
        }
        FieldKind::Nested => {
            let rows: Vec<FieldMap> = matches
                .iter()
                .map(|el| extract_fields(Scope::Element(*el), &field.fields, source))
                .filter(|row| row.values().any(Option::is_some))
                .collect();
            (!rows.is_empty()).then_some(FieldValue::Records(rows))
        }
    }
}

/// Text or attribute value of one element, None when empty
fn raw_value(element: ElementRef<'_>, field: &CompiledField, source: &Url) -> Option<String> {
    let value = match field.attribute.as_deref() {
        Some(attribute) => attribute_value(element, attribute, source)?,
        None => collapse_whitespace(&element.text().collect::<String>()),
    };

    (!value.is_empty()).then_some(value)
}

fn attribute_value(element: ElementRef<'_>, attribute: &str, source: &Url) -> Option<String> {
    let attrs = element.value();

    let value = if attribute == "srcset" {
        // Highest-resolution candidate is listed last
        attrs
            .attr("srcset")
            .and_then(|srcset| srcset.split(',').filter_map(|c| c.split_whitespace().next()).last())
            .or_else(|| attrs.attr("data-src"))
            .or_else(|| attrs.attr("src"))?
    } else {
        attrs.attr(attribute)?
    };

    let value = value.trim();
    if URL_ATTRIBUTES.contains(&attribute) {
        if let Ok(resolved) = source.join(value) {
            return Some(resolved.to_string());
        }
    }
    Some(value.to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First finite number in the text, thousands separators ignored
///
/// Rank markers and parentheses around a token are dropped, so "#4" and
/// "(1,203)" both count.
fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "")
        .split_whitespace()
        .map(|token| token.trim_matches(|c| c == '#' || c == '(' || c == ')'))
        .find_map(|token| token.parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Accepts ISO dates and "Month Day, Year"
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Some(iso) = raw.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
            return Some(date);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%B %d, %Y") {
        return Some(date);
    }

    let compact: String = raw.split_whitespace().collect();
    NaiveDate::parse_from_str(&compact, "%B%d,%Y").ok()
}

/// Extracts followable links in document order, without duplicates
fn extract_links(document: &Html, source: &Url, schema: &ExtractionSchema) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let self_link = resolve_href(source.as_str(), source);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(link) = element.value().attr("href").and_then(|href| resolve_href(href, source)) else {
            continue;
        };

        if Some(&link) == self_link.as_ref() || !schema.follows(&link, source) {
            continue;
        }

        if seen.insert(link.to_string()) {
            links.push(link.to_string());
        }
    }

    links
}
