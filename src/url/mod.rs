//! URL handling module for aoty-harvest
//!
//! Target identifiers are normalized URLs. This module turns raw hrefs and
//! seed strings into those identifiers and derives the per-host key used for
//! politeness and per-host concurrency limits.

mod host;
mod normalize;

pub use host::{host_key, same_host};
pub use normalize::normalize_url;

use url::Url;

/// Resolves an href found on a page against the page URL
///
/// Returns None for hrefs that can never be fetched:
/// - empty or fragment-only hrefs
/// - `javascript:`, `mailto:`, `tel:` and `data:` schemes
/// - anything that does not resolve to http(s)
///
/// The result is normalized, so it can be used directly as a target identifier.
pub fn resolve_href(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    normalize_url(absolute.as_str()).ok()
}
