//! Canonical URL forms used as node keys and edge endpoints.
//!
//! Two spellings of the same resource must map to the same string, so every
//! URL that enters the graph goes through [`normalize_url`].

use crate::error::{Result, ScanError};
use url::Url;

/// Reduce a URL to scheme + host (+ non-default port) + path.
///
/// Query strings, fragments and userinfo are dropped. An empty path becomes
/// `/`, and a trailing slash is removed from any other path.
pub fn normalize_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim())
        .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", raw, e)))?;
    canonical(parsed).ok_or_else(|| ScanError::InvalidUrl(format!("{}: not an http(s) URL", raw)))
}

/// Resolve an `href` found on `base` into a normalized absolute URL.
///
/// Returns `None` for anchors, non-navigational schemes and anything that
/// does not resolve to an http(s) URL.
pub fn resolve_link(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let base_url = Url::parse(base).ok()?;
    let resolved = base_url.join(href).ok()?;
    canonical(resolved)
}

/// True when `url` is on `base_host` or one of its subdomains.
pub fn same_host(url: &str, base_host: &str) -> bool {
    if let Ok(parsed) = Url::parse(url)
        && let Some(host) = parsed.host_str()
    {
        return host == base_host || host.ends_with(&format!(".{}", base_host));
    }
    false
}

/// Host component of a URL, if it has one.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

fn canonical(mut url: Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    url.set_fragment(None);
    url.set_query(None);
    // Only fails for cannot-be-a-base URLs, which http(s) never are.
    let _ = url.set_username("");
    let _ = url.set_password(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
        if url.path().is_empty() {
            url.set_path("/");
        }
    }

    Some(url.to_string())
}
