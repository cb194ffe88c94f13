use crate::error::{FetchError, Result};
use crate::normalize::resolve_link;
use crate::result::PageRecord;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest description kept on a page record, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 300;

/// Bytes of a response body read before the rest is ignored.
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Turns a URL into page metadata.
///
/// Implementations must give up after `timeout` and report every failure as a
/// [`FetchError`] instead of panicking.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<PageRecord, FetchError>;
}

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| css("a[href]"));
static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| css("title"));
static OG_TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| css(r#"meta[property="og:title"]"#));
static PARAGRAPH_SELECTOR: LazyLock<Selector> = LazyLock::new(|| css("p"));

/// Description sources, in the order they are tried.
static DESCRIPTION_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"meta[name="description"]"#,
        r#"meta[property="og:description"]"#,
        r#"meta[name="twitter:description"]"#,
        r#"[itemprop="description"]"#,
    ]
    .into_iter()
    .map(css)
    .collect()
});

fn css(selector: &str) -> Selector {
    Selector::parse(selector).expect("static CSS selector must parse")
}

/// [`PageFetcher`] backed by a shared reqwest client.
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(10)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(
                "Rankcrawl/",
                env!("CARGO_PKG_VERSION"),
                " (https://github.com/trapdoorsec/rankcrawl)"
            ))
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs((timeout_secs / 2).max(1)))
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Stop reading bodies after `max_body_bytes`; links past the cut are not seen.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    async fn fetch_and_parse(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<PageRecord, FetchError> {
        debug!("Fetching {}", url);

        let start = Instant::now();
        let mut response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();

        if !is_html(&content_type) {
            return Err(FetchError::NotHtml {
                url: url.to_string(),
                content_type,
            });
        }

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(url, timeout, e))?
        {
            let room = self.max_body_bytes - bytes.len();
            if chunk.len() > room {
                bytes.extend_from_slice(&chunk[..room]);
                debug!("Truncated body of {} at {} bytes", url, self.max_body_bytes);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes);

        debug!("Fetched {} ({} bytes) in {:?}", url, body.len(), start.elapsed());

        Ok(extract_page(url, &body))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<PageRecord, FetchError> {
        // The client timeout covers the request; this also caps body download.
        match tokio::time::timeout(timeout, self.fetch_and_parse(url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }
}

fn is_html(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
}

/// Parse an HTML document fetched from `url` into a [`PageRecord`].
pub fn extract_page(url: &str, html: &str) -> PageRecord {
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let links: Vec<String> = document
        .select(&LINK_SELECTOR)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(url, href))
        .filter(|link| seen.insert(link.clone()))
        .collect();

    PageRecord {
        url: url.to_string(),
        outbound_links: links,
        title: extract_title(&document),
        description: extract_description(&document),
    }
}

fn extract_title(document: &Html) -> String {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            document
                .select(&OG_TITLE_SELECTOR)
                .next()
                .and_then(|m| m.value().attr("content"))
                .map(collapse_whitespace)
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_default()
}

fn extract_description(document: &Html) -> Option<String> {
    for selector in DESCRIPTION_SELECTORS.iter() {
        for element in document.select(selector) {
            let text = match element.value().attr("content") {
                Some(content) => collapse_whitespace(content),
                None => element_text(element),
            };
            if !text.is_empty() {
                return Some(truncate_chars(&text, MAX_DESCRIPTION_CHARS));
            }
        }
    }

    document
        .select(&PARAGRAPH_SELECTOR)
        .map(element_text)
        .find(|text| !text.is_empty())
        .map(|text| truncate_chars(&text, MAX_DESCRIPTION_CHARS))
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_links_resolved_and_deduplicated() {
        let html = r##"<html><body>
            <a href="/a">A</a>
            <a href="https://example.com/a#x">A again</a>
            <a href="b/">B</a>
            <a href="mailto:x@example.com">mail</a>
            <a href="#top">top</a>
            <a href="https://other.org">Other</a>
        </body></html>"##;

        let page = extract_page("https://example.com/dir/index", html);

        assert_eq!(
            page.outbound_links,
            vec![
                "https://example.com/a".to_string(),
                "https://example.com/dir/b".to_string(),
                "https://other.org/".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_title_falls_back_to_og_title() {
        let with_title = extract_page(
            "https://example.com/",
            "<html><head><title>  Hello\n  World </title></head></html>",
        );
        assert_eq!(with_title.title, "Hello World");

        let og_only = extract_page(
            "https://example.com/",
            r#"<html><head><meta property="og:title" content="From OG"></head></html>"#,
        );
        assert_eq!(og_only.title, "From OG");

        let none = extract_page("https://example.com/", "<html><body></body></html>");
        assert_eq!(none.title, "");
    }

    #[test]
    fn test_description_precedence() {
        let html = r#"<html><head>
            <meta property="og:description" content="og text">
            <meta name="description" content="meta text">
        </head><body><p>paragraph</p></body></html>"#;
        let page = extract_page("https://example.com/", html);
        assert_eq!(page.description.as_deref(), Some("meta text"));

        let html = r#"<html><head>
            <meta name="twitter:description" content="twitter text">
        </head><body><p>paragraph</p></body></html>"#;
        let page = extract_page("https://example.com/", html);
        assert_eq!(page.description.as_deref(), Some("twitter text"));

        let html = r#"<html><body><div itemprop="description">schema  text</div><p>p</p></body></html>"#;
        let page = extract_page("https://example.com/", html);
        assert_eq!(page.description.as_deref(), Some("schema text"));
    }

    #[test]
    fn test_description_falls_back_to_first_paragraph() {
        let html = "<html><body><p>   </p><p>First real paragraph.</p><p>Second.</p></body></html>";
        let page = extract_page("https://example.com/", html);
        assert_eq!(page.description.as_deref(), Some("First real paragraph."));

        let bare = extract_page("https://example.com/", "<html><body>text</body></html>");
        assert_eq!(bare.description, None);
    }

    #[test]
    fn test_description_is_truncated() {
        let long = "word ".repeat(200);
        let html = format!(r#"<html><head><meta name="description" content="{}"></head></html>"#, long);
        let page = extract_page("https://example.com/", &html);
        let description = page.description.unwrap();
        assert!(description.chars().count() <= MAX_DESCRIPTION_CHARS);
        assert!(description.starts_with("word word"));
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("application/xhtml+xml"));
        assert!(is_html("TEXT/HTML"));
        assert!(!is_html("application/json"));
        assert!(!is_html(""));
    }
}
