//! Web access.
//!
//! Provides:
//! - [`HttpContentFetcher`]: the content collaborator behind the
//!   `WEBCONTENT_*` pseudo-commands, with typed failure kinds.
//! - `get_website_content`: the same fetch exposed as a model tool.
//! - `ddgs_search`: DuckDuckGo search through its HTML endpoint.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::FetchConfig;
use crate::error::{RelayError, Result};

use super::{Tool, ToolContext};

const WEB_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) chatrelay/0.3";
const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const DDG_MAX_RESULTS: usize = 5;
/// Bytes read per character of output, to leave room for multi-byte UTF-8.
const BYTES_PER_CHAR: usize = 4;

// ============================================================================
// Content fetcher
// ============================================================================

/// Why a page could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("connection to {url} failed")]
    Connect { url: String },
    #[error("connecting to {url} timed out")]
    ConnectTimeout { url: String },
    #[error("reading {url} timed out")]
    ReadTimeout { url: String },
    #[error("fetching {url} failed: {reason}")]
    Other { url: String, reason: String },
}

impl FetchError {
    pub fn other(url: &str, reason: impl Into<String>) -> Self {
        FetchError::Other {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Classify a transport error. A timeout during connect is a
    /// `ConnectTimeout`; any other timeout happened while reading.
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_connect() && err.is_timeout() {
            FetchError::ConnectTimeout { url }
        } else if err.is_timeout() {
            FetchError::ReadTimeout { url }
        } else if err.is_connect() {
            FetchError::Connect { url }
        } else {
            FetchError::Other {
                url,
                reason: err.to_string(),
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Connect { url }
            | FetchError::ConnectTimeout { url }
            | FetchError::ReadTimeout { url }
            | FetchError::Other { url, .. } => url,
        }
    }

    /// Human-readable explanation of the failure, one per kind.
    pub fn apology(&self) -> String {
        match self {
            FetchError::Connect { url } => format!(
                "Failed to connect to the website {}. Please check the URL or try again later.",
                url
            ),
            FetchError::ConnectTimeout { url } => format!(
                "Connecting to the website {} timed out. The server might be down or unreachable.",
                url
            ),
            FetchError::ReadTimeout { url } => format!(
                "The website {} took too long to respond. It might be unavailable or too large.",
                url
            ),
            FetchError::Other { url, .. } if url.is_empty() => {
                "Failed to get content of the website".to_string()
            }
            FetchError::Other { url, .. } => {
                format!("Failed to get content of the website {}", url)
            }
        }
    }
}

/// Something that turns a URL into readable text.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> std::result::Result<String, FetchError>;
}

/// Plain HTTP GET with HTML reduced to title and body text.
pub struct HttpContentFetcher {
    client: Client,
    max_chars: usize,
}

impl HttpContentFetcher {
    pub fn new(request_timeout: Duration, max_chars: usize) -> Self {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(request_timeout)
            .timeout(request_timeout)
            .user_agent(WEB_USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            max_chars: max_chars.max(1),
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            Duration::from_secs(config.request_timeout_secs),
            config.max_chars,
        )
    }
}

impl Default for HttpContentFetcher {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch_text(&self, url: &str) -> std::result::Result<String, FetchError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| FetchError::other(url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::other(url, "only http/https URLs are allowed"));
        }

        debug!(url, "Fetching web content");
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::other(url, format!("HTTP {}", status)));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);

        let body = read_body_limited(response, self.max_chars * BYTES_PER_CHAR)
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        let text = if is_html || body.trim_start().starts_with('<') {
            html_to_text(&body)
        } else {
            body
        };

        Ok(text.chars().take(self.max_chars).collect())
    }
}

/// Reduce an HTML document to `# title` followed by its readable text.
pub fn html_to_text(html: &str) -> String {
    let title = extract_title(html).unwrap_or_default();
    let text = extract_text(html);
    if title.is_empty() {
        text
    } else {
        format!("# {}\n\n{}", title, text)
    }
}

fn extract_title(html: &str) -> Option<String> {
    let regex = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?;
    let raw = regex.captures(html)?.get(1)?.as_str();
    let title = normalize_whitespace(&decode_common_html_entities(raw));
    (!title.is_empty()).then_some(title)
}

fn extract_text(html: &str) -> String {
    let without_head = strip_regex(html, r"(?is)<head[^>]*>.*?</head>", " ");
    let without_scripts = strip_regex(&without_head, r"(?is)<script[^>]*>.*?</script>", " ");
    let without_styles = strip_regex(&without_scripts, r"(?is)<style[^>]*>.*?</style>", " ");
    let without_noscript =
        strip_regex(&without_styles, r"(?is)<noscript[^>]*>.*?</noscript>", " ");
    let without_tags = strip_regex(&without_noscript, r"(?is)<[^>]+>", " ");

    normalize_whitespace(&decode_common_html_entities(&without_tags))
}

fn strip_regex(input: &str, pattern: &str, replacement: &str) -> String {
    match Regex::new(pattern) {
        Ok(regex) => regex.replace_all(input, replacement).into_owned(),
        Err(_) => input.to_string(),
    }
}

pub(crate) fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn decode_common_html_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Read a response body in chunks, stopping at `max_bytes`.
async fn read_body_limited(
    mut response: reqwest::Response,
    max_bytes: usize,
) -> std::result::Result<String, reqwest::Error> {
    let mut buf: Vec<u8> = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        let remaining = max_bytes.saturating_sub(buf.len());
        let take = chunk.len().min(remaining);
        buf.extend_from_slice(&chunk[..take]);
        if buf.len() >= max_bytes {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// ============================================================================
// get_website_content
// ============================================================================

/// Model tool wrapping a [`ContentFetcher`]. Failures come back as text.
pub struct GetWebsiteContentTool {
    fetcher: Box<dyn ContentFetcher>,
}

impl GetWebsiteContentTool {
    pub fn new(fetcher: Box<dyn ContentFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Tool for GetWebsiteContentTool {
    fn name(&self) -> &str {
        "get_website_content"
    }

    fn description(&self) -> &str {
        "Tool for obtaining the content of a website. Can be used to resume the content of a \
         webpage or online article or give your opinion about it. In general, can be used to \
         obtain the content of a web when necessary."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "http/https URL of the page"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();

        match self.fetcher.fetch_text(url).await {
            Ok(text) => Ok(text),
            Err(err) => {
                let text = match &err {
                    FetchError::Connect { .. } => {
                        error!(url, "Connection error connecting to web content");
                        err.apology()
                    }
                    FetchError::ConnectTimeout { url } | FetchError::ReadTimeout { url } => {
                        error!(url = %url, "Timeout error connecting to web content");
                        FetchError::ReadTimeout { url: url.clone() }.apology()
                    }
                    FetchError::Other { reason, .. } => {
                        error!(url, reason = %reason, "Error connecting to web content");
                        "Failed to get content of the website".to_string()
                    }
                };
                Ok(text)
            }
        }
    }
}

// ============================================================================
// ddgs_search
// ============================================================================

/// One DuckDuckGo result.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SearchHit {
    pub title: String,
    pub href: String,
    pub body: String,
}

/// Web search through DuckDuckGo's HTML endpoint. No API key needed.
pub struct DdgSearchTool {
    client: Client,
    max_results: usize,
}

impl DdgSearchTool {
    pub fn new(request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(WEB_USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            max_results: DDG_MAX_RESULTS,
        }
    }
}

/// Parse the result list out of a DuckDuckGo HTML page.
pub fn parse_ddg_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse("div.result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    document
        .select(&result_sel)
        .filter_map(|result| {
            let link = result.select(&title_sel).next()?;
            let href = link.value().attr("href")?.to_string();
            let title = normalize_whitespace(&link.text().collect::<Vec<_>>().join(" "));
            let body = result
                .select(&snippet_sel)
                .next()
                .map(|s| normalize_whitespace(&s.text().collect::<Vec<_>>().join(" ")))
                .unwrap_or_default();
            Some(SearchHit {
                title,
                href: resolve_ddg_href(&href),
                body,
            })
        })
        .take(max_results)
        .collect()
}

/// DuckDuckGo wraps targets as `//duckduckgo.com/l/?uddg=<encoded>`.
fn resolve_ddg_href(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    reqwest::Url::parse(&absolute)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

#[async_trait]
impl Tool for DdgSearchTool {
    fn name(&self) -> &str {
        "ddgs_search"
    }

    fn description(&self) -> &str {
        "Search the web with DuckDuckGo. Returns up to 5 results with title, href and body."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RelayError::Tool("Missing 'query' parameter".to_string()))?;

        let response = self
            .client
            .post(DDG_HTML_URL)
            .form(&[("q", query)])
            .send()
            .await
            .map_err(|e| RelayError::Tool(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RelayError::Tool(format!(
                "Search failed with HTTP {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        let hits = parse_ddg_results(&html, self.max_results);
        debug!(query, results = hits.len(), "DuckDuckGo search");
        if hits.is_empty() {
            return Ok(format!("No results found for '{}'", query));
        }
        Ok(serde_json::to_string(&hits)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingFetcher(FetchError);

    #[async_trait]
    impl ContentFetcher for FailingFetcher {
        async fn fetch_text(&self, _url: &str) -> std::result::Result<String, FetchError> {
            Err(self.0.clone())
        }
    }

    struct StaticFetcher;

    #[async_trait]
    impl ContentFetcher for StaticFetcher {
        async fn fetch_text(&self, url: &str) -> std::result::Result<String, FetchError> {
            Ok(format!("content of {}", url))
        }
    }

    fn tool_with(err: FetchError) -> GetWebsiteContentTool {
        GetWebsiteContentTool::new(Box::new(FailingFetcher(err)))
    }

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><title>Hello &amp; bye</title><style>p{}</style></head>\
                    <body><script>alert(1)</script><p>Test   content</p></body></html>";
        assert_eq!(html_to_text(html), "# Hello & bye\n\nTest content");
    }

    #[test]
    fn test_html_to_text_without_title() {
        assert_eq!(
            html_to_text("<html><body>Test content</body></html>"),
            "Test content"
        );
    }

    #[test]
    fn test_apologies_are_distinct() {
        let url = "https://example.com";
        let texts = [
            FetchError::Connect { url: url.into() }.apology(),
            FetchError::ConnectTimeout { url: url.into() }.apology(),
            FetchError::ReadTimeout { url: url.into() }.apology(),
            FetchError::other(url, "boom").apology(),
        ];
        for (i, a) in texts.iter().enumerate() {
            assert!(a.contains(url));
            for b in texts.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert!(texts[1].contains("timed out"));
    }

    #[tokio::test]
    async fn test_tool_success() {
        let tool = GetWebsiteContentTool::new(Box::new(StaticFetcher));
        let out = tool
            .execute(json!({"url": "https://example.com"}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(out, "content of https://example.com");
    }

    #[tokio::test]
    async fn test_tool_connection_error_text() {
        let tool = tool_with(FetchError::Connect {
            url: "https://example.com".into(),
        });
        let out = tool
            .execute(json!({"url": "https://example.com"}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(
            out,
            "Failed to connect to the website https://example.com. Please check the URL or try again later."
        );
    }

    #[tokio::test]
    async fn test_tool_timeout_text() {
        for err in [
            FetchError::ConnectTimeout {
                url: "https://example.com".into(),
            },
            FetchError::ReadTimeout {
                url: "https://example.com".into(),
            },
        ] {
            let out = tool_with(err)
                .execute(json!({"url": "https://example.com"}), &ToolContext::new())
                .await
                .unwrap();
            assert_eq!(
                out,
                "The website https://example.com took too long to respond. It might be unavailable or too large."
            );
        }
    }

    #[tokio::test]
    async fn test_tool_other_error_text() {
        let out = tool_with(FetchError::other("https://example.com", "HTTP 500"))
            .execute(json!({"url": "https://example.com"}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(out, "Failed to get content of the website");
    }

    #[tokio::test]
    async fn test_fetcher_rejects_non_http() {
        let fetcher = HttpContentFetcher::default();
        let err = fetcher.fetch_text("ftp://example.com/file").await.unwrap_err();
        assert!(matches!(err, FetchError::Other { .. }));
        let err = fetcher.fetch_text("not a url").await.unwrap_err();
        assert_eq!(err.url(), "not a url");
    }

    #[test]
    fn test_parse_ddg_results() {
        let html = r#"
            <div class="result results_links">
              <h2><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=x">Rust Programming Language</a></h2>
              <a class="result__snippet">A language empowering everyone.</a>
            </div>
            <div class="result">
              <h2><a class="result__a" href="https://doc.rust-lang.org/book/">The Book</a></h2>
            </div>"#;
        let hits = parse_ddg_results(html, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Rust Programming Language");
        assert_eq!(hits[0].href, "https://www.rust-lang.org/");
        assert_eq!(hits[0].body, "A language empowering everyone.");
        assert_eq!(hits[1].href, "https://doc.rust-lang.org/book/");
        assert!(hits[1].body.is_empty());
    }

    #[test]
    fn test_parse_ddg_results_caps_count() {
        let one = r#"<div class="result"><a class="result__a" href="https://a.example">A</a></div>"#;
        let html = one.repeat(8);
        assert_eq!(parse_ddg_results(&html, DDG_MAX_RESULTS).len(), 5);
    }

    #[tokio::test]
    async fn test_ddg_missing_query() {
        let tool = DdgSearchTool::new(Duration::from_secs(1));
        let err = tool.execute(json!({}), &ToolContext::new()).await.unwrap_err();
        assert!(err.to_string().contains("query"));
    }
}
