//! Page fetching and main-content extraction.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::{Host, Url};
use viincci_core::{AppError, AppResult, SearchConfig};

use crate::retry::Retryable;

/// Paragraphs shorter than this are navigation or boilerplate.
const MIN_PARAGRAPH_CHARS: usize = 40;

/// A content root is accepted once it yields this much text.
const MIN_ROOT_CHARS: usize = 200;

/// Content roots tried in order before falling back to every `<p>`.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".article-body",
    "#content",
    ".content",
];

/// A fetched page reduced to plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,
    /// Document title, if any
    pub title: Option<String>,
    /// Extracted text
    pub text: String,
}

/// Errors that can occur while fetching a page.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("Timeout fetching {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {0} for {1}")]
    Status(u16, String),

    #[error("Unsupported content type '{content_type}' at {url}")]
    Unsupported { url: String, content_type: String },

    #[error("Too little content extracted from {url} ({chars} chars)")]
    NoContent { url: String, chars: usize },

    #[error("Unsafe URL blocked: {0}")]
    UnsafeUrl(String),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Status(code, _) => *code == 429 || *code >= 500,
            Self::Unsupported { .. } | Self::NoContent { .. } | Self::UnsafeUrl(_) => false,
        }
    }
}

/// Capability: retrieve the text of a web page.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed [`ContentFetcher`].
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &SearchConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if !is_safe_url(url) {
            return Err(FetchError::UnsafeUrl(url.to_string()));
        }

        tracing::debug!("Fetching content from: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16(), url.to_string()));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        let is_html = content_type.contains("html");
        if !is_html && !content_type.starts_with("text/plain") {
            return Err(FetchError::Unsupported {
                url: url.to_string(),
                content_type,
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let page = if is_html {
            let (title, text) = extract_html(&body);
            FetchedPage {
                url: final_url,
                title,
                text,
            }
        } else {
            FetchedPage {
                url: final_url,
                title: None,
                text: body.trim().to_string(),
            }
        };

        tracing::debug!("Fetched {} chars from: {}", page.text.len(), url);
        Ok(page)
    }
}

/// Only public http(s) hosts may be fetched.
pub fn is_safe_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    match parsed.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain != "localhost" && !domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => is_public_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_public_ip(IpAddr::V6(ip)),
        None => false,
    }
}

fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}

/// Reduce an HTML document to its title and main-content paragraphs.
pub fn extract_html(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);

    let title = Selector::parse("title").ok().and_then(|sel| {
        document
            .select(&sel)
            .next()
            .map(|t| clean_text(&t.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    });

    for selector_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(root) = document.select(&selector).next() {
            let text = paragraphs(root);
            if text.len() >= MIN_ROOT_CHARS {
                return (title, text);
            }
        }
    }

    (title, paragraphs(document.root_element()))
}

/// Paragraph texts under `root`, long enough to be prose, joined by blank lines.
fn paragraphs(root: ElementRef<'_>) -> String {
    let Ok(p) = Selector::parse("p") else {
        return String::new();
    };

    root.select(&p)
        .map(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| text.chars().count() >= MIN_PARAGRAPH_CHARS)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Collapse runs of whitespace.
fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
