//! Content fetching.
//!
//! [`HttpFetcher`] talks to the network; [`StaticFetcher`] serves pages from
//! memory so tools can run offline and in tests.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::ScraperConfig;

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern"));

/// Expected kind of a fetched document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Html,
    Json,
    Text,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported content type: {0}")]
pub struct UnknownContentKind(pub String);

impl FromStr for ContentKind {
    type Err = UnknownContentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            _ => Err(UnknownContentKind(s.to_string())),
        }
    }
}

/// A fetched document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageContent {
    pub url: String,
    pub content: String,
    pub kind: ContentKind,
    pub title: Option<String>,
    pub status_code: u16,
    pub fetched_at: DateTime<Utc>,
}

impl PageContent {
    pub fn new(url: impl Into<String>, content: impl Into<String>, kind: ContentKind) -> Self {
        let content = content.into();
        let title = match kind {
            ContentKind::Html => extract_title(&content),
            _ => None,
        };
        Self {
            url: url.into(),
            content,
            kind,
            title,
            status_code: 200,
            fetched_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} exceeds the {limit} byte content limit")]
    TooLarge { url: String, limit: usize },

    #[error("no content available for {url}")]
    NotFound { url: String },
}

/// Retrieves documents by URL.
#[async_trait]
pub trait ContentFetcher: Send + Sync + fmt::Debug {
    async fn fetch(&self, url: &str, kind: ContentKind) -> Result<PageContent, FetchError>;
}

/// Text of the first `<title>` element, trimmed.
pub fn extract_title(html: &str) -> Option<String> {
    TITLE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Accepts only absolute http(s) URLs.
pub fn parse_target(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        scheme => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{scheme}'"),
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_content_length: usize,
}

impl HttpFetcher {
    pub fn new(settings: &ScraperConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
            .build()?;

        Ok(Self {
            client,
            max_content_length: settings.max_content_length,
        })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, kind: ContentKind) -> Result<PageContent, FetchError> {
        let target = parse_target(url)?;
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(target).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            warn!(name: "fetch.status", url, status = status.as_u16(), "Non-success response");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_content_length,
        };
        if response
            .content_length()
            .is_some_and(|len| len > self.max_content_length as u64)
        {
            return Err(too_large());
        }

        let body = response.text().await.map_err(request_error)?;
        if body.len() > self.max_content_length {
            return Err(too_large());
        }

        let content = match kind {
            // Normalised to compact JSON; bodies that do not parse stay as-is.
            ContentKind::Json => serde_json::from_str::<serde_json::Value>(&body)
                .map_or(body, |value| value.to_string()),
            _ => body,
        };

        debug!(name: "fetch.completed", url, bytes = content.len(), kind = %kind, "Fetched");
        let mut page = PageContent::new(url, content, kind);
        page.status_code = status.as_u16();
        Ok(page)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum StaticEntry {
    Page { body: String, delay: Option<Duration> },
    Status(u16),
}

/// Serves a fixed set of pages.
///
/// Unknown URLs yield [`FetchError::NotFound`].
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, StaticEntry>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(
            url.into(),
            StaticEntry::Page {
                body: body.into(),
                delay: None,
            },
        );
        self
    }

    /// A page that takes `delay` to arrive.
    #[must_use]
    pub fn with_slow_page(
        mut self,
        url: impl Into<String>,
        body: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.pages.insert(
            url.into(),
            StaticEntry::Page {
                body: body.into(),
                delay: Some(delay),
            },
        );
        self
    }

    /// A URL that answers with a non-success status.
    #[must_use]
    pub fn with_status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.pages.insert(url.into(), StaticEntry::Status(status));
        self
    }
}

#[async_trait]
impl ContentFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, kind: ContentKind) -> Result<PageContent, FetchError> {
        match self.pages.get(url) {
            Some(StaticEntry::Page { body, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(*delay).await;
                }
                Ok(PageContent::new(url, body.clone(), kind))
            }
            Some(StaticEntry::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
        }
    }
}
