use std::sync::LazyLock;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use super::{ToolHandler, ToolId, estimate_tokens, timestamp};
use crate::batch::{BatchSummary, run_batch};
use crate::context::ServerContext;
use crate::format::{OutputFormat, Tree, serialize};
use crate::registry::{BoundArguments, FieldSpec, FieldType, ToolContract};
use crate::services::{ContentKind, PageContent, UsageEvent};

pub const MAX_LINKS: usize = 50;
pub const MAX_LINK_TEXT: usize = 100;
const DEFAULT_BATCH_TIMEOUT_SECS: i64 = 30;

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("href pattern")
});

fn output_format_field(allowed: &[&'static str], default: &'static str) -> FieldSpec {
    FieldSpec::optional("output_format", FieldType::one_of(allowed), "Result encoding")
        .default_value(json!(default))
}

fn content_type_field() -> FieldSpec {
    FieldSpec::optional(
        "content_type",
        FieldType::one_of(&["html", "json", "text"]),
        "Expected document type",
    )
    .default_value(json!("html"))
}

/// A hyperlink found on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub url: String,
    pub text: String,
    pub domain: String,
}

impl From<Link> for Tree {
    fn from(link: Link) -> Self {
        Tree::mapping()
            .with("url", link.url)
            .with("text", link.text)
            .with("domain", link.domain)
    }
}

/// Absolute http(s) links in `html`, resolved against `base`.
///
/// At most [`MAX_LINKS`] are returned; link text is the last path segment of
/// the raw `href`, cut to [`MAX_LINK_TEXT`] characters.
pub fn extract_links(html: &str, base: &str) -> Vec<Link> {
    let Ok(base) = Url::parse(base) else {
        return Vec::new();
    };
    HREF.captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|href| !href.starts_with('#'))
        .filter_map(|href| {
            let absolute = base.join(href).ok()?;
            if !matches!(absolute.scheme(), "http" | "https") {
                return None;
            }
            let domain = absolute.host_str()?.to_string();
            let text = href
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .unwrap_or(href)
                .chars()
                .take(MAX_LINK_TEXT)
                .collect();
            Some(Link {
                url: absolute.into(),
                text,
                domain,
            })
        })
        .take(MAX_LINKS)
        .collect()
}

/// Structural quality estimate in `[0.5, 1.0]`.
pub fn quality_score(content: &str) -> f64 {
    let lower = content.to_lowercase();
    let length = content.chars().count();

    let mut tenths: u8 = 5;
    if length > 1000 {
        tenths += 2;
    } else if length > 500 {
        tenths += 1;
    }
    if lower.contains("<title") {
        tenths += 1;
    }
    if lower.contains("<h1") || lower.contains("<h2") {
        tenths += 1;
    }
    if lower.contains("<p>") || lower.contains("<p ") {
        tenths += 1;
    }
    f64::from(tenths.min(10)) / 10.0
}

#[derive(Debug, Clone)]
struct ScrapeRequest {
    url: String,
    format: OutputFormat,
    kind: ContentKind,
    extract_links: bool,
    max_content_length: Option<usize>,
}

fn truncate(content: &str, limit: Option<usize>) -> String {
    match limit {
        Some(limit) if limit > 0 && content.chars().count() > limit => {
            let mut head: String = content.chars().take(limit).collect();
            head.push_str("...");
            head
        }
        _ => content.to_string(),
    }
}

fn links_of(page: &PageContent, wanted: bool) -> Vec<Tree> {
    if wanted && page.kind == ContentKind::Html {
        extract_links(&page.content, &page.url)
            .into_iter()
            .map(Tree::from)
            .collect()
    } else {
        Vec::new()
    }
}

fn page_data(page: &PageContent, request: &ScrapeRequest, elapsed: Duration) -> Tree {
    let response_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    Tree::mapping()
        .with("url", page.url.as_str())
        .with("title", page.title.clone())
        .with("content", truncate(&page.content, request.max_content_length))
        .with("content_length", page.content.chars().count())
        .with("content_type", page.kind.as_str())
        .with("fetch_timestamp", page.fetched_at.to_rfc3339())
        .with("quality_score", quality_score(&page.content))
        .with("links", links_of(page, request.extract_links))
        .with(
            "metadata",
            Tree::mapping()
                .with("status_code", u64::from(page.status_code))
                .with("response_time_ms", response_time_ms),
        )
}

/// Fetches one page and wraps it as a result envelope. Fetch failures come
/// back as `success: false`.
async fn scrape(ctx: &ServerContext, request: &ScrapeRequest) -> Tree {
    let started = Instant::now();
    match ctx.fetcher.fetch(&request.url, request.kind).await {
        Ok(page) => Tree::mapping()
            .with("success", true)
            .with("data", serialize(page_data(&page, request, started.elapsed()), request.format))
            .with("format", request.format.as_str())
            .with("timestamp", timestamp()),
        Err(error) => {
            warn!(name: "scrape.failed", url = %request.url, error = %error, "Fetch failed");
            Tree::mapping()
                .with("success", false)
                .with("error", error.to_string())
                .with("url", request.url.as_str())
                .with("timestamp", timestamp())
        }
    }
}

fn succeeded(result: &Tree) -> bool {
    result.get("success").and_then(Tree::as_bool) == Some(true)
}

// ─────────────────────────────────────────────────────────────────────────────
// scrape_url
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ScrapeUrl {
    ctx: ServerContext,
}

impl ScrapeUrl {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ScrapeUrl {
    fn id(&self) -> ToolId {
        ToolId::ScrapeUrl
    }

    fn contract(&self) -> ToolContract {
        ToolContract::new(
            self.id().as_str(),
            "Scrape content from a single URL with structured output formatting",
        )
        .field(FieldSpec::required("url", FieldType::String, "URL to scrape"))
        .field(output_format_field(&["json", "xml", "markdown"], "json"))
        .field(content_type_field())
        .field(
            FieldSpec::optional("extract_links", FieldType::Boolean, "Whether to extract links")
                .default_value(json!(false)),
        )
        .field(FieldSpec::optional(
            "max_content_length",
            FieldType::Integer,
            "Maximum content length in characters",
        ))
    }

    async fn call(&self, args: BoundArguments) -> anyhow::Result<Tree> {
        let request = ScrapeRequest {
            url: args.required_str("url")?.to_string(),
            format: args.parsed("output_format")?.unwrap_or_default(),
            kind: args.parsed("content_type")?.unwrap_or_default(),
            extract_links: args.flag("extract_links"),
            max_content_length: args
                .i64("max_content_length")
                .and_then(|n| usize::try_from(n).ok()),
        };
        Ok(scrape(&self.ctx, &request).await)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// scrape_multiple_urls
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ScrapeMultipleUrls {
    ctx: ServerContext,
}

impl ScrapeMultipleUrls {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ScrapeMultipleUrls {
    fn id(&self) -> ToolId {
        ToolId::ScrapeMultipleUrls
    }

    fn contract(&self) -> ToolContract {
        ToolContract::new(
            self.id().as_str(),
            "Scrape multiple URLs concurrently with batch processing",
        )
        .field(FieldSpec::required(
            "urls",
            FieldType::array_of(FieldType::String),
            "List of URLs to scrape",
        ))
        .field(output_format_field(&["json", "xml", "markdown"], "json"))
        .field(FieldSpec::optional(
            "concurrent_limit",
            FieldType::Integer,
            "Maximum number of pages fetched at once (server setting when omitted)",
        ))
        .field(
            FieldSpec::optional("timeout", FieldType::Integer, "Per-URL timeout in seconds")
                .default_value(json!(DEFAULT_BATCH_TIMEOUT_SECS)),
        )
    }

    async fn call(&self, args: BoundArguments) -> anyhow::Result<Tree> {
        let urls = args.strings("urls");
        let format: OutputFormat = args.parsed("output_format")?.unwrap_or_default();
        let limit = args
            .i64("concurrent_limit")
            .unwrap_or(self.ctx.settings.scraper.concurrent_limit);
        let timeout_secs = args.i64("timeout").unwrap_or(DEFAULT_BATCH_TIMEOUT_SECS);
        let timeout = u64::try_from(timeout_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| anyhow!("timeout must be a positive number of seconds, got {timeout_secs}"))?;

        let ctx = &self.ctx;
        let report = run_batch(urls.clone(), limit, move |_, url| {
            let request = ScrapeRequest {
                url,
                format,
                kind: ContentKind::Html,
                extract_links: false,
                max_content_length: None,
            };
            async move {
                tokio::time::timeout(timeout, scrape(ctx, &request))
                    .await
                    .with_context(|| format!("timed out after {timeout_secs}s"))
            }
        })
        .await?;

        let results: Vec<Tree> = report
            .items
            .into_iter()
            .map(|item| match item.outcome {
                Ok(result) => result,
                Err(error) => Tree::mapping()
                    .with("success", false)
                    .with("index", item.index)
                    .with("url", urls.get(item.index).cloned())
                    .with("error", error),
            })
            .collect();

        let successful = results.iter().filter(|r| succeeded(r)).count();
        let summary = BatchSummary::from_counts(successful, results.len());
        info!(
            name: "scrape.batch",
            total = summary.total,
            successful = summary.successful,
            "Batch scrape finished"
        );

        Ok(Tree::mapping()
            .with("success", true)
            .with("results", results)
            .with(
                "summary",
                Tree::mapping()
                    .with("total_urls", summary.total)
                    .with("successful", summary.successful)
                    .with("failed", summary.failed)
                    .with("success_rate", summary.success_rate),
            )
            .with("timestamp", timestamp()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// analyze_url
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct AnalyzeUrl {
    ctx: ServerContext,
}

impl AnalyzeUrl {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for AnalyzeUrl {
    fn id(&self) -> ToolId {
        ToolId::AnalyzeUrl
    }

    fn contract(&self) -> ToolContract {
        ToolContract::new(
            self.id().as_str(),
            "Fetch a page and answer a question about its content",
        )
        .field(FieldSpec::required("url", FieldType::String, "URL to analyze"))
        .field(FieldSpec::required(
            "question",
            FieldType::String,
            "Question to answer from the page content",
        ))
        .field(output_format_field(&["json", "markdown"], "markdown"))
        .field(content_type_field())
        .field(
            FieldSpec::optional("extract_links", FieldType::Boolean, "Whether to include page links")
                .default_value(json!(false)),
        )
    }

    async fn call(&self, args: BoundArguments) -> anyhow::Result<Tree> {
        let url = args.required_str("url")?;
        let question = args.required_str("question")?;
        let format = args
            .parsed("output_format")?
            .unwrap_or(OutputFormat::Markdown);
        let kind: ContentKind = args.parsed("content_type")?.unwrap_or_default();

        let started = Instant::now();
        let page = match self.ctx.fetcher.fetch(url, kind).await {
            Ok(page) => page,
            Err(error) => {
                warn!(name: "analyze.fetch_failed", url, error = %error, "Fetch failed");
                return Ok(Tree::mapping()
                    .with("success", false)
                    .with("error", format!("Failed to fetch content: {error}"))
                    .with("url", url)
                    .with("timestamp", timestamp()));
            }
        };

        let analysis = self.ctx.analyst.answer(&page.content, question).await?;
        self.ctx.usage.record(
            UsageEvent::new("local", "heuristic", self.id().as_str())
                .tokens(estimate_tokens(&page.content), estimate_tokens(&analysis.answer))
                .took(started.elapsed()),
        );

        let mut data = Tree::mapping()
            .with("url", url)
            .with("title", page.title.clone())
            .with("question", question)
            .with("analysis", analysis.answer)
            .with("findings", analysis.findings)
            .with("content_length", page.content.chars().count());
        if args.flag("extract_links") {
            data.insert("links", links_of(&page, true));
        }

        Ok(Tree::mapping()
            .with("success", true)
            .with("data", serialize(data, format))
            .with("format", format.as_str())
            .with("timestamp", timestamp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::StaticFetcher;
    use crate::tools::invoke;

    const PAGE: &str = r##"<html><head><title>Example Domain</title></head>
        <body><h1>Example</h1><p>Features: fast lookups and simple setup.</p>
        <a href="/docs/">Docs</a> <a href='https://other.example/about'>About</a>
        <a href="#top">Top</a> <a href="mailto:hi@example.com">Mail</a></body></html>"##;

    fn ctx() -> ServerContext {
        ServerContext::offline(
            StaticFetcher::new()
                .with_page("https://example.com/", PAGE)
                .with_page("https://example.com/plain", "x".repeat(600))
                .with_slow_page("https://slow.example/", "late", Duration::from_secs(5))
                .with_status("https://broken.example/", 500),
        )
    }

    #[test]
    fn links_are_absolute_and_filtered() {
        let links = extract_links(PAGE, "https://example.com/");
        assert_eq!(
            links,
            vec![
                Link {
                    url: "https://example.com/docs/".into(),
                    text: "docs".into(),
                    domain: "example.com".into(),
                },
                Link {
                    url: "https://other.example/about".into(),
                    text: "about".into(),
                    domain: "other.example".into(),
                },
            ]
        );
    }

    #[test]
    fn link_count_and_text_are_capped() {
        let long = "a".repeat(150);
        let html: String = (0..60)
            .map(|i| format!("<a href=\"/{long}{i}\">x</a>"))
            .collect();
        let links = extract_links(&html, "https://example.com");
        assert_eq!(links.len(), MAX_LINKS);
        assert!(links.iter().all(|l| l.text.chars().count() == MAX_LINK_TEXT));
    }

    #[test]
    fn quality_scoring() {
        assert!((quality_score("plain") - 0.5).abs() < f64::EPSILON);
        assert!((quality_score(PAGE) - 0.8).abs() < f64::EPSILON);
        let rich = format!("<title>t</title><h2>h</h2><p>{}</p>", "w".repeat(1200));
        assert!((quality_score(&rich) - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn scrape_url_truncates_and_extracts_links() {
        let result = invoke(
            &ScrapeUrl::new(ctx()),
            json!({"url": "https://example.com/plain", "max_content_length": 10}),
        )
        .await;
        assert_eq!(result.get("success").and_then(Tree::as_bool), Some(true));
        assert_eq!(result.get("format").and_then(Tree::as_str), Some("json"));
        let data = result.get("data").unwrap();
        assert_eq!(
            data.get("content").and_then(Tree::as_str),
            Some("xxxxxxxxxx...")
        );
        assert_eq!(data.get("content_length").and_then(Tree::as_u64), Some(600));

        let result = invoke(
            &ScrapeUrl::new(ctx()),
            json!({"url": "https://example.com/", "extract_links": true}),
        )
        .await;
        let data = result.get("data").unwrap();
        assert_eq!(data.get("title").and_then(Tree::as_str), Some("Example Domain"));
        assert_eq!(data.get("links").and_then(Tree::as_sequence).map(<[Tree]>::len), Some(2));
    }

    #[tokio::test]
    async fn scrape_url_renders_requested_format() {
        let result = invoke(
            &ScrapeUrl::new(ctx()),
            json!({"url": "https://example.com/", "output_format": "xml"}),
        )
        .await;
        let xml = result.get("data").and_then(Tree::as_str).unwrap();
        assert!(xml.starts_with("<scrape_result>"));
        assert!(xml.contains("<title>Example Domain</title>"));
    }

    #[tokio::test]
    async fn scrape_url_failure_is_degraded() {
        let result = invoke(&ScrapeUrl::new(ctx()), json!({"url": "https://broken.example/"})).await;
        assert_eq!(result.get("success").and_then(Tree::as_bool), Some(false));
        assert_eq!(
            result.get("error").and_then(Tree::as_str),
            Some("https://broken.example/ returned HTTP 500")
        );
        assert_eq!(result.get("url").and_then(Tree::as_str), Some("https://broken.example/"));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_counts_degraded_and_timed_out_items_as_failed() {
        let result = invoke(
            &ScrapeMultipleUrls::new(ctx()),
            json!({
                "urls": ["https://example.com/", "https://broken.example/", "https://slow.example/"],
                "concurrent_limit": 2,
                "timeout": 1
            }),
        )
        .await;

        let results = result.get("results").and_then(Tree::as_sequence).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].get("success").and_then(Tree::as_bool), Some(true));
        assert_eq!(results[1].get("success").and_then(Tree::as_bool), Some(false));
        assert_eq!(results[2].get("index").and_then(Tree::as_u64), Some(2));
        assert_eq!(
            results[2].get("error").and_then(Tree::as_str),
            Some("timed out after 1s: deadline has elapsed")
        );

        let summary = result.get("summary").unwrap();
        assert_eq!(summary.get("total_urls").and_then(Tree::as_u64), Some(3));
        assert_eq!(summary.get("successful").and_then(Tree::as_u64), Some(1));
        assert_eq!(summary.get("failed").and_then(Tree::as_u64), Some(2));
    }

    #[tokio::test]
    async fn batch_rejects_non_positive_limits() {
        let handler = ScrapeMultipleUrls::new(ctx());
        let mut registry = crate::registry::ToolRegistry::new();
        registry.register(handler.contract()).unwrap();
        let args = registry
            .validate(
                "scrape_multiple_urls",
                &json!({"urls": ["https://example.com/"], "concurrent_limit": 0}),
            )
            .unwrap();
        let err = handler.call(args).await.unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[tokio::test]
    async fn batch_limit_falls_back_to_server_setting() {
        let handler = ScrapeMultipleUrls::new(ctx());
        assert!(
            handler
                .contract()
                .field_spec("concurrent_limit")
                .is_some_and(|f| f.default.is_none())
        );

        let mut settings = crate::config::AppConfig::default();
        settings.scraper.concurrent_limit = 0;
        let fetcher = StaticFetcher::new().with_page("https://example.com/", PAGE);
        let handler = ScrapeMultipleUrls::new(ServerContext::with_fetcher(
            settings,
            std::sync::Arc::new(fetcher),
        ));
        let mut registry = crate::registry::ToolRegistry::new();
        registry.register(handler.contract()).unwrap();

        let args = registry
            .validate("scrape_multiple_urls", &json!({"urls": ["https://example.com/"]}))
            .unwrap();
        let err = handler.call(args).await.unwrap_err();
        assert!(err.to_string().contains("got 0"), "{err}");

        let args = registry
            .validate(
                "scrape_multiple_urls",
                &json!({"urls": ["https://example.com/"], "concurrent_limit": 1}),
            )
            .unwrap();
        let result = handler.call(args).await.unwrap();
        let summary = result.get("summary").unwrap();
        assert_eq!(summary.get("successful").and_then(Tree::as_u64), Some(1));
    }

    #[tokio::test]
    async fn analyze_url_answers_and_records_usage() {
        let ctx = ctx();
        let result = invoke(
            &AnalyzeUrl::new(ctx.clone()),
            json!({
                "url": "https://example.com/",
                "question": "What features does it offer?",
                "output_format": "json"
            }),
        )
        .await;
        let data = result.get("data").unwrap();
        let analysis = data.get("analysis").and_then(Tree::as_str).unwrap();
        assert!(analysis.starts_with("Key findings:"));
        assert_eq!(ctx.usage.global().total_requests, 1);

        let result = invoke(
            &AnalyzeUrl::new(ctx),
            json!({"url": "https://missing.example/", "question": "anything?"}),
        )
        .await;
        assert_eq!(result.get("success").and_then(Tree::as_bool), Some(false));
        assert!(
            result
                .get("error")
                .and_then(Tree::as_str)
                .unwrap()
                .starts_with("Failed to fetch content:")
        );
    }
}
