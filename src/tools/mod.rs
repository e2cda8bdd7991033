//! Tool handlers.
//!
//! Every tool is identified by a [`ToolId`] and implemented by a
//! [`ToolHandler`] that owns its contract. The dispatcher is assembled from
//! [`standard_handlers`] once at start-up; string lookups never reach a
//! handler that was not registered.

mod metrics;
mod research;
mod scrape;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::context::ServerContext;
use crate::dispatch::Dispatcher;
use crate::error::RegistryError;
use crate::format::Tree;
use crate::registry::{BoundArguments, ToolContract};

pub use metrics::TokenMetricsTool;
pub use research::{ExportResearchReport, ListResearchProjects, ResearchInteractive, StartResearch};
pub use scrape::{AnalyzeUrl, Link, ScrapeMultipleUrls, ScrapeUrl, extract_links, quality_score};

/// The fixed set of tools this server knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    ScrapeUrl,
    ScrapeMultipleUrls,
    StartResearch,
    ResearchInteractive,
    ListResearchProjects,
    ExportResearchReport,
    AnalyzeUrl,
    GetTokenMetrics,
}

impl ToolId {
    /// Registration order.
    pub const ALL: [ToolId; 8] = [
        Self::ScrapeUrl,
        Self::ScrapeMultipleUrls,
        Self::StartResearch,
        Self::ResearchInteractive,
        Self::ListResearchProjects,
        Self::ExportResearchReport,
        Self::AnalyzeUrl,
        Self::GetTokenMetrics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScrapeUrl => "scrape_url",
            Self::ScrapeMultipleUrls => "scrape_multiple_urls",
            Self::StartResearch => "start_research",
            Self::ResearchInteractive => "research_interactive",
            Self::ListResearchProjects => "list_research_projects",
            Self::ExportResearchReport => "export_research_report",
            Self::AnalyzeUrl => "analyze_url",
            Self::GetTokenMetrics => "get_token_metrics",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no tool named '{0}'")]
pub struct UnknownToolId(pub String);

impl FromStr for ToolId {
    type Err = UnknownToolId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownToolId(s.to_string()))
    }
}

/// A callable tool.
///
/// `call` receives arguments already validated against `contract()` with
/// defaults applied. Errors become internal-error envelopes; expected
/// failures such as an unreachable URL should instead be reported in the
/// result with `success: false`.
#[async_trait]
pub trait ToolHandler: Send + Sync + fmt::Debug {
    fn id(&self) -> ToolId;
    fn contract(&self) -> ToolContract;
    async fn call(&self, args: BoundArguments) -> anyhow::Result<Tree>;
}

/// All tools, in registration order, bound to `ctx`.
pub fn standard_handlers(ctx: &ServerContext) -> Vec<Arc<dyn ToolHandler>> {
    ToolId::ALL
        .into_iter()
        .map(|id| -> Arc<dyn ToolHandler> {
            let ctx = ctx.clone();
            match id {
                ToolId::ScrapeUrl => Arc::new(ScrapeUrl::new(ctx)),
                ToolId::ScrapeMultipleUrls => Arc::new(ScrapeMultipleUrls::new(ctx)),
                ToolId::StartResearch => Arc::new(StartResearch::new(ctx)),
                ToolId::ResearchInteractive => Arc::new(ResearchInteractive::new(ctx)),
                ToolId::ListResearchProjects => Arc::new(ListResearchProjects::new(ctx)),
                ToolId::ExportResearchReport => Arc::new(ExportResearchReport::new(ctx)),
                ToolId::AnalyzeUrl => Arc::new(AnalyzeUrl::new(ctx)),
                ToolId::GetTokenMetrics => Arc::new(TokenMetricsTool::new(ctx)),
            }
        })
        .collect()
}

/// Dispatcher over [`standard_handlers`].
pub fn dispatcher(ctx: &ServerContext) -> Result<Dispatcher, RegistryError> {
    Dispatcher::new(standard_handlers(ctx))
}

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// `{success: false, error, timestamp}` for failures reported in-band.
pub(crate) fn degraded(error: impl Into<String>) -> Tree {
    Tree::mapping()
        .with("success", false)
        .with("error", error.into())
        .with("timestamp", timestamp())
}

/// Rough token estimate for locally computed text: four characters a token.
pub(crate) fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}

/// Interprets an integer argument as a count; negative values become zero.
pub(crate) fn count(value: Option<i64>, fallback: usize) -> usize {
    value.map_or(fallback, |n| usize::try_from(n).unwrap_or(0))
}

/// Validates `arguments` against the handler's contract and runs it.
#[cfg(test)]
pub(crate) async fn invoke(handler: &dyn ToolHandler, arguments: serde_json::Value) -> Tree {
    let mut registry = crate::registry::ToolRegistry::new();
    registry.register(handler.contract()).unwrap();
    let bound = registry
        .validate(handler.id().as_str(), &arguments)
        .unwrap();
    handler.call(bound).await.unwrap()
}
