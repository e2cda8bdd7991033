use async_trait::async_trait;
use serde_json::json;

use super::{ToolHandler, ToolId, count, degraded, timestamp};
use crate::context::ServerContext;
use crate::format::Tree;
use crate::registry::{BoundArguments, FieldSpec, FieldType, ToolContract};
use crate::services::usage::RECENT_CAPACITY;

const DEFAULT_RECENT_LIMIT: usize = 100;

/// `get_token_metrics`: reads the usage ledger.
#[derive(Debug)]
pub struct TokenMetricsTool {
    ctx: ServerContext,
}

impl TokenMetricsTool {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx }
    }

    fn recent(&self, session_id: Option<&str>, limit: usize) -> anyhow::Result<Tree> {
        let records = match session_id {
            None => self.ctx.usage.recent(limit),
            Some(id) => {
                let records: Vec<_> = self
                    .ctx
                    .usage
                    .recent(RECENT_CAPACITY)
                    .into_iter()
                    .filter(|u| u.session_id == id)
                    .collect();
                let skip = records.len().saturating_sub(limit);
                records.into_iter().skip(skip).collect()
            }
        };
        Ok(Tree::mapping()
            .with("success", true)
            .with("report_type", "recent")
            .with("count", records.len())
            .with("usage_records", Tree::serialized(&records)?)
            .with("timestamp", timestamp()))
    }

    fn detailed(&self, session_id: Option<&str>) -> anyhow::Result<Tree> {
        let Some(report) = self.ctx.usage.report(session_id) else {
            return Ok(unknown_session(session_id));
        };
        Ok(Tree::mapping()
            .with("success", true)
            .with("report_type", "detailed")
            .with("data", Tree::serialized(&report)?)
            .with("timestamp", timestamp()))
    }

    fn summary(&self, session_id: Option<&str>) -> anyhow::Result<Tree> {
        let metrics = match session_id {
            None => self.ctx.usage.global(),
            Some(id) => match self.ctx.usage.session(id) {
                Some(metrics) => metrics,
                None => return Ok(unknown_session(session_id)),
            },
        };
        Ok(Tree::mapping()
            .with("success", true)
            .with("report_type", "summary")
            .with("session_id", session_id)
            .with("metrics", Tree::serialized(&metrics)?)
            .with("timestamp", timestamp()))
    }
}

fn unknown_session(session_id: Option<&str>) -> Tree {
    degraded(format!(
        "No metrics found for session {}",
        session_id.unwrap_or_default()
    ))
}

#[async_trait]
impl ToolHandler for TokenMetricsTool {
    fn id(&self) -> ToolId {
        ToolId::GetTokenMetrics
    }

    fn contract(&self) -> ToolContract {
        ToolContract::new(
            self.id().as_str(),
            "Report token usage and cost metrics",
        )
        .field(FieldSpec::optional(
            "session_id",
            FieldType::String,
            "Restrict the report to one session",
        ))
        .field(
            FieldSpec::optional(
                "report_type",
                FieldType::one_of(&["summary", "detailed", "recent"]),
                "Kind of report",
            )
            .default_value(json!("summary")),
        )
        .field(
            FieldSpec::optional("limit", FieldType::Integer, "Number of recent records")
                .default_value(json!(DEFAULT_RECENT_LIMIT)),
        )
    }

    async fn call(&self, args: BoundArguments) -> anyhow::Result<Tree> {
        let session_id = args.str("session_id");
        match args.str("report_type").unwrap_or("summary") {
            "recent" => self.recent(session_id, count(args.i64("limit"), DEFAULT_RECENT_LIMIT)),
            "detailed" => self.detailed(session_id),
            _ => self.summary(session_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::{StaticFetcher, UsageEvent};
    use crate::tools::invoke;

    fn ctx_with_usage() -> ServerContext {
        let ctx = ServerContext::offline(StaticFetcher::new());
        for i in 0..3_u64 {
            ctx.usage.record(
                UsageEvent::new("openai", "gpt-4o-mini", "analyze_url")
                    .tokens(1000 * (i + 1), 100)
                    .took(Duration::from_millis(500))
                    .session("alpha"),
            );
        }
        ctx.usage.record(
            UsageEvent::new("local", "heuristic", "research_interactive")
                .tokens(10, 10)
                .session("beta"),
        );
        ctx
    }

    #[tokio::test]
    async fn summary_covers_everything_or_one_session() {
        let ctx = ctx_with_usage();
        let result = invoke(&TokenMetricsTool::new(ctx.clone()), json!({})).await;
        assert_eq!(result.get("report_type").and_then(Tree::as_str), Some("summary"));
        assert_eq!(result.get("session_id"), Some(&Tree::null()));
        let metrics = result.get("metrics").unwrap();
        assert_eq!(metrics.get("total_requests").and_then(Tree::as_u64), Some(4));

        let result = invoke(&TokenMetricsTool::new(ctx), json!({"session_id": "alpha"})).await;
        let metrics = result.get("metrics").unwrap();
        assert_eq!(metrics.get("total_requests").and_then(Tree::as_u64), Some(3));
        assert_eq!(metrics.get("total_input_tokens").and_then(Tree::as_u64), Some(6000));
    }

    #[tokio::test]
    async fn unknown_session_is_degraded() {
        let ctx = ctx_with_usage();
        for report_type in ["summary", "detailed"] {
            let result = invoke(
                &TokenMetricsTool::new(ctx.clone()),
                json!({"session_id": "gamma", "report_type": report_type}),
            )
            .await;
            assert_eq!(result.get("success").and_then(Tree::as_bool), Some(false));
            assert_eq!(
                result.get("error").and_then(Tree::as_str),
                Some("No metrics found for session gamma")
            );
        }
    }

    #[tokio::test]
    async fn recent_returns_the_latest_records() {
        let ctx = ctx_with_usage();
        let result = invoke(
            &TokenMetricsTool::new(ctx.clone()),
            json!({"report_type": "recent", "limit": 2}),
        )
        .await;
        assert_eq!(result.get("count").and_then(Tree::as_u64), Some(2));
        let records = result.get("usage_records").and_then(Tree::as_sequence).unwrap();
        assert_eq!(records[1].get("session_id").and_then(Tree::as_str), Some("beta"));

        let result = invoke(
            &TokenMetricsTool::new(ctx),
            json!({"report_type": "recent", "session_id": "alpha", "limit": 2}),
        )
        .await;
        let records = result.get("usage_records").and_then(Tree::as_sequence).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("input_tokens").and_then(Tree::as_u64), Some(3000));
    }

    #[tokio::test]
    async fn detailed_report_breaks_down_by_provider() {
        let result = invoke(
            &TokenMetricsTool::new(ctx_with_usage()),
            json!({"report_type": "detailed"}),
        )
        .await;
        let data = result.get("data").unwrap();
        let providers = data.get("provider_breakdown").unwrap();
        assert!(providers.get("openai").is_some());
        assert!(providers.get("local").is_some());
    }
}
