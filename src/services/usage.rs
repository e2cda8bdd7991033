//! Token usage accounting.
//!
//! The ledger keeps global and per-session aggregates plus a bounded window
//! of recent records. It lives in the server context and is flushed once at
//! shutdown.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};

/// Records retained for `recent` queries and breakdowns.
pub const RECENT_CAPACITY: usize = 1000;

/// Price per million tokens (input, output) in USD.
const PRICES: &[(&str, &str, f64, f64)] = &[
    ("anthropic", "claude-3-5-sonnet-20241022", 3.00, 15.00),
    ("anthropic", "claude-3-5-haiku-20241022", 1.00, 5.00),
    ("anthropic", "claude-3-opus-20240229", 15.00, 75.00),
    ("openai", "gpt-4", 30.00, 60.00),
    ("openai", "gpt-4-turbo", 10.00, 30.00),
    ("openai", "gpt-3.5-turbo", 0.50, 1.50),
    ("perplexity", "sonar-pro", 1.00, 1.00),
    ("perplexity", "sonar-medium", 0.60, 0.60),
    ("google", "gemini-pro", 0.50, 1.50),
    ("google", "gemini-pro-vision", 0.50, 1.50),
    ("mistral", "mistral-large", 8.00, 24.00),
    ("mistral", "mistral-medium", 2.70, 8.10),
];

/// Cost of one call; unknown providers and models are free.
#[allow(clippy::cast_precision_loss)]
pub fn cost_usd(provider: &str, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let provider = provider.to_ascii_lowercase();
    PRICES
        .iter()
        .find(|(p, m, _, _)| *p == provider && *m == model)
        .map_or(0.0, |(_, _, input, output)| {
            (input_tokens as f64 / 1_000_000.0) * input + (output_tokens as f64 / 1_000_000.0) * output
        })
}

/// One completed model call, as reported by a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEvent {
    pub provider: String,
    pub model: String,
    pub operation: String,
    pub session_id: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

impl UsageEvent {
    pub fn new(provider: &str, model: &str, operation: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            operation: operation.to_string(),
            session_id: None,
            input_tokens: 0,
            output_tokens: 0,
            duration: Duration::ZERO,
            error: None,
        }
    }

    #[must_use]
    pub fn tokens(mut self, input: u64, output: u64) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }

    #[must_use]
    pub fn took(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// A stored usage record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenUsage {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub request_id: String,
    pub provider: String,
    pub model: String,
    pub operation: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub duration_seconds: f64,
    pub tokens_per_second: f64,
    pub cost_usd: f64,
    pub error: Option<String>,
}

/// Aggregated usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenMetrics {
    pub total_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub average_tokens_per_second: f64,
    pub total_duration_seconds: f64,
    pub error_count: u64,
}

impl TokenMetrics {
    #[allow(clippy::cast_precision_loss)]
    fn update(&mut self, usage: &TokenUsage) {
        self.total_requests += 1;
        self.total_input_tokens += usage.input_tokens;
        self.total_output_tokens += usage.output_tokens;
        self.total_tokens += usage.total_tokens;
        self.total_cost_usd += usage.cost_usd;
        self.total_duration_seconds += usage.duration_seconds;
        if usage.error.is_some() {
            self.error_count += 1;
        }
        if self.total_duration_seconds > 0.0 {
            self.average_tokens_per_second = self.total_tokens as f64 / self.total_duration_seconds;
        }
    }

    fn from_records<'a>(records: impl IntoIterator<Item = &'a TokenUsage>) -> Self {
        let mut metrics = Self::default();
        for usage in records {
            metrics.update(usage);
        }
        metrics
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEfficiency {
    pub cost_per_token: f64,
    pub cost_per_request: f64,
    pub average_request_size: f64,
}

/// Detailed usage report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub report_generated_at: DateTime<Utc>,
    pub session_id: Option<String>,
    pub overall_metrics: TokenMetrics,
    pub provider_breakdown: IndexMap<String, TokenMetrics>,
    pub operation_breakdown: IndexMap<String, TokenMetrics>,
    pub recent_usage_count: usize,
    pub cost_efficiency: CostEfficiency,
}

#[derive(Debug, Default)]
struct LedgerState {
    global: TokenMetrics,
    sessions: IndexMap<String, TokenMetrics>,
    recent: VecDeque<TokenUsage>,
}

/// Shared usage ledger.
#[derive(Debug, Default)]
pub struct UsageLedger {
    state: Mutex<LedgerState>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores an event and updates the aggregates.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&self, event: UsageEvent) -> TokenUsage {
        let now = Utc::now();
        let duration_seconds = event.duration.as_secs_f64();
        let total_tokens = event.input_tokens + event.output_tokens;
        let tokens_per_second = if duration_seconds > 0.0 {
            total_tokens as f64 / duration_seconds
        } else {
            0.0
        };

        let usage = TokenUsage {
            timestamp: now,
            session_id: event
                .session_id
                .unwrap_or_else(|| format!("session_{}", now.timestamp())),
            request_id: format!("req_{}", now.timestamp_millis()),
            cost_usd: cost_usd(&event.provider, &event.model, event.input_tokens, event.output_tokens),
            provider: event.provider,
            model: event.model,
            operation: event.operation,
            input_tokens: event.input_tokens,
            output_tokens: event.output_tokens,
            total_tokens,
            duration_seconds,
            tokens_per_second,
            error: event.error,
        };

        if let Some(error) = &usage.error {
            warn!(
                name: "usage.failed",
                operation = %usage.operation,
                session_id = %usage.session_id,
                error = %error,
                "Model operation failed"
            );
        } else {
            info!(
                name: "usage.recorded",
                operation = %usage.operation,
                session_id = %usage.session_id,
                provider = %usage.provider,
                model = %usage.model,
                total_tokens = usage.total_tokens,
                cost_usd = usage.cost_usd,
                "Model operation completed"
            );
        }

        let mut state = self.state();
        state.global.update(&usage);
        state
            .sessions
            .entry(usage.session_id.clone())
            .or_default()
            .update(&usage);
        if state.recent.len() == RECENT_CAPACITY {
            state.recent.pop_front();
        }
        state.recent.push_back(usage.clone());
        usage
    }

    pub fn global(&self) -> TokenMetrics {
        self.state().global.clone()
    }

    pub fn session(&self, session_id: &str) -> Option<TokenMetrics> {
        self.state().sessions.get(session_id).cloned()
    }

    /// Up to `limit` most recent records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<TokenUsage> {
        let state = self.state();
        let skip = state.recent.len().saturating_sub(limit);
        state.recent.iter().skip(skip).cloned().collect()
    }

    /// Global report, or a session report; `None` for an unknown session.
    #[allow(clippy::cast_precision_loss)]
    pub fn report(&self, session_id: Option<&str>) -> Option<UsageReport> {
        let state = self.state();
        let (overall, records): (TokenMetrics, Vec<&TokenUsage>) = match session_id {
            Some(id) => (
                state.sessions.get(id)?.clone(),
                state.recent.iter().filter(|u| u.session_id == id).collect(),
            ),
            None => (state.global.clone(), state.recent.iter().collect()),
        };

        let mut providers: IndexMap<String, Vec<&TokenUsage>> = IndexMap::new();
        let mut operations: IndexMap<String, Vec<&TokenUsage>> = IndexMap::new();
        for &usage in &records {
            providers.entry(usage.provider.clone()).or_default().push(usage);
            operations.entry(usage.operation.clone()).or_default().push(usage);
        }

        let per = |total: f64, count: u64| if count > 0 { total / count as f64 } else { 0.0 };
        let cost_efficiency = CostEfficiency {
            cost_per_token: per(overall.total_cost_usd, overall.total_tokens),
            cost_per_request: per(overall.total_cost_usd, overall.total_requests),
            average_request_size: per(overall.total_tokens as f64, overall.total_requests),
        };

        Some(UsageReport {
            report_generated_at: Utc::now(),
            session_id: session_id.map(ToString::to_string),
            provider_breakdown: providers
                .into_iter()
                .map(|(k, v)| (k, TokenMetrics::from_records(v)))
                .collect(),
            operation_breakdown: operations
                .into_iter()
                .map(|(k, v)| (k, TokenMetrics::from_records(v)))
                .collect(),
            recent_usage_count: records.len(),
            overall_metrics: overall,
            cost_efficiency,
        })
    }

    /// Logs the final totals.
    pub fn flush(&self) {
        let global = self.global();
        info!(
            name: "usage.flushed",
            total_requests = global.total_requests,
            total_tokens = global.total_tokens,
            total_cost_usd = global.total_cost_usd,
            "Usage ledger flushed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing() {
        let cost = cost_usd("Anthropic", "claude-3-5-sonnet-20241022", 1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
        assert!(cost_usd("ollama", "llama3", 5_000, 5_000).abs() < f64::EPSILON);
        assert!(cost_usd("openai", "unknown-model", 5_000, 5_000).abs() < f64::EPSILON);
    }

    #[test]
    fn record_updates_global_and_session_metrics() {
        let ledger = UsageLedger::new();
        let usage = ledger.record(
            UsageEvent::new("openai", "gpt-4", "analyze_url")
                .tokens(1000, 500)
                .took(Duration::from_secs(3))
                .session("s1"),
        );
        assert_eq!(usage.total_tokens, 1500);
        assert!((usage.tokens_per_second - 500.0).abs() < 1e-9);
        assert!((usage.cost_usd - 0.06).abs() < 1e-9);

        ledger.record(UsageEvent::new("local", "heuristic", "research_interactive").tokens(10, 0));

        let global = ledger.global();
        assert_eq!(global.total_requests, 2);
        assert_eq!(global.total_tokens, 1510);
        assert_eq!(ledger.session("s1").unwrap().total_requests, 1);
        assert!(ledger.session("nope").is_none());
    }

    #[test]
    fn recent_returns_newest_window() {
        let ledger = UsageLedger::new();
        for op in ["a", "b", "c"] {
            ledger.record(UsageEvent::new("local", "heuristic", op));
        }
        let ops: Vec<String> = ledger.recent(2).into_iter().map(|u| u.operation).collect();
        assert_eq!(ops, ["b", "c"]);
        assert_eq!(ledger.recent(10).len(), 3);
    }

    #[test]
    fn report_breaks_down_by_provider_and_operation() {
        let ledger = UsageLedger::new();
        ledger.record(UsageEvent::new("openai", "gpt-4", "scrape").tokens(100, 100).session("s"));
        ledger.record(UsageEvent::new("openai", "gpt-4", "analyze").tokens(100, 0).session("s"));
        ledger.record(UsageEvent::new("local", "heuristic", "analyze").tokens(50, 0).session("t"));

        let report = ledger.report(None).unwrap();
        assert_eq!(report.overall_metrics.total_requests, 3);
        assert_eq!(report.provider_breakdown["openai"].total_requests, 2);
        assert_eq!(report.operation_breakdown["analyze"].total_tokens, 150);
        assert_eq!(report.recent_usage_count, 3);
        assert!((report.cost_efficiency.average_request_size - 350.0 / 3.0).abs() < 1e-9);

        let session = ledger.report(Some("t")).unwrap();
        assert_eq!(session.recent_usage_count, 1);
        assert!(ledger.report(Some("missing")).is_none());
    }
}
