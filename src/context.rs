//! Process-wide state shared by tool handlers.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    ContentAnalyst, ContentFetcher, HeuristicAnalyst, HttpFetcher, MemoryProjectStore,
    ProjectStore, StaticFetcher, UsageLedger,
};

/// Created once at start-up and handed to the dispatcher. Call
/// [`ServerContext::shutdown`] before the process exits.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub settings: Arc<AppConfig>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub analyst: Arc<dyn ContentAnalyst>,
    pub projects: Arc<dyn ProjectStore>,
    pub usage: Arc<UsageLedger>,
}

impl ServerContext {
    /// Production wiring: HTTP fetcher, heuristic analyst, in-memory store.
    pub fn from_config(settings: AppConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(&settings.scraper)?;
        Ok(Self::with_fetcher(settings, Arc::new(fetcher)))
    }

    /// Offline wiring around the given fetcher.
    pub fn with_fetcher(settings: AppConfig, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            settings: Arc::new(settings),
            fetcher,
            analyst: Arc::new(HeuristicAnalyst),
            projects: Arc::new(MemoryProjectStore::new()),
            usage: Arc::new(UsageLedger::new()),
        }
    }

    /// Default settings with a [`StaticFetcher`].
    pub fn offline(fetcher: StaticFetcher) -> Self {
        Self::with_fetcher(AppConfig::default(), Arc::new(fetcher))
    }

    /// Flushes the usage ledger.
    pub fn shutdown(&self) {
        self.usage.flush();
    }
}
