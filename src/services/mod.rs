//! Collaborators used by tool handlers.
//!
//! Each concern sits behind a narrow trait so handlers can be exercised
//! offline:
//!
//! - [`ContentFetcher`]: retrieve a document by URL
//! - [`ContentAnalyst`]: answer questions and summarise research
//! - [`ProjectStore`]: keyed research project persistence
//! - [`UsageLedger`]: token usage accounting

pub mod analysis;
pub mod fetch;
pub mod projects;
pub mod usage;

pub use analysis::{Analysis, ContentAnalyst, Depth, HeuristicAnalyst};
pub use fetch::{ContentFetcher, ContentKind, FetchError, HttpFetcher, PageContent, StaticFetcher};
pub use projects::{
    CitationFormat, MemoryProjectStore, ProjectStatus, ProjectStore, ResearchProject,
    ResearchSettings, StatusFilter,
};
pub use usage::{TokenMetrics, TokenUsage, UsageEvent, UsageLedger, UsageReport};
