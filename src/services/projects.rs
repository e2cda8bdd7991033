//! Research projects and their storage.

use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Initiated,
    InProgress,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status filter for listings; `all` matches every project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(ProjectStatus),
}

impl StatusFilter {
    pub fn matches(self, status: ProjectStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == status,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Only(status) => status.as_str(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown project status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for StatusFilter {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "all" => return Ok(Self::All),
            "initiated" => ProjectStatus::Initiated,
            "in_progress" => ProjectStatus::InProgress,
            "completed" => ProjectStatus::Completed,
            "failed" => ProjectStatus::Failed,
            other => return Err(UnknownStatus(other.to_string())),
        };
        Ok(Self::Only(status))
    }
}

/// Bibliography style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationFormat {
    #[default]
    Apa,
    Mla,
    Chicago,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown citation format: {0}")]
pub struct UnknownCitationFormat(pub String);

impl FromStr for CitationFormat {
    type Err = UnknownCitationFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apa" => Ok(Self::Apa),
            "mla" => Ok(Self::Mla),
            "chicago" => Ok(Self::Chicago),
            other => Err(UnknownCitationFormat(other.to_string())),
        }
    }
}

impl CitationFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apa => "apa",
            Self::Mla => "mla",
            Self::Chicago => "chicago",
        }
    }

    /// Formats a web source accessed at `accessed`.
    pub fn cite(self, url: &str, accessed: DateTime<Utc>) -> String {
        let site = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
            .unwrap_or_else(|| url.to_string());
        match self {
            Self::Apa => format!(
                "{site}. ({}). Retrieved {} from {url}",
                accessed.format("%Y"),
                accessed.format("%B %-d, %Y")
            ),
            Self::Mla => format!("\"{site}.\" Web. {}. <{url}>.", accessed.format("%-d %b. %Y")),
            Self::Chicago => format!("{site}. Accessed {}. {url}.", accessed.format("%B %-d, %Y")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResearchSettings {
    pub max_sources: i64,
    pub include_contradictions: bool,
    pub citation_format: CitationFormat,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResearchProject {
    pub project_id: String,
    pub title: String,
    pub research_question: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub initial_urls: Vec<String>,
    pub config: ResearchSettings,
    pub created_at: DateTime<Utc>,
}

/// Titles derived from the question keep this many characters.
const TITLE_QUESTION_CHARS: usize = 50;

impl ResearchProject {
    /// A new project in the `initiated` state.
    pub fn new(
        research_question: impl Into<String>,
        title: Option<String>,
        config: ResearchSettings,
    ) -> Self {
        let research_question = research_question.into();
        let created_at = Utc::now();
        let title = title.unwrap_or_else(|| {
            let head: String = research_question.chars().take(TITLE_QUESTION_CHARS).collect();
            format!("Research: {head}...")
        });
        Self {
            project_id: new_project_id(created_at),
            title,
            research_question,
            description: None,
            status: ProjectStatus::Initiated,
            initial_urls: Vec::new(),
            config,
            created_at,
        }
    }
}

/// `research_<YYYYmmdd_HHMMSS>_<8 hex chars>`.
pub fn new_project_id(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("research_{}_{}", at.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Keyed project persistence.
#[async_trait]
pub trait ProjectStore: Send + Sync + fmt::Debug {
    /// Inserts or replaces a project.
    async fn save(&self, project: ResearchProject) -> anyhow::Result<()>;
    async fn load(&self, project_id: &str) -> anyhow::Result<Option<ResearchProject>>;
    /// All projects in the order they were first saved.
    async fn list(&self) -> anyhow::Result<Vec<ResearchProject>>;
}

/// Process-local store; contents are lost at exit.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: RwLock<IndexMap<String, ResearchProject>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn save(&self, project: ResearchProject) -> anyhow::Result<()> {
        let mut guard = self.projects.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(project.project_id.clone(), project);
        Ok(())
    }

    async fn load(&self, project_id: &str) -> anyhow::Result<Option<ResearchProject>> {
        let guard = self.projects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(project_id).cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<ResearchProject>> {
        let guard = self.projects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings() -> ResearchSettings {
        ResearchSettings {
            max_sources: 8,
            include_contradictions: true,
            citation_format: CitationFormat::Apa,
        }
    }

    #[test]
    fn project_defaults() {
        let question = "How do memory allocators affect latency in long running async services?";
        let project = ResearchProject::new(question, None, settings());
        assert_eq!(project.status, ProjectStatus::Initiated);
        assert_eq!(
            project.title,
            "Research: How do memory allocators affect latency in long ru..."
        );
        assert!(project.project_id.starts_with("research_"));
        assert_eq!(project.project_id.len(), "research_20260101_000000_abcdef12".len());
    }

    #[test]
    fn status_filter_parsing() {
        assert_eq!("all".parse::<StatusFilter>(), Ok(StatusFilter::All));
        let only = "in_progress".parse::<StatusFilter>().unwrap();
        assert!(only.matches(ProjectStatus::InProgress));
        assert!(!only.matches(ProjectStatus::Completed));
        assert_eq!(only.as_str(), "in_progress");
        assert!("archived".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn citations() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        let url = "https://www.example.com/paper";
        assert_eq!(
            CitationFormat::Apa.cite(url, at),
            "example.com. (2024). Retrieved March 5, 2024 from https://www.example.com/paper"
        );
        assert_eq!(
            CitationFormat::Mla.cite(url, at),
            "\"example.com.\" Web. 5 Mar. 2024. <https://www.example.com/paper>."
        );
        assert_eq!(
            CitationFormat::Chicago.cite(url, at),
            "example.com. Accessed March 5, 2024. https://www.example.com/paper."
        );
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryProjectStore::new();
        let mut first = ResearchProject::new("first question", Some("First".into()), settings());
        first.project_id = "p1".into();
        let mut second = ResearchProject::new("second question", None, settings());
        second.project_id = "p2".into();

        store.save(first.clone()).await.unwrap();
        store.save(second).await.unwrap();
        first.status = ProjectStatus::Completed;
        store.save(first.clone()).await.unwrap();

        assert_eq!(store.load("p1").await.unwrap(), Some(first));
        assert_eq!(store.load("missing").await.unwrap(), None);
        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.project_id)
            .collect();
        assert_eq!(ids, ["p1", "p2"]);
    }
}
