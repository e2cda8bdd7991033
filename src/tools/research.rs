use std::time::Instant;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::{ToolHandler, ToolId, count, estimate_tokens, timestamp};
use crate::context::ServerContext;
use crate::format::Tree;
use crate::registry::{BoundArguments, FieldSpec, FieldType, ToolContract};
use crate::services::{
    Depth, ResearchProject, ResearchSettings, StatusFilter, UsageEvent,
};

const DEFAULT_LIST_LIMIT: usize = 20;

// ─────────────────────────────────────────────────────────────────────────────
// start_research
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct StartResearch {
    ctx: ServerContext,
}

impl StartResearch {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for StartResearch {
    fn id(&self) -> ToolId {
        ToolId::StartResearch
    }

    fn contract(&self) -> ToolContract {
        ToolContract::new(self.id().as_str(), "Start a new deep research project")
            .field(FieldSpec::required(
                "research_question",
                FieldType::String,
                "The main research question",
            ))
            .field(FieldSpec::optional("title", FieldType::String, "Project title"))
            .field(FieldSpec::optional(
                "description",
                FieldType::String,
                "Project description",
            ))
            .field(FieldSpec::optional(
                "initial_urls",
                FieldType::array_of(FieldType::String),
                "Starting URLs for research",
            ))
            .field(
                FieldSpec::optional(
                    "max_sources",
                    FieldType::Integer,
                    "Maximum number of sources to consult",
                )
                .default_value(json!(8)),
            )
            .field(
                FieldSpec::optional(
                    "include_contradictions",
                    FieldType::Boolean,
                    "Whether to look for contradicting evidence",
                )
                .default_value(json!(true)),
            )
            .field(
                FieldSpec::optional(
                    "citation_format",
                    FieldType::one_of(&["apa", "mla", "chicago"]),
                    "Bibliography style",
                )
                .default_value(json!("apa")),
            )
    }

    async fn call(&self, args: BoundArguments) -> anyhow::Result<Tree> {
        let question = args.required_str("research_question")?;
        let settings = ResearchSettings {
            max_sources: args.i64("max_sources").unwrap_or(8),
            include_contradictions: args.flag("include_contradictions"),
            citation_format: args.parsed("citation_format")?.unwrap_or_default(),
        };

        let mut project =
            ResearchProject::new(question, args.str("title").map(String::from), settings);
        project.description = args.str("description").map(String::from);
        project.initial_urls = args.strings("initial_urls");

        self.ctx
            .projects
            .save(project.clone())
            .await
            .context("failed to save research project")?;
        info!(name: "research.started", project_id = %project.project_id, "Research project created");

        Ok(Tree::mapping()
            .with("success", true)
            .with("message", format!("Research project '{}' started", project.title))
            .with("project", Tree::serialized(&project)?))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// research_interactive
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ResearchInteractive {
    ctx: ServerContext,
}

impl ResearchInteractive {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ResearchInteractive {
    fn id(&self) -> ToolId {
        ToolId::ResearchInteractive
    }

    fn contract(&self) -> ToolContract {
        ToolContract::new(
            self.id().as_str(),
            "Run a research pass on a question and return a summary",
        )
        .field(FieldSpec::required(
            "question",
            FieldType::String,
            "Research question",
        ))
        .field(
            FieldSpec::optional(
                "depth",
                FieldType::one_of(&["quick", "standard", "comprehensive"]),
                "Research depth",
            )
            .default_value(json!("standard")),
        )
        .field(
            FieldSpec::optional(
                "format",
                FieldType::one_of(&["json", "markdown"]),
                "Summary format",
            )
            .default_value(json!("markdown")),
        )
        .field(
            FieldSpec::optional("max_sources", FieldType::Integer, "Maximum number of sources")
                .default_value(json!(5)),
        )
    }

    async fn call(&self, args: BoundArguments) -> anyhow::Result<Tree> {
        let question = args.required_str("question")?;
        let depth: Depth = args.parsed("depth")?.unwrap_or_default();
        let format = args.str("format").unwrap_or("markdown");
        let max_sources = args.i64("max_sources").unwrap_or(5);
        let max_sources = usize::try_from(max_sources)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| anyhow!("max_sources must be greater than zero, got {max_sources}"))?;

        let started = Instant::now();
        let summary = self.ctx.analyst.summarize(question, depth, max_sources).await?;
        self.ctx.usage.record(
            UsageEvent::new("local", "heuristic", self.id().as_str())
                .tokens(estimate_tokens(question), estimate_tokens(&summary))
                .took(started.elapsed()),
        );

        Ok(Tree::mapping()
            .with("success", true)
            .with("question", question)
            .with("depth", depth.as_str())
            .with("summary", summary)
            .with("format", format)
            .with("timestamp", timestamp()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// list_research_projects
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ListResearchProjects {
    ctx: ServerContext,
}

impl ListResearchProjects {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx }
    }
}

fn project_summary(project: &ResearchProject) -> Tree {
    Tree::mapping()
        .with("project_id", project.project_id.as_str())
        .with("title", project.title.as_str())
        .with("research_question", project.research_question.as_str())
        .with("status", project.status.as_str())
        .with("initial_url_count", project.initial_urls.len())
        .with("created_at", project.created_at.to_rfc3339())
}

#[async_trait]
impl ToolHandler for ListResearchProjects {
    fn id(&self) -> ToolId {
        ToolId::ListResearchProjects
    }

    fn contract(&self) -> ToolContract {
        ToolContract::new(self.id().as_str(), "List research projects, newest first")
            .field(
                FieldSpec::optional(
                    "status",
                    FieldType::one_of(&["all", "initiated", "in_progress", "completed", "failed"]),
                    "Only list projects in this state",
                )
                .default_value(json!("all")),
            )
            .field(
                FieldSpec::optional(
                    "limit",
                    FieldType::Integer,
                    "Maximum number of projects to return",
                )
                .default_value(json!(DEFAULT_LIST_LIMIT)),
            )
    }

    async fn call(&self, args: BoundArguments) -> anyhow::Result<Tree> {
        let filter: StatusFilter = args.parsed("status")?.unwrap_or(StatusFilter::All);
        let limit = count(args.i64("limit"), DEFAULT_LIST_LIMIT);

        let matching: Vec<ResearchProject> = self
            .ctx
            .projects
            .list()
            .await?
            .into_iter()
            .rev()
            .filter(|p| filter.matches(p.status))
            .collect();
        let total = matching.len();
        let projects: Vec<Tree> = matching.iter().take(limit).map(project_summary).collect();

        Ok(Tree::mapping()
            .with("success", true)
            .with("projects", projects)
            .with("total", total)
            .with("filtered_by", filter.as_str())
            .with("timestamp", timestamp()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// export_research_report
// ─────────────────────────────────────────────────────────────────────────────

/// Report encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportFormat {
    Markdown,
    Html,
    Json,
}

impl ReportFormat {
    fn parse(name: &str) -> anyhow::Result<Self> {
        match name {
            "markdown" => Ok(Self::Markdown),
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("unsupported report format: {other}")),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sections {
    bibliography: bool,
    evidence: bool,
}

fn bibliography(project: &ResearchProject) -> Vec<String> {
    project
        .initial_urls
        .iter()
        .map(|url| project.config.citation_format.cite(url, project.created_at))
        .collect()
}

fn markdown_report(project: &ResearchProject, sections: Sections) -> String {
    let mut out = vec![
        format!("# Research Report: {}", project.title),
        format!(
            "**Project ID:** {}\n**Research Question:** {}\n**Status:** {}\n**Created:** {}\n**Citation Format:** {}",
            project.project_id,
            project.research_question,
            project.status,
            project.created_at.format("%Y-%m-%d %H:%M:%S"),
            project.config.citation_format.as_str(),
        ),
    ];
    if let Some(description) = &project.description {
        out.push(format!("## Description\n\n{description}"));
    }
    if sections.evidence {
        let body = if project.initial_urls.is_empty() {
            "No evidence has been collected yet.".to_string()
        } else {
            let sources: Vec<String> = project
                .initial_urls
                .iter()
                .enumerate()
                .map(|(i, url)| format!("{}. {url}", i + 1))
                .collect();
            format!(
                "Sources queued ({}):\n\n{}",
                project.initial_urls.len(),
                sources.join("\n")
            )
        };
        out.push(format!("## Evidence Summary\n\n{body}"));
    }
    if sections.bibliography {
        let entries = bibliography(project);
        let body = if entries.is_empty() {
            "No sources recorded.".to_string()
        } else {
            entries
                .iter()
                .enumerate()
                .map(|(i, entry)| format!("[{}] {entry}", i + 1))
                .collect::<Vec<_>>()
                .join("\n")
        };
        out.push(format!("## Bibliography\n\n{body}"));
    }
    out.join("\n\n")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn html_list(tag: &str, items: &[String]) -> String {
    let entries: String = items
        .iter()
        .map(|item| format!("<li>{}</li>", escape_html(item)))
        .collect();
    format!("<{tag}>{entries}</{tag}>")
}

fn html_report(project: &ResearchProject, sections: Sections) -> String {
    let title = escape_html(&project.title);
    let mut body = vec![
        format!("<h1>Research Report: {title}</h1>"),
        format!(
            "<p><strong>Project ID:</strong> {}<br><strong>Research Question:</strong> {}<br><strong>Status:</strong> {}<br><strong>Created:</strong> {}</p>",
            escape_html(&project.project_id),
            escape_html(&project.research_question),
            project.status,
            project.created_at.format("%Y-%m-%d %H:%M:%S"),
        ),
    ];
    if let Some(description) = &project.description {
        body.push(format!("<h2>Description</h2><p>{}</p>", escape_html(description)));
    }
    if sections.evidence {
        let evidence = if project.initial_urls.is_empty() {
            "<p>No evidence has been collected yet.</p>".to_string()
        } else {
            html_list("ol", &project.initial_urls)
        };
        body.push(format!("<h2>Evidence Summary</h2>{evidence}"));
    }
    if sections.bibliography {
        let entries = bibliography(project);
        let list = if entries.is_empty() {
            "<p>No sources recorded.</p>".to_string()
        } else {
            html_list("ol", &entries)
        };
        body.push(format!("<h2>Bibliography</h2>{list}"));
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n{}\n</body>\n</html>",
        body.join("\n")
    )
}

fn json_report(project: &ResearchProject, sections: Sections) -> anyhow::Result<Tree> {
    let mut report = Tree::serialized(project)?;
    if sections.bibliography {
        report.insert("bibliography", bibliography(project));
    }
    if sections.evidence {
        report.insert(
            "evidence",
            Tree::mapping()
                .with("sources", project.initial_urls.clone())
                .with("collected", 0_u64),
        );
    }
    Ok(report)
}

#[derive(Debug)]
pub struct ExportResearchReport {
    ctx: ServerContext,
}

impl ExportResearchReport {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ExportResearchReport {
    fn id(&self) -> ToolId {
        ToolId::ExportResearchReport
    }

    fn contract(&self) -> ToolContract {
        ToolContract::new(
            self.id().as_str(),
            "Export a research project as a formatted report",
        )
        .field(FieldSpec::required(
            "project_id",
            FieldType::String,
            "Research project identifier",
        ))
        .field(
            FieldSpec::optional(
                "format",
                FieldType::one_of(&["markdown", "html", "json"]),
                "Report format",
            )
            .default_value(json!("markdown")),
        )
        .field(
            FieldSpec::optional(
                "include_bibliography",
                FieldType::Boolean,
                "Whether to include the bibliography",
            )
            .default_value(json!(true)),
        )
        .field(
            FieldSpec::optional(
                "include_evidence",
                FieldType::Boolean,
                "Whether to include the evidence summary",
            )
            .default_value(json!(true)),
        )
    }

    async fn call(&self, args: BoundArguments) -> anyhow::Result<Tree> {
        let project_id = args.required_str("project_id")?;
        let format = ReportFormat::parse(args.str("format").unwrap_or("markdown"))?;
        let sections = Sections {
            bibliography: args.flag("include_bibliography"),
            evidence: args.flag("include_evidence"),
        };

        let project = self
            .ctx
            .projects
            .load(project_id)
            .await?
            .ok_or_else(|| anyhow!("Research project not found: {project_id}"))?;

        let report = match format {
            ReportFormat::Markdown => Tree::text(markdown_report(&project, sections)),
            ReportFormat::Html => Tree::text(html_report(&project, sections)),
            ReportFormat::Json => json_report(&project, sections)?,
        };

        Ok(Tree::mapping()
            .with("success", true)
            .with("project_id", project_id)
            .with("format", format.as_str())
            .with("report", report)
            .with("export_timestamp", Utc::now().to_rfc3339()))
    }
}
