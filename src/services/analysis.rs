//! Question answering and research summaries over fetched text.
//!
//! [`HeuristicAnalyst`] works offline with regular expressions: it strips
//! markup, pulls out feature, method and financial phrases, and picks the
//! ones that fit the kind of question asked.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on findings returned for one question.
pub const MAX_FINDINGS: usize = 10;

/// How far a research request should dig.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Quick,
    #[default]
    Standard,
    Comprehensive,
}

impl Depth {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Standard => "standard",
            Self::Comprehensive => "comprehensive",
        }
    }

    /// Sources consulted for a request allowing `max_sources`.
    pub fn source_count(self, max_sources: usize) -> usize {
        match self {
            Self::Quick => max_sources.min(3),
            Self::Standard => max_sources,
            Self::Comprehensive => max_sources.saturating_mul(2),
        }
    }

    fn lines_of_inquiry(self) -> usize {
        match self {
            Self::Quick => 2,
            Self::Standard => 4,
            Self::Comprehensive => 6,
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown research depth: {0}")]
pub struct UnknownDepth(pub String);

impl FromStr for Depth {
    type Err = UnknownDepth;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quick" => Ok(Self::Quick),
            "standard" => Ok(Self::Standard),
            "comprehensive" => Ok(Self::Comprehensive),
            other => Err(UnknownDepth(other.to_string())),
        }
    }
}

/// Result of answering a question about one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analysis {
    pub findings: Vec<String>,
    /// Human-readable answer built from the findings.
    pub answer: String,
}

/// Text analysis used by the research and analysis tools.
#[async_trait]
pub trait ContentAnalyst: Send + Sync + fmt::Debug {
    /// Answers `question` from raw document `content`.
    async fn answer(&self, content: &str, question: &str) -> anyhow::Result<Analysis>;

    /// Produces a research summary for `question`.
    async fn summarize(&self, question: &str, depth: Depth, max_sources: usize) -> anyhow::Result<String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Patterns
// ─────────────────────────────────────────────────────────────────────────────

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static analysis pattern")
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| compile(p)).collect()
}

static SCRIPT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?is)<script[^>]*>.*?</script>"));
static STYLE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?is)<style[^>]*>.*?</style>"));
static COMMENT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)<!--.*?-->"));
static CSS_BLOCK: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)\{[^}]*box-sizing[^}]*\}"));
static CSS_COLOR: LazyLock<Regex> = LazyLock::new(|| compile(r"rgba?\([^)]*\)"));
static TAG: LazyLock<Regex> = LazyLock::new(|| compile(r"<[^>]+>"));
static ENTITY: LazyLock<Regex> = LazyLock::new(|| compile(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| compile(r"\s+"));

static TITLES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?is)<title[^>]*>(.*?)</title>",
        r"(?is)<h1[^>]*>(.*?)</h1>",
        r#""headline":"([^"]*)""#,
        r#""name":"([^"]*)""#,
    ])
});

static FEATURES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)transforms?[^.]{20,150}",
        r"(?i)generates?[^.]{20,150}",
        r"(?i)creates?[^.]{20,150}",
        r"(?i)automatically[^.]{20,150}",
        r"(?i)ai-powered[^.]{20,150}",
        r"(?i)perfect for[^.]{20,150}",
        r"(?i)allows? you to[^.]{20,150}",
        r"(?i)helps? you[^.]{20,150}",
    ])
});

static METHODS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)by using[^.]{20,200}",
        r"(?i)script or tool[^.]{20,200}",
        r"(?i)steps?[^.]{20,200}",
        r"(?i)process[^.]{20,200}",
        r"(?i)method[^.]{20,200}",
        r"(?i)build[^.]{20,200}",
        r"(?i)implementation[^.]{20,200}",
    ])
});

static PRICES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\$[\d,]+\.?\d*",
        r"[\d,]+\.\d{2}",
        r"(?i)[\d,]+\s*dollars?",
    ])
});

static PERCENTAGES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[r"[+-]?\d+\.?\d*\s*%", r"\(\s*[+-]?\d+\.?\d*\s*%\s*\)"])
});

const HEADING_WORDS: &[&str] = &[
    "generator", "tool", "feature", "build", "create", "ai", "questions", "answers",
];
const TITLE_WORDS: &[&str] = &["generator", "tool", "ai", "question", "answer"];
const FEATURE_QUESTIONS: &[&str] = &["main feature", "key feature", "primary function", "what does"];
const METHOD_QUESTIONS: &[&str] = &["how to", "how can", "method", "way to", "steps"];
const FINANCIAL_QUESTIONS: &[&str] = &["price", "cost", "dollar", "$", "performance", "%"];
const STEP_WORDS: &[&str] = &["step", "process", "method", "build", "create"];
const STOP_WORDS: &[&str] = &[
    "what", "which", "when", "where", "does", "have", "with", "from", "that", "this", "there",
    "their", "about", "into", "would", "could", "should", "were", "been", "they", "them",
];

// ─────────────────────────────────────────────────────────────────────────────
// Text cleanup
// ─────────────────────────────────────────────────────────────────────────────

/// Strips scripts, styles, comments and tags, decodes entities and
/// collapses whitespace.
pub fn clean_content(raw: &str) -> String {
    let text = SCRIPT.replace_all(raw, "");
    let text = STYLE.replace_all(&text, "");
    let text = COMMENT.replace_all(&text, "");
    let text = CSS_BLOCK.replace_all(&text, "");
    let text = CSS_COLOR.replace_all(&text, "");
    let text = TAG.replace_all(&text, " ");
    let text = decode_entities(&text);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Decodes numeric entities and the common named ones. Unknown entities are
/// left untouched.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    "copy" => Some('©'),
                    "mdash" => Some('—'),
                    "ndash" => Some('–'),
                    "hellip" => Some('…'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

#[derive(Debug, Default)]
struct Extracted {
    title: Option<String>,
    headings: Vec<String>,
    features: Vec<String>,
    methods: Vec<String>,
    prices: Vec<String>,
    percentages: Vec<String>,
}

fn matches_of(patterns: &[Regex], text: &str) -> Vec<String> {
    patterns
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| m.as_str().trim().to_string()))
        .collect()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn extract(cleaned: &str, raw: &str) -> Extracted {
    let title = TITLES.iter().find_map(|re| {
        re.captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| TAG.replace_all(m.as_str(), "").trim().to_string())
    });

    let headings = cleaned
        .split(". ")
        .filter(|s| s.len() < 100 && contains_any(&s.to_lowercase(), HEADING_WORDS))
        .map(|s| s.trim().to_string())
        .collect();

    Extracted {
        title: title.filter(|t| !t.is_empty()),
        headings,
        features: matches_of(&FEATURES, cleaned),
        methods: matches_of(&METHODS, cleaned),
        prices: matches_of(&PRICES, cleaned),
        percentages: matches_of(&PERCENTAGES, cleaned),
    }
}

fn feature_findings(info: &Extracted) -> Vec<String> {
    let mut out: Vec<String> = info
        .title
        .iter()
        .filter(|t| contains_any(&t.to_lowercase(), TITLE_WORDS))
        .cloned()
        .collect();
    out.extend(info.features.iter().take(5).filter(|f| f.len() > 20).cloned());
    out.extend(info.headings.iter().take(3).filter(|h| h.len() > 15).cloned());
    out
}

fn method_findings(info: &Extracted, question: &str) -> Vec<String> {
    let mut out: Vec<String> = info
        .methods
        .iter()
        .take(5)
        .filter(|m| m.len() > 20)
        .cloned()
        .collect();
    if question.contains("step") {
        out.extend(
            info.features
                .iter()
                .filter(|f| contains_any(&f.to_lowercase(), STEP_WORDS))
                .cloned(),
        );
    }
    out
}

fn financial_findings(info: &Extracted) -> Vec<String> {
    info.prices
        .iter()
        .take(5)
        .map(|p| format!("Price found: {p}"))
        .chain(
            info.percentages
                .iter()
                .take(5)
                .map(|p| format!("Performance indicator: {p}")),
        )
        .collect()
}

fn general_findings(info: &Extracted) -> Vec<String> {
    info.title
        .iter()
        .cloned()
        .chain(info.features.iter().take(3).cloned())
        .chain(info.methods.iter().take(2).cloned())
        .chain(info.headings.iter().take(2).cloned())
        .collect()
}

/// Significant words of a question, in order, without duplicates.
pub fn key_terms(question: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in question
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(str::to_lowercase)
    {
        if word.chars().count() > 3 && !STOP_WORDS.contains(&word.as_str()) && !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

// ─────────────────────────────────────────────────────────────────────────────
// Analyst
// ─────────────────────────────────────────────────────────────────────────────

/// Offline, pattern-based analyst.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyst;

impl HeuristicAnalyst {
    pub fn analyze(content: &str, question: &str) -> Analysis {
        let info = extract(&clean_content(content), content);
        let question_lower = question.to_lowercase();

        let mut findings = Vec::new();
        if contains_any(&question_lower, FEATURE_QUESTIONS) {
            findings.extend(feature_findings(&info));
        }
        if contains_any(&question_lower, METHOD_QUESTIONS) {
            findings.extend(method_findings(&info, &question_lower));
        }
        if contains_any(&question_lower, FINANCIAL_QUESTIONS) {
            findings.extend(financial_findings(&info));
        }
        if findings.is_empty() {
            findings = general_findings(&info);
        }
        findings.truncate(MAX_FINDINGS);

        let answer = if findings.is_empty() {
            format!("Unable to find specific information about '{question}' in the provided content.")
        } else {
            let bullets: Vec<String> = findings.iter().map(|f| format!("• {f}")).collect();
            format!("Key findings:\n{}", bullets.join("\n"))
        };

        Analysis { findings, answer }
    }

    pub fn research_plan(question: &str, depth: Depth, max_sources: usize) -> String {
        let sources = depth.source_count(max_sources);
        let mut terms = key_terms(question);
        terms.truncate(depth.lines_of_inquiry());

        let bullets = if terms.is_empty() {
            format!("• Investigate '{question}' directly")
        } else {
            terms
                .iter()
                .map(|t| format!("• Investigate '{t}'"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "Research plan for '{question}' ({depth} depth, up to {sources} sources):\n\n\
             {bullets}\n\nNo evidence has been collected yet."
        )
    }
}

#[async_trait]
impl ContentAnalyst for HeuristicAnalyst {
    async fn answer(&self, content: &str, question: &str) -> anyhow::Result<Analysis> {
        Ok(Self::analyze(content, question))
    }

    async fn summarize(&self, question: &str, depth: Depth, max_sources: usize) -> anyhow::Result<String> {
        Ok(Self::research_plan(question, depth, max_sources))
    }
}
