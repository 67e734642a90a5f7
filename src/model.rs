//! Domain types: content posts, keywords, authors, and collaborator results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relevance screening status of a content post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceStatus {
    Unknown,
    Yes,
    Maybe,
    No,
}

impl RelevanceStatus {
    /// Statuses that admit an item into the downstream stages.
    pub const ADMITTED: [RelevanceStatus; 2] = [RelevanceStatus::Yes, RelevanceStatus::Maybe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Yes => "yes",
            Self::Maybe => "maybe",
            Self::No => "no",
        }
    }
}

impl fmt::Display for RelevanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelevanceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "yes" => Ok(Self::Yes),
            "maybe" => Ok(Self::Maybe),
            "no" => Ok(Self::No),
            other => Err(format!("unknown relevance status: {other}")),
        }
    }
}

/// Comment enrichment / deep analysis status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Waiting for comment enrichment.
    Init,
    /// Comments synced, waiting for deep analysis.
    Pending,
    /// Analysed (or any later state owned by the analysis service).
    Done,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Pending => "pending",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            other => Err(format!("unknown analysis status: {other}")),
        }
    }
}

/// Author enrichment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorFetchStatus {
    NotFetched,
    Success,
    Failed,
}

impl AuthorFetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFetched => "not_fetched",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AuthorFetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorFetchStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_fetched" => Ok(Self::NotFetched),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown author fetch status: {other}")),
        }
    }
}

/// A discovered content post moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPost {
    pub id: String,
    /// Platform / channel tag (e.g. "xhs").
    pub platform: String,
    pub project_id: Option<String>,
    pub author_id: Option<String>,
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    pub relevance: RelevanceStatus,
    /// Raw classifier output stored alongside the relevance decision.
    pub relevance_raw: Option<serde_json::Value>,
    pub analysis: AnalysisStatus,
    pub author_fetch: AuthorFetchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentPost {
    /// A freshly ingested post with every stage at its initial status.
    pub fn new(id: impl Into<String>, platform: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            platform: platform.into(),
            project_id: None,
            author_id: None,
            title: String::new(),
            content: String::new(),
            url: None,
            relevance: RelevanceStatus::Unknown,
            relevance_raw: None,
            analysis: AnalysisStatus::Init,
            author_fetch: AuthorFetchStatus::NotFetched,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_relevance(mut self, relevance: RelevanceStatus) -> Self {
        self.relevance = relevance;
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisStatus) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_author_fetch(mut self, status: AuthorFetchStatus) -> Self {
        self.author_fetch = status;
        self
    }
}

/// A search keyword and the channel it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub keyword: String,
    /// Channel tag; empty means "any channel".
    #[serde(default)]
    pub channel: String,
}

impl Keyword {
    pub fn new(keyword: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            channel: channel.into(),
        }
    }

    /// Whether this keyword should be searched on `channel`.
    pub fn applies_to(&self, channel: &str) -> bool {
        self.channel.is_empty() || self.channel == channel
    }
}

/// A saved author profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub platform: String,
    pub author_id: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub profile: serde_json::Value,
}

/// Relevance decision returned by the classifier, resolved once at the
/// service boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RelevanceDecision {
    Yes(serde_json::Value),
    Maybe(serde_json::Value),
    No(serde_json::Value),
    /// The classifier answered with something outside {yes, maybe, no}.
    Unrecognized(serde_json::Value),
}

impl RelevanceDecision {
    /// Resolve a classifier reply.
    ///
    /// Accepts either an object carrying a `status` field or a bare string.
    pub fn from_raw(raw: serde_json::Value) -> Self {
        let status = match &raw {
            serde_json::Value::String(s) => Some(s.trim().to_lowercase()),
            serde_json::Value::Object(map) => map
                .get("status")
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_lowercase()),
            _ => None,
        };

        match status.as_deref() {
            Some("yes") => Self::Yes(raw),
            Some("maybe") => Self::Maybe(raw),
            Some("no") => Self::No(raw),
            _ => Self::Unrecognized(raw),
        }
    }

    /// The status to persist, or `None` for an unrecognized reply.
    pub fn status(&self) -> Option<RelevanceStatus> {
        match self {
            Self::Yes(_) => Some(RelevanceStatus::Yes),
            Self::Maybe(_) => Some(RelevanceStatus::Maybe),
            Self::No(_) => Some(RelevanceStatus::No),
            Self::Unrecognized(_) => None,
        }
    }

    pub fn raw(&self) -> &serde_json::Value {
        match self {
            Self::Yes(raw) | Self::Maybe(raw) | Self::No(raw) | Self::Unrecognized(raw) => raw,
        }
    }
}

/// Result of a comment sync run for one post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSyncOutcome {
    #[serde(default)]
    pub ok: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub error: u64,
}
