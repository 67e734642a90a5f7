//! JSON-over-HTTP client for the pipeline services.
//!
//! One client implements all four collaborator traits against a single base
//! URL. The task context travels as `X-Project-Id` / `X-Batch-Id` headers.
//!
//! The services run out of process. With a store attached, the client
//! records their results locally:
//! - comment sync moves a post to `pending`
//! - analysis moves it to `done`
//! - fetched authors are saved
//! - posts found by a channel search are inserted

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use crate::context::TaskContext;
use crate::error::{ConfigError, ServiceError};
use crate::model::{AnalysisStatus, Author, CommentSyncOutcome, ContentPost, RelevanceDecision};
use crate::services::traits::{AuthorFetcher, Classifier, CommentSync, SearchWorkflow};
use crate::store::LibSqlBackend;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client for the classification, comment, author, and search services.
pub struct HttpServices {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
    store: Option<Arc<LibSqlBackend>>,
}

impl HttpServices {
    /// Build a client. Fails eagerly on a missing or malformed base URL.
    pub fn new(base_url: &str, token: Option<SecretString>) -> Result<Self, ConfigError> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::MissingEnvVar("PIPELINE_SERVICE_URL".into()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "PIPELINE_SERVICE_URL".into(),
                message: format!("expected an http(s) URL, got '{base_url}'"),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "PIPELINE_SERVICE_URL".into(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url,
            token,
            store: None,
        })
    }

    /// Record service results in `store`.
    pub fn with_store(mut self, store: Arc<LibSqlBackend>) -> Self {
        self.store = Some(store);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// POST a JSON body and decode the JSON reply.
    async fn post<T: DeserializeOwned>(
        &self,
        service: &str,
        path: &str,
        ctx: &TaskContext,
        body: serde_json::Value,
    ) -> Result<T, ServiceError> {
        let mut request = self.client.post(self.url(path)).json(&body);
        if let Some(project) = ctx.project_id() {
            request = request.header("X-Project-Id", project);
        }
        if let Some(batch) = ctx.batch_id() {
            request = request.header("X-Batch-Id", batch);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| ServiceError::RequestFailed {
            service: service.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                service: service.to_string(),
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        debug!(service, path, status = status.as_u16(), "Service call succeeded");

        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::InvalidResponse {
                service: service.to_string(),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct AuthorReply {
    #[serde(default)]
    author: Option<Author>,
}

#[derive(Debug, Deserialize)]
struct SearchReply {
    #[serde(default)]
    posts: Vec<DiscoveredPost>,
}

/// A post as reported by the search service.
#[derive(Debug, Deserialize)]
struct DiscoveredPost {
    id: String,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: Option<String>,
}

impl DiscoveredPost {
    fn into_post(self, channel: &str) -> ContentPost {
        let mut post = ContentPost::new(self.id, self.platform.unwrap_or_else(|| channel.to_string()))
            .with_title(self.title)
            .with_content(self.content);
        post.project_id = self.project_id;
        post.author_id = self.author_id;
        post.url = self.url;
        post
    }
}

#[async_trait]
impl Classifier for HttpServices {
    async fn decide(
        &self,
        ctx: &TaskContext,
        item: &ContentPost,
    ) -> Result<RelevanceDecision, ServiceError> {
        let raw: serde_json::Value = self
            .post("classifier", "classify/decide", ctx, json!({ "item": item }))
            .await?;
        Ok(RelevanceDecision::from_raw(raw))
    }

    async fn analyze(&self, ctx: &TaskContext, item_id: &str) -> Result<(), ServiceError> {
        let _: serde_json::Value = self
            .post("classifier", "classify/analyze", ctx, json!({ "item_id": item_id }))
            .await?;
        if let Some(store) = &self.store {
            store
                .update_analysis_status(item_id, AnalysisStatus::Done)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CommentSync for HttpServices {
    async fn sync(
        &self,
        ctx: &TaskContext,
        item_id: &str,
        page_size: usize,
    ) -> Result<CommentSyncOutcome, ServiceError> {
        let outcome: CommentSyncOutcome = self
            .post(
                "comments",
                "comments/sync",
                ctx,
                json!({ "item_id": item_id, "page_size": page_size }),
            )
            .await?;
        if let Some(store) = &self.store {
            store
                .update_analysis_status(item_id, AnalysisStatus::Pending)
                .await?;
        }
        Ok(outcome)
    }
}

#[async_trait]
impl AuthorFetcher for HttpServices {
    async fn fetch_and_save(
        &self,
        ctx: &TaskContext,
        item_id: &str,
    ) -> Result<Option<Author>, ServiceError> {
        let reply: AuthorReply = self
            .post("authors", "authors/fetch", ctx, json!({ "item_id": item_id }))
            .await?;
        if let (Some(store), Some(author)) = (&self.store, &reply.author) {
            store.save_author(author).await?;
        }
        Ok(reply.author)
    }
}

#[async_trait]
impl SearchWorkflow for HttpServices {
    async fn run_channel_search(
        &self,
        ctx: &TaskContext,
        channel: &str,
        keyword: &str,
    ) -> Result<(), ServiceError> {
        let reply: SearchReply = self
            .post(
                "search",
                "search/run",
                ctx,
                json!({ "channel": channel, "keyword": keyword }),
            )
            .await?;

        let Some(store) = &self.store else {
            return Ok(());
        };
        let found = reply.posts.len();
        let mut inserted = 0;
        for post in reply.posts {
            if store.insert_post(&post.into_post(channel)).await? {
                inserted += 1;
            }
        }
        info!(channel, keyword, found, inserted, "Search results recorded");
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
