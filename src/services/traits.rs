//! Collaborator contracts for the classification, comment, author, and
//! search services.
//!
//! Every call receives the task's [`TaskContext`] so the implementation can
//! scope outbound requests to the right project and batch.

use async_trait::async_trait;

use crate::context::TaskContext;
use crate::error::ServiceError;
use crate::model::{Author, CommentSyncOutcome, ContentPost, RelevanceDecision};

/// Relevance screening and deep analysis.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Decide whether a post is relevant to its project.
    async fn decide(
        &self,
        ctx: &TaskContext,
        item: &ContentPost,
    ) -> Result<RelevanceDecision, ServiceError>;

    /// Run deep analysis for a post. On success the post's analysis status
    /// in the item store is `done`.
    async fn analyze(&self, ctx: &TaskContext, item_id: &str) -> Result<(), ServiceError>;
}

/// Comment enrichment.
#[async_trait]
pub trait CommentSync: Send + Sync {
    /// Sync comments for a post, at most `page_size` per page. On success the
    /// post's analysis status in the item store is `pending`.
    async fn sync(
        &self,
        ctx: &TaskContext,
        item_id: &str,
        page_size: usize,
    ) -> Result<CommentSyncOutcome, ServiceError>;
}

/// Author profile enrichment.
#[async_trait]
pub trait AuthorFetcher: Send + Sync {
    /// Fetch the post author's profile and save it to the author store. `None` when the service
    /// could not resolve an author.
    async fn fetch_and_save(
        &self,
        ctx: &TaskContext,
        item_id: &str,
    ) -> Result<Option<Author>, ServiceError>;
}

/// Keyword-driven discovery on a channel.
#[async_trait]
pub trait SearchWorkflow: Send + Sync {
    /// Search `channel` for `keyword`. Posts found are added to the item store.
    async fn run_channel_search(
        &self,
        ctx: &TaskContext,
        channel: &str,
        keyword: &str,
    ) -> Result<(), ServiceError>;
}
