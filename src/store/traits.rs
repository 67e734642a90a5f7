//! Repository traits consumed by the lanes and the discovery job.
//!
//! The dispatch core depends only on these contracts; `LibSqlBackend`
//! implements all three against a single database.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::model::{AnalysisStatus, AuthorFetchStatus, ContentPost, Keyword, RelevanceStatus};

/// Access to content posts and their stage statuses.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Posts with the given relevance status, oldest first.
    async fn list_by_relevance(
        &self,
        status: RelevanceStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentPost>, DatabaseError>;

    /// Posts with the given analysis status, oldest first.
    async fn list_by_analysis(
        &self,
        status: AnalysisStatus,
        limit: usize,
    ) -> Result<Vec<ContentPost>, DatabaseError>;

    /// Posts whose analysis status is in `analysis` and relevance in `relevance`.
    async fn list_by_analysis_and_relevance(
        &self,
        analysis: &[AnalysisStatus],
        relevance: &[RelevanceStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentPost>, DatabaseError>;

    /// Posts with the given author fetch status, optionally restricted to a
    /// set of relevance statuses (empty slice = no restriction).
    async fn list_by_author_fetch_status(
        &self,
        status: AuthorFetchStatus,
        limit: usize,
        offset: usize,
        relevance: &[RelevanceStatus],
    ) -> Result<Vec<ContentPost>, DatabaseError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<ContentPost>, DatabaseError>;

    /// Write a relevance decision and the raw classifier output.
    async fn update_relevance(
        &self,
        id: &str,
        status: RelevanceStatus,
        raw: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    async fn update_author_fetch_status(
        &self,
        id: &str,
        status: AuthorFetchStatus,
    ) -> Result<(), DatabaseError>;
}

/// Read access to discovery keywords.
#[async_trait]
pub trait KeywordRepository: Send + Sync {
    async fn list_all(&self, limit: usize, offset: usize) -> Result<Vec<Keyword>, DatabaseError>;
}

/// Lookup of already-saved author profiles.
#[async_trait]
pub trait AuthorStore: Send + Sync {
    async fn author_exists(&self, platform: &str, author_id: &str) -> Result<bool, DatabaseError>;
}
