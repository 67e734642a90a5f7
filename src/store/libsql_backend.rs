//! libSQL backend: implements the item, keyword, and author repositories.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::model::{AnalysisStatus, Author, AuthorFetchStatus, ContentPost, Keyword, RelevanceStatus};
use crate::store::migrations;
use crate::store::traits::{AuthorStore, ItemRepository, KeywordRepository};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Ingestion helpers ───────────────────────────────────────────

    /// Insert a newly discovered post. A post already on file keeps its row
    /// and stage progress. Returns whether a row was written.
    pub async fn insert_post(&self, post: &ContentPost) -> Result<bool, DatabaseError> {
        let relevance_raw = match &post.relevance_raw {
            Some(v) => Some(
                serde_json::to_string(v)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        let count = self
            .conn()
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO content_posts ({POST_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    post.id.clone(),
                    post.platform.clone(),
                    opt_text(post.project_id.as_deref()),
                    opt_text(post.author_id.as_deref()),
                    post.title.clone(),
                    post.content.clone(),
                    opt_text(post.url.as_deref()),
                    post.relevance.as_str(),
                    opt_text(relevance_raw.as_deref()),
                    post.analysis.as_str(),
                    post.author_fetch.as_str(),
                    post.created_at.to_rfc3339(),
                    post.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_post: {e}")))?;
        Ok(count > 0)
    }

    /// Set a post's analysis status.
    pub async fn update_analysis_status(
        &self,
        id: &str,
        status: AnalysisStatus,
    ) -> Result<(), DatabaseError> {
        self.update_status_column("analysis_status", id, status.as_str())
            .await
    }

    /// Insert or update an author profile.
    pub async fn save_author(&self, author: &Author) -> Result<(), DatabaseError> {
        let profile = serde_json::to_string(&author.profile)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO authors (platform, author_id, nickname, profile, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
                 ON CONFLICT (platform, author_id) DO UPDATE SET \
                 nickname = excluded.nickname, profile = excluded.profile, updated_at = excluded.updated_at",
                params![
                    author.platform.clone(),
                    author.author_id.clone(),
                    opt_text(author.nickname.as_deref()),
                    profile,
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_author: {e}")))?;
        Ok(())
    }

    async fn update_status_column(
        &self,
        column: &'static str,
        id: &str,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let count = self
            .conn()
            .execute(
                &format!("UPDATE content_posts SET {column} = ?1, updated_at = ?2 WHERE id = ?3"),
                params![value, now, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update {column}: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "content_post".into(),
                id: id.to_string(),
            });
        }
        debug!(item_id = %id, column, value, "Post status updated");
        Ok(())
    }

    async fn query_posts(
        &self,
        label: &str,
        sql: &str,
        values: Vec<libsql::Value>,
    ) -> Result<Vec<ContentPost>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("{label}: {e}")))?;

        let mut posts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{label} row: {e}")))?
        {
            posts.push(row_to_post(&row)?);
        }
        Ok(posts)
    }
}

// ── Helper functions ────────────────────────────────────────────────

const POST_COLUMNS: &str = "id, platform, project_id, author_id, title, content, url, relevance_status, relevance_raw, analysis_status, author_fetch_status, created_at, updated_at";

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn text(s: &str) -> libsql::Value {
    libsql::Value::Text(s.to_string())
}

fn limit_value(n: usize) -> libsql::Value {
    libsql::Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// `?N, ?N+1, ...` placeholders starting at `start`.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_post(row: &libsql::Row) -> Result<ContentPost, DatabaseError> {
    let id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("post.id: {e}")))?;
    let platform: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("post.platform: {e}")))?;
    let project_id: Option<String> = row.get(2).ok();
    let author_id: Option<String> = row.get(3).ok();
    let title: String = row.get(4).unwrap_or_default();
    let content: String = row.get(5).unwrap_or_default();
    let url: Option<String> = row.get(6).ok();

    let relevance_str: String = row.get(7).unwrap_or_else(|_| "unknown".to_string());
    let relevance = relevance_str
        .parse::<RelevanceStatus>()
        .map_err(DatabaseError::Serialization)?;

    let relevance_raw: Option<String> = row.get(8).ok();
    let relevance_raw = relevance_raw.and_then(|s| serde_json::from_str(&s).ok());

    let analysis_str: String = row.get(9).unwrap_or_else(|_| "init".to_string());
    let analysis = analysis_str
        .parse::<AnalysisStatus>()
        .map_err(DatabaseError::Serialization)?;

    let author_fetch_str: String = row.get(10).unwrap_or_else(|_| "not_fetched".to_string());
    let author_fetch = author_fetch_str
        .parse::<AuthorFetchStatus>()
        .map_err(DatabaseError::Serialization)?;

    let created_at: String = row.get(11).unwrap_or_default();
    let updated_at: String = row.get(12).unwrap_or_default();

    Ok(ContentPost {
        id,
        platform,
        project_id,
        author_id,
        title,
        content,
        url,
        relevance,
        relevance_raw,
        analysis,
        author_fetch,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl ItemRepository for LibSqlBackend {
    async fn list_by_relevance(
        &self,
        status: RelevanceStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentPost>, DatabaseError> {
        self.query_posts(
            "list_by_relevance",
            &format!(
                "SELECT {POST_COLUMNS} FROM content_posts WHERE relevance_status = ?1 \
                 ORDER BY created_at ASC LIMIT ?2 OFFSET ?3"
            ),
            vec![text(status.as_str()), limit_value(limit), limit_value(offset)],
        )
        .await
    }

    async fn list_by_analysis(
        &self,
        status: AnalysisStatus,
        limit: usize,
    ) -> Result<Vec<ContentPost>, DatabaseError> {
        self.query_posts(
            "list_by_analysis",
            &format!(
                "SELECT {POST_COLUMNS} FROM content_posts WHERE analysis_status = ?1 \
                 ORDER BY created_at ASC LIMIT ?2"
            ),
            vec![text(status.as_str()), limit_value(limit)],
        )
        .await
    }

    async fn list_by_analysis_and_relevance(
        &self,
        analysis: &[AnalysisStatus],
        relevance: &[RelevanceStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentPost>, DatabaseError> {
        if analysis.is_empty() || relevance.is_empty() {
            return Ok(Vec::new());
        }

        let analysis_ph = placeholders(1, analysis.len());
        let relevance_ph = placeholders(1 + analysis.len(), relevance.len());
        let next = 1 + analysis.len() + relevance.len();

        let mut values: Vec<libsql::Value> = analysis.iter().map(|s| text(s.as_str())).collect();
        values.extend(relevance.iter().map(|s| text(s.as_str())));
        values.push(limit_value(limit));
        values.push(limit_value(offset));

        self.query_posts(
            "list_by_analysis_and_relevance",
            &format!(
                "SELECT {POST_COLUMNS} FROM content_posts \
                 WHERE analysis_status IN ({analysis_ph}) AND relevance_status IN ({relevance_ph}) \
                 ORDER BY created_at ASC LIMIT ?{} OFFSET ?{}",
                next,
                next + 1
            ),
            values,
        )
        .await
    }

    async fn list_by_author_fetch_status(
        &self,
        status: AuthorFetchStatus,
        limit: usize,
        offset: usize,
        relevance: &[RelevanceStatus],
    ) -> Result<Vec<ContentPost>, DatabaseError> {
        let mut values = vec![text(status.as_str())];
        let relevance_clause = if relevance.is_empty() {
            String::new()
        } else {
            values.extend(relevance.iter().map(|s| text(s.as_str())));
            format!(
                " AND relevance_status IN ({})",
                placeholders(2, relevance.len())
            )
        };
        let next = values.len() + 1;
        values.push(limit_value(limit));
        values.push(limit_value(offset));

        self.query_posts(
            "list_by_author_fetch_status",
            &format!(
                "SELECT {POST_COLUMNS} FROM content_posts WHERE author_fetch_status = ?1{relevance_clause} \
                 ORDER BY created_at ASC LIMIT ?{} OFFSET ?{}",
                next,
                next + 1
            ),
            values,
        )
        .await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<ContentPost>, DatabaseError> {
        let mut posts = self
            .query_posts(
                "get_by_id",
                &format!("SELECT {POST_COLUMNS} FROM content_posts WHERE id = ?1"),
                vec![text(id)],
            )
            .await?;
        Ok(posts.pop())
    }

    async fn update_relevance(
        &self,
        id: &str,
        status: RelevanceStatus,
        raw: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(raw)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let count = self
            .conn()
            .execute(
                "UPDATE content_posts SET relevance_status = ?1, relevance_raw = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.as_str(), raw, now, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_relevance: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "content_post".into(),
                id: id.to_string(),
            });
        }
        debug!(item_id = %id, status = %status, "Relevance updated");
        Ok(())
    }

    async fn update_author_fetch_status(
        &self,
        id: &str,
        status: AuthorFetchStatus,
    ) -> Result<(), DatabaseError> {
        self.update_status_column("author_fetch_status", id, status.as_str())
            .await
    }
}

#[async_trait]
impl KeywordRepository for LibSqlBackend {
    async fn list_all(&self, limit: usize, offset: usize) -> Result<Vec<Keyword>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT keyword, channel FROM keywords ORDER BY id ASC LIMIT ?1 OFFSET ?2",
                Params::Positional(vec![limit_value(limit), limit_value(offset)]),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_keywords: {e}")))?;

        let mut keywords = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_keywords row: {e}")))?
        {
            let keyword: String = row.get(0).unwrap_or_default();
            let channel: String = row.get(1).unwrap_or_default();
            keywords.push(Keyword { keyword, channel });
        }
        Ok(keywords)
    }
}

#[async_trait]
impl AuthorStore for LibSqlBackend {
    async fn author_exists(&self, platform: &str, author_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM authors WHERE platform = ?1 AND author_id = ?2",
                params![platform, author_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("author_exists: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("author_exists row: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn post(id: &str) -> ContentPost {
        ContentPost::new(id, "xhs")
            .with_title(format!("Post {id}"))
            .with_project("proj-1")
    }

    #[tokio::test]
    async fn insert_and_get_post() {
        let db = test_db().await;
        let p = post("a").with_author("u-1");
        db.insert_post(&p).await.unwrap();

        let fetched = db.get_by_id("a").await.unwrap().unwrap();
        assert_eq!(fetched.id, "a");
        assert_eq!(fetched.platform, "xhs");
        assert_eq!(fetched.project_id.as_deref(), Some("proj-1"));
        assert_eq!(fetched.author_id.as_deref(), Some("u-1"));
        assert_eq!(fetched.relevance, RelevanceStatus::Unknown);
        assert_eq!(fetched.analysis, AnalysisStatus::Init);
        assert_eq!(fetched.author_fetch, AuthorFetchStatus::NotFetched);

        assert!(db.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rediscovered_post_keeps_progress() {
        let db = test_db().await;
        assert!(db.insert_post(&post("a")).await.unwrap());
        db.update_relevance("a", RelevanceStatus::Yes, &json!("yes"))
            .await
            .unwrap();

        assert!(!db.insert_post(&post("a").with_title("changed")).await.unwrap());

        let fetched = db.get_by_id("a").await.unwrap().unwrap();
        assert_eq!(fetched.relevance, RelevanceStatus::Yes);
        assert_eq!(fetched.title, "Post a");
    }

    #[tokio::test]
    async fn list_by_relevance_respects_limit() {
        let db = test_db().await;
        for id in ["a", "b", "c"] {
            db.insert_post(&post(id)).await.unwrap();
        }
        db.insert_post(&post("d").with_relevance(RelevanceStatus::Yes))
            .await
            .unwrap();

        let unknown = db
            .list_by_relevance(RelevanceStatus::Unknown, 10, 0)
            .await
            .unwrap();
        assert_eq!(unknown.len(), 3);

        let one = db
            .list_by_relevance(RelevanceStatus::Unknown, 1, 0)
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn update_relevance_stores_raw() {
        let db = test_db().await;
        db.insert_post(&post("a")).await.unwrap();

        db.update_relevance("a", RelevanceStatus::Maybe, &json!({"status": "maybe", "score": 0.5}))
            .await
            .unwrap();

        let fetched = db.get_by_id("a").await.unwrap().unwrap();
        assert_eq!(fetched.relevance, RelevanceStatus::Maybe);
        assert_eq!(fetched.relevance_raw.unwrap()["score"], 0.5);
    }

    #[tokio::test]
    async fn update_missing_post_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_author_fetch_status("ghost", AuthorFetchStatus::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn analysis_and_relevance_filter() {
        let db = test_db().await;
        db.insert_post(&post("yes").with_relevance(RelevanceStatus::Yes))
            .await
            .unwrap();
        db.insert_post(&post("no").with_relevance(RelevanceStatus::No))
            .await
            .unwrap();
        db.insert_post(
            &post("done")
                .with_relevance(RelevanceStatus::Maybe)
                .with_analysis(AnalysisStatus::Done),
        )
        .await
        .unwrap();

        let found = db
            .list_by_analysis_and_relevance(
                &[AnalysisStatus::Init],
                &RelevanceStatus::ADMITTED,
                10,
                0,
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "yes");
    }

    #[tokio::test]
    async fn author_fetch_filter_with_relevance() {
        let db = test_db().await;
        db.insert_post(&post("a").with_relevance(RelevanceStatus::Yes))
            .await
            .unwrap();
        db.insert_post(&post("b").with_relevance(RelevanceStatus::Unknown))
            .await
            .unwrap();

        let gated = db
            .list_by_author_fetch_status(
                AuthorFetchStatus::NotFetched,
                10,
                0,
                &RelevanceStatus::ADMITTED,
            )
            .await
            .unwrap();
        assert_eq!(gated.len(), 1);
        assert_eq!(gated[0].id, "a");

        let ungated = db
            .list_by_author_fetch_status(AuthorFetchStatus::NotFetched, 10, 0, &[])
            .await
            .unwrap();
        assert_eq!(ungated.len(), 2);
    }

    #[tokio::test]
    async fn list_by_analysis_pending() {
        let db = test_db().await;
        db.insert_post(&post("a")).await.unwrap();
        db.update_analysis_status("a", AnalysisStatus::Pending)
            .await
            .unwrap();

        let pending = db.list_by_analysis(AnalysisStatus::Pending, 5).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn keywords_paged_in_insertion_order() {
        let db = test_db().await;
        for (keyword, channel) in [("coffee", "xhs"), ("tea", "")] {
            db.conn()
                .execute(
                    "INSERT INTO keywords (keyword, channel) VALUES (?1, ?2)",
                    params![keyword, channel],
                )
                .await
                .unwrap();
        }

        let page1 = db.list_all(1, 0).await.unwrap();
        let page2 = db.list_all(1, 1).await.unwrap();
        let page3 = db.list_all(1, 2).await.unwrap();
        assert_eq!(page1[0].keyword, "coffee");
        assert_eq!(page2[0].keyword, "tea");
        assert!(page3.is_empty());
    }

    #[tokio::test]
    async fn author_exists_after_save() {
        let db = test_db().await;
        assert!(!db.author_exists("xhs", "u-1").await.unwrap());

        db.save_author(&Author {
            platform: "xhs".into(),
            author_id: "u-1".into(),
            nickname: Some("alice".into()),
            profile: json!({"followers": 10}),
        })
        .await
        .unwrap();

        assert!(db.author_exists("xhs", "u-1").await.unwrap());
        assert!(!db.author_exists("dy", "u-1").await.unwrap());
    }

    #[tokio::test]
    async fn file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pipeline.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_post(&post("persisted")).await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.get_by_id("persisted").await.unwrap().is_some());
    }
}
