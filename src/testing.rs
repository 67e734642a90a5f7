//! In-memory collaborators for lane, dispatcher, and scheduler tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::context::TaskContext;
use crate::error::{DatabaseError, ServiceError};
use crate::model::{
    AnalysisStatus, Author, AuthorFetchStatus, CommentSyncOutcome, ContentPost, Keyword,
    RelevanceDecision, RelevanceStatus,
};
use crate::services::traits::{AuthorFetcher, Classifier, CommentSync, SearchWorkflow};
use crate::store::traits::{AuthorStore, ItemRepository, KeywordRepository};
use crate::worker::lane::Lane;

/// Wait until a lane's in-flight task has released busy.
pub async fn wait_idle(lane: &Lane) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while lane.is_busy() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("lane should release busy");
}

/// Item repository backed by an ordered vector.
#[derive(Default)]
pub struct MemoryItems {
    items: Mutex<Vec<ContentPost>>,
    pub queries: AtomicUsize,
    pub relevance_writes: Mutex<Vec<(String, RelevanceStatus, Value)>>,
    pub author_fetch_writes: Mutex<Vec<(String, AuthorFetchStatus)>>,
}

impl MemoryItems {
    pub fn with(items: Vec<ContentPost>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(items),
            ..Default::default()
        })
    }

    pub fn get(&self, id: &str) -> Option<ContentPost> {
        self.items.lock().unwrap().iter().find(|p| p.id == id).cloned()
    }

    pub fn set_analysis(&self, id: &str, status: AnalysisStatus) {
        if let Some(p) = self.items.lock().unwrap().iter_mut().find(|p| p.id == id) {
            p.analysis = status;
        }
    }

    fn select<P>(&self, limit: usize, offset: usize, pred: P) -> Vec<ContentPost>
    where
        P: Fn(&ContentPost) -> bool,
    {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|p| pred(p))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ItemRepository for MemoryItems {
    async fn list_by_relevance(
        &self,
        status: RelevanceStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentPost>, DatabaseError> {
        Ok(self.select(limit, offset, |p| p.relevance == status))
    }

    async fn list_by_analysis(
        &self,
        status: AnalysisStatus,
        limit: usize,
    ) -> Result<Vec<ContentPost>, DatabaseError> {
        Ok(self.select(limit, 0, |p| p.analysis == status))
    }

    async fn list_by_analysis_and_relevance(
        &self,
        analysis: &[AnalysisStatus],
        relevance: &[RelevanceStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentPost>, DatabaseError> {
        Ok(self.select(limit, offset, |p| {
            analysis.contains(&p.analysis) && relevance.contains(&p.relevance)
        }))
    }

    async fn list_by_author_fetch_status(
        &self,
        status: AuthorFetchStatus,
        limit: usize,
        offset: usize,
        relevance: &[RelevanceStatus],
    ) -> Result<Vec<ContentPost>, DatabaseError> {
        Ok(self.select(limit, offset, |p| {
            p.author_fetch == status && (relevance.is_empty() || relevance.contains(&p.relevance))
        }))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<ContentPost>, DatabaseError> {
        Ok(self.get(id))
    }

    async fn update_relevance(
        &self,
        id: &str,
        status: RelevanceStatus,
        raw: &Value,
    ) -> Result<(), DatabaseError> {
        let mut items = self.items.lock().unwrap();
        let post = items
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "content_post".into(),
                id: id.into(),
            })?;
        post.relevance = status;
        post.relevance_raw = Some(raw.clone());
        self.relevance_writes
            .lock()
            .unwrap()
            .push((id.to_string(), status, raw.clone()));
        Ok(())
    }

    async fn update_author_fetch_status(
        &self,
        id: &str,
        status: AuthorFetchStatus,
    ) -> Result<(), DatabaseError> {
        if let Some(p) = self.items.lock().unwrap().iter_mut().find(|p| p.id == id) {
            p.author_fetch = status;
        }
        self.author_fetch_writes
            .lock()
            .unwrap()
            .push((id.to_string(), status));
        Ok(())
    }
}

/// Keyword repository over a fixed list.
pub struct MemoryKeywords {
    keywords: Vec<Keyword>,
    pub pages: AtomicUsize,
}

impl MemoryKeywords {
    pub fn with(keywords: Vec<Keyword>) -> Arc<Self> {
        Arc::new(Self {
            keywords,
            pages: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl KeywordRepository for MemoryKeywords {
    async fn list_all(&self, limit: usize, offset: usize) -> Result<Vec<Keyword>, DatabaseError> {
        self.pages.fetch_add(1, Ordering::SeqCst);
        Ok(self.keywords.iter().skip(offset).take(limit).cloned().collect())
    }
}

/// Author store over a set of `(platform, author_id)` keys.
#[derive(Default)]
pub struct MemoryAuthors {
    known: Mutex<HashSet<(String, String)>>,
}

impl MemoryAuthors {
    pub fn with(known: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            known: Mutex::new(
                known
                    .iter()
                    .map(|(p, a)| (p.to_string(), a.to_string()))
                    .collect(),
            ),
        })
    }
}

#[async_trait]
impl AuthorStore for MemoryAuthors {
    async fn author_exists(&self, platform: &str, author_id: &str) -> Result<bool, DatabaseError> {
        Ok(self
            .known
            .lock()
            .unwrap()
            .contains(&(platform.to_string(), author_id.to_string())))
    }
}

/// Records every collaborator call along with the context it saw.
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<(String, TaskContext)>>,
}

impl CallLog {
    pub fn record(&self, what: impl Into<String>, ctx: &TaskContext) {
        self.calls.lock().unwrap().push((what.into(), ctx.clone()));
    }

    pub fn calls(&self) -> Vec<(String, TaskContext)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classifier returning a canned reply per item id. When gated, every call
/// is logged first and then waits for a permit.
#[derive(Default)]
pub struct FakeClassifier {
    pub replies: Mutex<HashMap<String, Value>>,
    pub failing: Mutex<HashSet<String>>,
    pub gate: Option<Arc<Semaphore>>,
    pub log: CallLog,
}

impl FakeClassifier {
    pub fn replying(pairs: &[(&str, Value)]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                pairs
                    .iter()
                    .map(|(id, v)| (id.to_string(), v.clone()))
                    .collect(),
            ),
            ..Default::default()
        })
    }

    pub fn gated(pairs: &[(&str, Value)], gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                pairs
                    .iter()
                    .map(|(id, v)| (id.to_string(), v.clone()))
                    .collect(),
            ),
            gate: Some(gate),
            ..Default::default()
        })
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn error(&self, item_id: &str) -> Option<ServiceError> {
        self.failing
            .lock()
            .unwrap()
            .contains(item_id)
            .then(|| ServiceError::RequestFailed {
                service: "classifier".into(),
                reason: format!("forced failure for {item_id}"),
            })
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn decide(
        &self,
        ctx: &TaskContext,
        item: &ContentPost,
    ) -> Result<RelevanceDecision, ServiceError> {
        self.log.record(format!("decide:{}", item.id), ctx);
        self.pass_gate().await;
        if let Some(e) = self.error(&item.id) {
            return Err(e);
        }
        let raw = self
            .replies
            .lock()
            .unwrap()
            .get(&item.id)
            .cloned()
            .unwrap_or(Value::Null);
        Ok(RelevanceDecision::from_raw(raw))
    }

    async fn analyze(&self, ctx: &TaskContext, item_id: &str) -> Result<(), ServiceError> {
        self.log.record(format!("analyze:{item_id}"), ctx);
        self.pass_gate().await;
        match self.error(item_id) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Comment sync that advances the item to `pending` in a shared repository.
pub struct FakeCommentSync {
    items: Arc<MemoryItems>,
    pub log: CallLog,
    pub page_sizes: Mutex<Vec<usize>>,
}

impl FakeCommentSync {
    pub fn new(items: Arc<MemoryItems>) -> Arc<Self> {
        Arc::new(Self {
            items,
            log: CallLog::default(),
            page_sizes: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CommentSync for FakeCommentSync {
    async fn sync(
        &self,
        ctx: &TaskContext,
        item_id: &str,
        page_size: usize,
    ) -> Result<CommentSyncOutcome, ServiceError> {
        self.log.record(format!("sync:{item_id}"), ctx);
        self.page_sizes.lock().unwrap().push(page_size);
        self.items.set_analysis(item_id, AnalysisStatus::Pending);
        Ok(CommentSyncOutcome {
            ok: 2,
            skipped: 0,
            error: 0,
        })
    }
}

/// Author fetcher returning a profile only for listed items.
#[derive(Default)]
pub struct FakeAuthorFetcher {
    pub found: Mutex<HashSet<String>>,
    pub log: CallLog,
}

impl FakeAuthorFetcher {
    pub fn finding(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            found: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl AuthorFetcher for FakeAuthorFetcher {
    async fn fetch_and_save(
        &self,
        ctx: &TaskContext,
        item_id: &str,
    ) -> Result<Option<Author>, ServiceError> {
        self.log.record(format!("fetch:{item_id}"), ctx);
        if self.found.lock().unwrap().contains(item_id) {
            Ok(Some(Author {
                platform: "xhs".into(),
                author_id: format!("author-of-{item_id}"),
                nickname: None,
                profile: Value::Null,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Search workflow that can block on a gate and fail for chosen keywords.
#[derive(Default)]
pub struct FakeSearch {
    pub log: CallLog,
    pub failing: Mutex<HashSet<String>>,
    pub gate: Option<Arc<Semaphore>>,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl FakeSearch {
    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Default::default()
        })
    }

    pub fn failing_on(keywords: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: Mutex::new(keywords.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl SearchWorkflow for FakeSearch {
    async fn run_channel_search(
        &self,
        ctx: &TaskContext,
        channel: &str,
        keyword: &str,
    ) -> Result<(), ServiceError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.log.record(format!("{channel}:{keyword}"), ctx);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(keyword) {
            return Err(ServiceError::RequestFailed {
                service: "search".into(),
                reason: format!("forced failure for {keyword}"),
            });
        }
        Ok(())
    }
}
