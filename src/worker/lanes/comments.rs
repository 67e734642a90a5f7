//! Comments lane: comment enrichment for relevant posts.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, info};

use crate::context::TaskContext;
use crate::error::LaneError;
use crate::model::{AnalysisStatus, ContentPost, RelevanceStatus};
use crate::services::traits::CommentSync;
use crate::store::traits::ItemRepository;
use crate::worker::lane::{Claim, LaneHandler, TaskOutcome};

pub struct CommentsLane {
    items: Arc<dyn ItemRepository>,
    comments: Arc<dyn CommentSync>,
    page_size: usize,
}

impl CommentsLane {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        comments: Arc<dyn CommentSync>,
        page_size: usize,
    ) -> Self {
        Self {
            items,
            comments,
            page_size,
        }
    }
}

#[async_trait]
impl LaneHandler for CommentsLane {
    fn name(&self) -> &'static str {
        "comments"
    }

    async fn claim(&self) -> Result<Claim, LaneError> {
        let mut items = self
            .items
            .list_by_analysis_and_relevance(
                &[AnalysisStatus::Init],
                &RelevanceStatus::ADMITTED,
                1,
                0,
            )
            .await?;
        Ok(items.pop().map_or(Claim::Empty, Claim::Item))
    }

    async fn run(&self, item: ContentPost) -> Result<TaskOutcome, LaneError> {
        let mut ctx = TaskContext::new();
        if let Some(project) = item.project_id.as_deref() {
            ctx = ctx.with_project(project);
        }

        async {
            let outcome = self.comments.sync(&ctx, &item.id, self.page_size).await?;
            info!(
                item_id = %item.id,
                ok = outcome.ok,
                skipped = outcome.skipped,
                error = outcome.error,
                "Comments synced"
            );
            Ok::<_, LaneError>(TaskOutcome::Done)
        }
        .instrument(ctx.span())
        .await
    }
}
