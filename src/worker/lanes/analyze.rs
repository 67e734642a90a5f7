//! Analyze lane: deep analysis once comments are in.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, info};

use crate::context::TaskContext;
use crate::error::LaneError;
use crate::model::{AnalysisStatus, ContentPost};
use crate::services::traits::Classifier;
use crate::store::traits::ItemRepository;
use crate::worker::lane::{Claim, LaneHandler, TaskOutcome};

pub struct AnalyzeLane {
    items: Arc<dyn ItemRepository>,
    classifier: Arc<dyn Classifier>,
}

impl AnalyzeLane {
    pub fn new(items: Arc<dyn ItemRepository>, classifier: Arc<dyn Classifier>) -> Self {
        Self { items, classifier }
    }
}

#[async_trait]
impl LaneHandler for AnalyzeLane {
    fn name(&self) -> &'static str {
        "analyze"
    }

    async fn claim(&self) -> Result<Claim, LaneError> {
        let mut items = self.items.list_by_analysis(AnalysisStatus::Pending, 1).await?;
        Ok(items.pop().map_or(Claim::Empty, Claim::Item))
    }

    async fn run(&self, item: ContentPost) -> Result<TaskOutcome, LaneError> {
        let mut ctx = TaskContext::new();
        if let Some(project) = item.project_id.as_deref() {
            ctx = ctx.with_project(project);
        }
        // No default project for analysis.
        ctx.require_project(&item.id)?;

        async {
            self.classifier.analyze(&ctx, &item.id).await?;
            info!(item_id = %item.id, "Analysis complete");
            Ok::<_, LaneError>(TaskOutcome::Done)
        }
        .instrument(ctx.span())
        .await
    }
}
