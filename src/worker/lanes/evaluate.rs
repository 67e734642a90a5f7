//! Evaluate lane: relevance screening of newly discovered posts.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, info};

use crate::context::TaskContext;
use crate::error::LaneError;
use crate::model::{ContentPost, RelevanceStatus};
use crate::services::traits::Classifier;
use crate::store::traits::ItemRepository;
use crate::worker::lane::{Claim, LaneHandler, TaskOutcome};

pub struct EvaluateLane {
    items: Arc<dyn ItemRepository>,
    classifier: Arc<dyn Classifier>,
    default_project: String,
}

impl EvaluateLane {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        classifier: Arc<dyn Classifier>,
        default_project: impl Into<String>,
    ) -> Self {
        Self {
            items,
            classifier,
            default_project: default_project.into(),
        }
    }
}

#[async_trait]
impl LaneHandler for EvaluateLane {
    fn name(&self) -> &'static str {
        "evaluate"
    }

    async fn claim(&self) -> Result<Claim, LaneError> {
        let mut items = self
            .items
            .list_by_relevance(RelevanceStatus::Unknown, 1, 0)
            .await?;
        Ok(items.pop().map_or(Claim::Empty, Claim::Item))
    }

    async fn run(&self, item: ContentPost) -> Result<TaskOutcome, LaneError> {
        let ctx = TaskContext::for_item(item.project_id.as_deref(), &self.default_project);

        async {
            let decision = self.classifier.decide(&ctx, &item).await?;
            let outcome = match decision.status() {
                Some(status) => {
                    self.items
                        .update_relevance(&item.id, status, decision.raw())
                        .await?;
                    info!(item_id = %item.id, %status, "Relevance decided");
                    TaskOutcome::Done
                }
                None => {
                    info!(item_id = %item.id, raw = %decision.raw(), "Unrecognized relevance reply, skipped");
                    TaskOutcome::Skipped
                }
            };
            Ok::<_, LaneError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }
}
