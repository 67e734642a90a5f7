//! Author lane: profile enrichment for the authors of relevant posts.
//!
//! Posts whose author is already stored are marked `success` during the
//! claim itself and never reach the pool.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, debug, info, warn};

use crate::context::TaskContext;
use crate::error::LaneError;
use crate::model::{AuthorFetchStatus, ContentPost, RelevanceStatus};
use crate::services::traits::AuthorFetcher;
use crate::store::traits::{AuthorStore, ItemRepository};
use crate::worker::lane::{Claim, LaneHandler, TaskOutcome};

pub struct AuthorLane {
    items: Arc<dyn ItemRepository>,
    authors: Arc<dyn AuthorStore>,
    fetcher: Arc<dyn AuthorFetcher>,
    default_project: String,
}

impl AuthorLane {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        authors: Arc<dyn AuthorStore>,
        fetcher: Arc<dyn AuthorFetcher>,
        default_project: impl Into<String>,
    ) -> Self {
        Self {
            items,
            authors,
            fetcher,
            default_project: default_project.into(),
        }
    }
}

#[async_trait]
impl LaneHandler for AuthorLane {
    fn name(&self) -> &'static str {
        "author"
    }

    async fn claim(&self) -> Result<Claim, LaneError> {
        let mut items = self
            .items
            .list_by_author_fetch_status(
                AuthorFetchStatus::NotFetched,
                1,
                0,
                &RelevanceStatus::ADMITTED,
            )
            .await?;
        let Some(item) = items.pop() else {
            return Ok(Claim::Empty);
        };

        if let Some(author_id) = item.author_id.as_deref() {
            if self.authors.author_exists(&item.platform, author_id).await? {
                self.items
                    .update_author_fetch_status(&item.id, AuthorFetchStatus::Success)
                    .await?;
                debug!(item_id = %item.id, author_id, "Author already stored");
                return Ok(Claim::Settled);
            }
        }

        Ok(Claim::Item(item))
    }

    async fn run(&self, item: ContentPost) -> Result<TaskOutcome, LaneError> {
        let ctx = TaskContext::for_item(item.project_id.as_deref(), &self.default_project);

        async {
            let status = match self.fetcher.fetch_and_save(&ctx, &item.id).await? {
                Some(author) => {
                    info!(
                        item_id = %item.id,
                        author_id = %author.author_id,
                        nickname = author.nickname.as_deref().unwrap_or("-"),
                        "Author saved"
                    );
                    AuthorFetchStatus::Success
                }
                None => {
                    warn!(item_id = %item.id, "No author profile returned");
                    AuthorFetchStatus::Failed
                }
            };
            self.items
                .update_author_fetch_status(&item.id, status)
                .await?;
            Ok::<_, LaneError>(TaskOutcome::Done)
        }
        .instrument(ctx.span())
        .await
    }
}
