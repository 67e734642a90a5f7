//! Scheduled jobs.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{Instrument, debug, info, warn};

use crate::context::TaskContext;
use crate::error::{DatabaseError, Error};
use crate::services::traits::SearchWorkflow;
use crate::store::traits::KeywordRepository;

/// Keywords fetched per page.
pub const KEYWORD_PAGE_SIZE: usize = 500;

/// A unit of work fired by the [`Scheduler`](super::Scheduler).
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<(), Error>;
}

/// Counts from one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoverySummary {
    /// Keywords read from the repository.
    pub keywords: usize,
    /// Searches that completed.
    pub searched: usize,
    /// Searches that returned an error.
    pub failed: usize,
    /// Blank keywords and keywords tagged for another channel.
    pub skipped: usize,
}

/// Runs a channel search for every keyword.
pub struct DiscoveryJob {
    keywords: Arc<dyn KeywordRepository>,
    search: Arc<dyn SearchWorkflow>,
    channel: String,
    page_size: usize,
}

impl DiscoveryJob {
    pub fn new(
        keywords: Arc<dyn KeywordRepository>,
        search: Arc<dyn SearchWorkflow>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            keywords,
            search,
            channel: channel.into(),
            page_size: KEYWORD_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// One discovery pass under a fresh batch id.
    pub async fn execute(&self) -> Result<DiscoverySummary, DatabaseError> {
        let ctx = TaskContext::new_batch();
        let span = ctx.span();
        self.execute_in(&ctx).instrument(span).await
    }

    async fn execute_in(&self, ctx: &TaskContext) -> Result<DiscoverySummary, DatabaseError> {
        let mut summary = DiscoverySummary::default();
        let mut offset = 0;

        info!(channel = %self.channel, "Discovery run started");

        loop {
            let page = self.keywords.list_all(self.page_size, offset).await?;
            let count = page.len();
            summary.keywords += count;

            for kw in page {
                let keyword = kw.keyword.trim();
                if keyword.is_empty() || !kw.applies_to(&self.channel) {
                    summary.skipped += 1;
                    continue;
                }

                match self
                    .search
                    .run_channel_search(ctx, &self.channel, keyword)
                    .await
                {
                    Ok(()) => {
                        debug!(keyword, "Search complete");
                        summary.searched += 1;
                    }
                    Err(e) => {
                        warn!(keyword, error = %e, "Search failed, continuing");
                        summary.failed += 1;
                    }
                }
            }

            if count < self.page_size {
                break;
            }
            offset += count;
        }

        info!(
            keywords = summary.keywords,
            searched = summary.searched,
            failed = summary.failed,
            skipped = summary.skipped,
            "Discovery run finished"
        );
        Ok(summary)
    }
}

#[async_trait]
impl ScheduledJob for DiscoveryJob {
    fn name(&self) -> &str {
        "discovery"
    }

    async fn run(&self) -> Result<(), Error> {
        self.execute().await?;
        Ok(())
    }
}
