//! Worker system: lanes, pools, and the dispatch loop.
//!
//! Core components:
//! - `pool`: bounded tokio worker pool per lane
//! - `lane`: single-flight claim/submit with a busy flag
//! - `lanes`: Evaluate, Comments, Analyze, Author handlers
//! - `dispatcher`: polling loop over the enabled lanes

pub mod dispatcher;
pub mod lane;
pub mod lanes;
pub mod pool;

use std::sync::Arc;

pub use dispatcher::{Sleeper, TokioSleeper, WorkerDispatcher, spawn_dispatcher};
pub use lane::{Claim, Lane, LaneHandler, LaneStatus, TaskOutcome};
pub use pool::WorkerPool;

use crate::config::{LaneSwitches, WorkerConfig};
use crate::services::traits::{AuthorFetcher, Classifier, CommentSync};
use crate::store::traits::{AuthorStore, ItemRepository};
use lanes::{AnalyzeLane, AuthorLane, CommentsLane, EvaluateLane};

/// Collaborators shared by the lanes.
#[derive(Clone)]
pub struct LaneDeps {
    pub items: Arc<dyn ItemRepository>,
    pub authors: Arc<dyn AuthorStore>,
    pub classifier: Arc<dyn Classifier>,
    pub comments: Arc<dyn CommentSync>,
    pub fetcher: Arc<dyn AuthorFetcher>,
}

/// Build the enabled lanes in dispatch order: Evaluate, Comments, Analyze, Author.
pub fn build_lanes(config: &WorkerConfig, switches: &LaneSwitches, deps: &LaneDeps) -> Vec<Lane> {
    let mut lanes = Vec::new();

    if switches.evaluate {
        lanes.push(Lane::new(
            Arc::new(EvaluateLane::new(
                deps.items.clone(),
                deps.classifier.clone(),
                config.default_project_id.clone(),
            )),
            config.evaluate_concurrency,
        ));
    }
    if switches.comments {
        lanes.push(Lane::new(
            Arc::new(CommentsLane::new(
                deps.items.clone(),
                deps.comments.clone(),
                config.comments_page_size,
            )),
            config.comments_concurrency,
        ));
    }
    if switches.analyze {
        lanes.push(Lane::new(
            Arc::new(AnalyzeLane::new(deps.items.clone(), deps.classifier.clone())),
            config.analyze_concurrency,
        ));
    }
    if switches.author {
        lanes.push(Lane::new(
            Arc::new(AuthorLane::new(
                deps.items.clone(),
                deps.authors.clone(),
                deps.fetcher.clone(),
                config.default_project_id.clone(),
            )),
            config.author_concurrency,
        ));
    }

    lanes
}
