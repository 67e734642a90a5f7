//! Stage-specific lane handlers.

mod analyze;
mod author;
mod comments;
mod evaluate;

pub use analyze::AnalyzeLane;
pub use author::AuthorLane;
pub use comments::CommentsLane;
pub use evaluate::EvaluateLane;
