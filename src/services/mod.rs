//! External service collaborators: traits and the HTTP client.

pub mod http;
pub mod traits;

pub use http::HttpServices;
pub use traits::{AuthorFetcher, Classifier, CommentSync, SearchWorkflow};
