//! Task context: tenant and batch scoping for a single task execution.
//!
//! A `TaskContext` is created at the start of a lane task or a scheduler run
//! and passed explicitly into every collaborator call. Nothing is stored in a
//! global or thread-local slot, so two tasks running side by side can never
//! observe each other's project id. The tracing span returned by
//! [`TaskContext::span`] carries the same values into log lines and ends with
//! the task.

use serde::Serialize;

use crate::error::LaneError;

/// Scoped values for one task execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskContext {
    /// Tenant scope of the work item being processed.
    project_id: Option<String>,
    /// Identifier of the scheduler run that spawned this work.
    batch_id: Option<String>,
}

impl TaskContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a project id. Empty strings are treated as absent.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        let id = project_id.into();
        self.project_id = if id.trim().is_empty() { None } else { Some(id) };
        self
    }

    /// Attach a batch id.
    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    /// Context for a fresh scheduler batch.
    pub fn new_batch() -> Self {
        Self::new().with_batch(uuid::Uuid::new_v4().to_string())
    }

    /// Resolve the project for an item, falling back to `default` when the
    /// item carries none.
    pub fn for_item(item_project: Option<&str>, default: &str) -> Self {
        match item_project {
            Some(p) if !p.trim().is_empty() => Self::new().with_project(p),
            _ => Self::new().with_project(default),
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn batch_id(&self) -> Option<&str> {
        self.batch_id.as_deref()
    }

    /// The project id, or a task-fatal error if none could be determined.
    pub fn require_project(&self, item_id: &str) -> Result<&str, LaneError> {
        self.project_id().ok_or_else(|| LaneError::MissingProject {
            item_id: item_id.to_string(),
        })
    }

    /// A tracing span carrying the context values.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "task",
            project_id = self.project_id().unwrap_or("-"),
            batch_id = self.batch_id().unwrap_or("-"),
        )
    }
}
