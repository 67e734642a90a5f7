//! Error types for the content pipeline.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Lane error: {0}")]
    Lane(#[from] LaneError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by the classification / comment / author / search services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Service {service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("Service {service} returned HTTP {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Failed to record service result: {0}")]
    Store(#[from] DatabaseError),
}

/// Task-fatal errors from a single lane execution.
///
/// Always caught by the lane wrapper; never reaches the dispatch loop.
#[derive(Debug, thiserror::Error)]
pub enum LaneError {
    #[error("Item {item_id} has no project id")]
    MissingProject { item_id: String },

    #[error("Repository error: {0}")]
    Repository(#[from] DatabaseError),

    #[error("Collaborator error: {0}")]
    Service(#[from] ServiceError),
}

/// Worker pool errors.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Pool {pool} is shut down")]
    Closed { pool: String },
}

/// Scheduler errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler {name} already started")]
    AlreadyStarted { name: String },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(#[from] ConfigError),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
