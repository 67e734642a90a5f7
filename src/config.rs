//! Configuration types.
//!
//! Everything is read from environment variables at startup. Unset values
//! fall back to defaults; set-but-unparseable values are rejected.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Which components the process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    pub scheduler: bool,
    pub worker: bool,
    pub api: bool,
}

/// Per-lane switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneSwitches {
    pub evaluate: bool,
    pub comments: bool,
    pub analyze: bool,
    pub author: bool,
}

/// Discovery scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cron expression for the discovery job (5-field or cron-crate form).
    pub search_cron: String,
    /// Fixed channel searched on every run.
    pub search_channel: String,
    /// How late a fire may be and still run.
    pub misfire_grace: Duration,
}

/// Worker dispatcher settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between cycles that claimed nothing.
    pub poll_interval: Duration,
    pub evaluate_concurrency: usize,
    pub comments_concurrency: usize,
    pub analyze_concurrency: usize,
    pub author_concurrency: usize,
    /// Page size passed to the comment sync service.
    pub comments_page_size: usize,
    /// Reserved; not consulted by the dispatch loop.
    pub max_attempts: u32,
    /// Reserved; not consulted by the dispatch loop.
    pub running_timeout: Duration,
    /// Project used when an item carries none.
    pub default_project_id: String,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub components: Components,
    pub lanes: LaneSwitches,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub db_path: PathBuf,
    /// Base URL of the pipeline services; required by worker and scheduler.
    pub service_url: Option<String>,
    pub service_token: Option<SecretString>,
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let components = Components {
            scheduler: env.flag("ENABLE_SCHEDULER", true)?,
            worker: env.flag("ENABLE_WORKER", true)?,
            api: env.flag("ENABLE_API", true)?,
        };

        let lanes = LaneSwitches {
            evaluate: env.flag("ENABLE_LANE_EVALUATE", true)?,
            comments: env.flag("ENABLE_LANE_COMMENTS", true)?,
            analyze: env.flag("ENABLE_LANE_ANALYZE", true)?,
            author: env.flag("ENABLE_LANE_AUTHOR", false)?,
        };

        let scheduler = SchedulerConfig {
            search_cron: env.string("SCHED_SEARCH_CRON", "*/5 * * * *"),
            search_channel: env.string("SCHED_SEARCH_CHANNEL", "xhs"),
            misfire_grace: Duration::from_secs(env.parse("SCHED_MISFIRE_GRACE_SEC", 60u64)?),
        };

        let worker = WorkerConfig {
            poll_interval: Duration::from_secs(env.parse("WORKER_POLL_INTERVAL_SEC", 5u64)?),
            evaluate_concurrency: env.positive("WORKER_EVALUATE_CONCURRENCY", 1)?,
            comments_concurrency: env.positive("WORKER_COMMENTS_CONCURRENCY", 1)?,
            analyze_concurrency: env.positive("WORKER_ANALYZE_CONCURRENCY", 1)?,
            author_concurrency: env.positive("WORKER_AUTHOR_CONCURRENCY", 1)?,
            comments_page_size: env.positive("WORKER_COMMENTS_PAGE_SIZE", 20)?,
            max_attempts: env.parse("MAX_ATTEMPTS", 3u32)?,
            running_timeout: env.minutes("RUNNING_TIMEOUT_MIN", 30)?,
            default_project_id: env.string("DEFAULT_PROJECT_ID", "default"),
        };

        let service_url = env.optional("PIPELINE_SERVICE_URL");
        if service_url.is_none() && (components.worker || components.scheduler) {
            return Err(ConfigError::MissingEnvVar("PIPELINE_SERVICE_URL".into()));
        }

        Ok(Self {
            components,
            lanes,
            scheduler,
            worker,
            db_path: PathBuf::from(env.string("PIPELINE_DB_PATH", "./data/pipeline.db")),
            service_url,
            service_token: env.optional("PIPELINE_SERVICE_TOKEN").map(SecretString::from),
            api_port: env.parse("API_PORT", 8080u16)?,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// A set, non-blank value.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
        }
    }

    fn positive(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        let value = self.parse(key, default)?;
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "must be at least 1".into(),
            });
        }
        Ok(value)
    }

    fn minutes(&self, key: &str, default: u64) -> Result<Duration, ConfigError> {
        let minutes = self.parse(key, default)?;
        minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{minutes} minutes is out of range"),
            })
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}' is not a boolean"),
            }),
        }
    }
}

/// Parse a boolean switch (`1/0/true/false/yes/no/on/off`, any case).
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
