//! Cron schedule parsing.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ConfigError;

/// A parsed cron expression.
///
/// Standard 5-field expressions (`min hour dom mon dow`) get a leading
/// seconds field of `0`; 6- and 7-field expressions are passed to the `cron`
/// crate unchanged.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        let trimmed = expr.trim();
        let fields = trimmed.split_whitespace().count();
        let normalized = match fields {
            5 => format!("0 {trimmed}"),
            6 | 7 => trimmed.to_string(),
            n => {
                return Err(ConfigError::InvalidCron {
                    expr: expr.to_string(),
                    reason: format!("expected 5, 6 or 7 fields, got {n}"),
                });
            }
        };

        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|e| ConfigError::InvalidCron {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            expr: trimmed.to_string(),
            schedule,
        })
    }

    /// The expression as configured.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}
