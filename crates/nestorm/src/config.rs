//! Engine configuration.

use crate::dialect::Dialect;
use serde::Deserialize;

/// Configuration for [`QueryEngine`](crate::QueryEngine).
///
/// Deserializable with defaults for every field, so it can be embedded in an
/// application's JSON/TOML settings:
///
/// ```toml
/// dialect = "sqlite"
/// reference_suffix = "_id"
/// log_capacity = 50
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Render for this dialect instead of the driver's.
    pub dialect: Option<Dialect>,
    /// Foreign key suffix used by the default naming strategy.
    pub reference_suffix: String,
    /// Keep finalized statements in the in-memory query log.
    pub log_queries: bool,
    /// Maximum number of logged statements (`None` keeps everything).
    pub log_capacity: Option<usize>,
    /// Truncate SQL in `tracing` events (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dialect: None,
            reference_suffix: "_id".to_string(),
            log_queries: true,
            log_capacity: Some(100),
            max_sql_length: Some(200),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn reference_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.reference_suffix = suffix.into();
        self
    }

    pub fn log_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = Some(capacity);
        self
    }

    /// Keep every statement in the query log.
    pub fn unbounded_log(mut self) -> Self {
        self.log_capacity = None;
        self
    }

    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation in `tracing` events.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }
}
