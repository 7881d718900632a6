//! Error types for nestorm

use crate::state::Activity;
use thiserror::Error;

/// Result type alias for nestorm operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for statement building, relationship loading and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// A clause or terminal call is not valid for the statement being built
    #[error("`{method}` requires {} statement, found {actual}", list_activities(.required))]
    ActivityMismatch {
        method: &'static str,
        required: &'static [Activity],
        actual: Activity,
    },

    /// Malformed limit/join/relationship descriptor, invalid identifier and similar
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A binding or foreign key could not be found in a row
    #[error("Missing key '{key}' for '{alias}'")]
    MissingKey { key: String, alias: String },

    /// The driver rejected a statement
    #[error("Driver error{}: {message} (sql: {sql})", code_suffix(.code))]
    Driver {
        code: Option<String>,
        message: String,
        sql: String,
        params: Vec<(String, serde_json::Value)>,
    },

    /// Other errors
    #[error("{0}")]
    Other(String),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" [{c}]")).unwrap_or_default()
}

fn list_activities(activities: &[Activity]) -> String {
    let names: Vec<String> = activities.iter().map(|a| a.to_string()).collect();
    let joined = names.join("/");
    let article = match joined.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    };
    format!("{article} {joined}")
}

impl OrmError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a missing key error
    pub fn missing_key(key: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::MissingKey {
            key: key.into(),
            alias: alias.into(),
        }
    }

    /// Check if this is an activity mismatch error
    pub fn is_activity_mismatch(&self) -> bool {
        matches!(self, Self::ActivityMismatch { .. })
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is a missing key error
    pub fn is_missing_key(&self) -> bool {
        matches!(self, Self::MissingKey { .. })
    }

    /// Check if this error came from the driver
    pub fn is_driver(&self) -> bool {
        matches!(self, Self::Driver { .. })
    }
}

/// A failure reported by a [`Driver`](crate::Driver) before it is tied to a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverFailure {
    /// Vendor error code (SQLSTATE, SQLite extended code, ...), when the driver has one.
    pub code: Option<String>,
    pub message: String,
}

impl DriverFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Attach the statement that failed, producing an [`OrmError::Driver`].
    pub fn into_error(self, sql: &str, params: &crate::qb::Bindings) -> OrmError {
        tracing::warn!(
            target: "nestorm.sql",
            code = self.code.as_deref().unwrap_or("-"),
            message = %self.message,
            sql = %sql,
            "driver failure"
        );
        OrmError::Driver {
            code: self.code,
            message: self.message,
            sql: sql.to_string(),
            params: params
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        }
    }
}

impl std::fmt::Display for DriverFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}
