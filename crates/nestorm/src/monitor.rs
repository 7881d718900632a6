//! Statement log and `tracing` output for finalized statements.

use crate::config::EngineConfig;
use crate::qb::CompiledStatement;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Truncate a string to at most `max_bytes` bytes on a UTF-8 char boundary.
pub(crate) fn truncate_sql_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Bounded log of finalized statements, shared by an engine and the engines it spawns
/// for relationship loading.
#[derive(Debug, Clone, Default)]
pub struct QueryLog {
    inner: Rc<RefCell<VecDeque<CompiledStatement>>>,
}

impl QueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit the statement to `tracing` and, when enabled, append it to the log.
    pub(crate) fn record(&self, statement: &CompiledStatement, config: &EngineConfig) {
        let sql = match config.max_sql_length {
            Some(max) if statement.sql.len() > max => {
                format!("{}...", truncate_sql_bytes(&statement.sql, max))
            }
            _ => statement.sql.clone(),
        };
        tracing::debug!(
            target: "nestorm.sql",
            activity = %statement.activity,
            param_count = statement.bindings.len(),
            sql = %sql,
            "statement finalized"
        );

        if !config.log_queries {
            return;
        }
        let mut log = self.inner.borrow_mut();
        log.push_back(statement.clone());
        if let Some(capacity) = config.log_capacity {
            while log.len() > capacity {
                log.pop_front();
            }
        }
    }

    /// Snapshot of the logged statements, oldest first.
    pub fn entries(&self) -> Vec<CompiledStatement> {
        self.inner.borrow().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }
}
