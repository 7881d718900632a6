//! SQL rendering.
//!
//! - [`expr`]: condition compiler (`WHERE`/`ON` expressions)
//! - [`join`]: JOIN clauses
//! - [`select`]: SELECT and COUNT statements
//! - [`mutation`]: INSERT, UPDATE and DELETE statements
//! - [`param`]: named bindings

pub mod expr;
pub mod join;
pub mod mutation;
pub mod param;
pub mod select;

pub use expr::{Scope, compile};
pub use join::{JoinSpec, JoinType, compile_joins};
pub use param::Bindings;

use crate::state::Activity;

/// A rendered statement ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub activity: Activity,
    pub sql: String,
    pub bindings: Bindings,
}

impl std::fmt::Display for CompiledStatement {
    /// `SQL` followed by one `:name = value` line per binding.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)?;
        for (name, value) in self.bindings.iter() {
            write!(f, "\n  :{name} = {value}")?;
        }
        Ok(())
    }
}
