//! SQL dialect differences: identifier quoting, literal escaping and LIMIT syntax.

use crate::row::Value;
use serde::Deserialize;

/// SQL flavour a statement is rendered for.
///
/// Statements always carry named `:name` placeholders; drivers speaking a positional
/// protocol rewrite them (see [`Bindings::to_positional`](crate::qb::Bindings::to_positional)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Backtick identifiers, `LIMIT offset, count`.
    #[default]
    MySql,
    /// Double-quoted identifiers, `LIMIT count OFFSET offset`.
    Sqlite,
    /// Double-quoted identifiers, `LIMIT count OFFSET offset`, `$n` placeholders on the wire.
    Postgres,
}

impl Dialect {
    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }

    /// Quote a single identifier part.
    pub fn quote(self, part: &str) -> String {
        let q = self.quote_char();
        let mut out = String::with_capacity(part.len() + 2);
        out.push(q);
        for c in part.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
        out
    }

    /// Render a value as an inline SQL literal.
    pub fn literal(self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => self.string_literal(s),
            other => self.string_literal(&other.to_string()),
        }
    }

    fn string_literal(self, s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('\'');
        for c in s.chars() {
            match c {
                '\'' => out.push_str("''"),
                '\\' if self == Dialect::MySql => out.push_str("\\\\"),
                _ => out.push(c),
            }
        }
        out.push('\'');
        out
    }

    /// Render a LIMIT clause (without leading space). Returns `None` when there is nothing to limit.
    pub fn limit(self, offset: Option<u64>, count: Option<u64>) -> Option<String> {
        match (self, offset, count) {
            (_, None, None) => None,
            (_, None, Some(count)) => Some(format!("LIMIT {count}")),
            (Dialect::MySql, Some(offset), Some(count)) => Some(format!("LIMIT {offset}, {count}")),
            (_, Some(offset), Some(count)) => Some(format!("LIMIT {count} OFFSET {offset}")),
            // Offset without a row count: every dialect needs an explicit upper bound.
            (Dialect::MySql, Some(offset), None) => {
                Some(format!("LIMIT {offset}, 18446744073709551615"))
            }
            (Dialect::Sqlite, Some(offset), None) => Some(format!("LIMIT -1 OFFSET {offset}")),
            (Dialect::Postgres, Some(offset), None) => Some(format!("OFFSET {offset}")),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        })
    }
}
