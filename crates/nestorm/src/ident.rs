//! SQL identifier validation and quoting.
//!
//! Every table, alias and column name that reaches rendered SQL goes through [`Ident`].
//! Parts are validated against `[A-Za-z_][A-Za-z0-9_$]*` and quoted per [`Dialect`];
//! `*` is accepted as the last part of a dotted name (`users.*`).

use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};

/// A validated, possibly dotted SQL identifier (`column`, `table.column`, `table.*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    parts: Vec<String>,
}

impl Ident {
    /// Parse a dotted identifier.
    pub fn parse(s: &str) -> OrmResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(OrmError::configuration("Identifier cannot be empty"));
        }

        let raw: Vec<&str> = s.split('.').collect();
        let last = raw.len() - 1;
        let mut parts = Vec::with_capacity(raw.len());
        for (i, part) in raw.iter().enumerate() {
            if i == last && *part == "*" {
                parts.push("*".to_string());
                continue;
            }
            validate_part(part).map_err(|e| match e {
                OrmError::Configuration(msg) => {
                    OrmError::configuration(format!("{msg} in identifier '{s}'"))
                }
                other => other,
            })?;
            parts.push((*part).to_string());
        }
        Ok(Self { parts })
    }

    /// Build a (possibly table-qualified) column identifier.
    pub fn column(table: Option<&str>, column: &str) -> OrmResult<Self> {
        match table {
            Some(table) => Self::parse(&format!("{table}.{column}")),
            None => Self::parse(column),
        }
    }

    /// The identifier parts, unquoted.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Last part (the column or table name itself).
    pub fn name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Render with each part quoted for `dialect`.
    pub fn render(&self, dialect: Dialect) -> String {
        self.parts
            .iter()
            .map(|p| if p == "*" { "*".to_string() } else { dialect.quote(p) })
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Validate a single unquoted identifier part.
pub fn validate_part(part: &str) -> OrmResult<()> {
    let mut chars = part.chars();
    match chars.next() {
        None => return Err(OrmError::configuration("Empty identifier segment")),
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        Some(c) => {
            return Err(OrmError::configuration(format!(
                "Invalid identifier start character '{c}'"
            )));
        }
    }
    if let Some(c) = chars.find(|c| !(*c == '_' || *c == '$' || c.is_ascii_alphanumeric())) {
        return Err(OrmError::configuration(format!(
            "Invalid character '{c}'"
        )));
    }
    Ok(())
}

/// Parse and render in one step.
pub fn quote(name: &str, dialect: Dialect) -> OrmResult<String> {
    Ok(Ident::parse(name)?.render(dialect))
}
