//! JOIN clause rendering.

use crate::condition::Conditions;
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::ident::{Ident, quote};
use crate::qb::expr::{Scope, compile};
use crate::qb::param::Bindings;
use crate::row::Value;

/// SQL join types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    Inner,
    #[default]
    Left,
    Right,
    LeftOuter,
    RightOuter,
}

impl JoinType {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::LeftOuter => "LEFT OUTER JOIN",
            JoinType::RightOuter => "RIGHT OUTER JOIN",
        }
    }

    pub fn parse(s: &str) -> OrmResult<Self> {
        match s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase().as_str() {
            "INNER" => Ok(JoinType::Inner),
            "LEFT" => Ok(JoinType::Left),
            "RIGHT" => Ok(JoinType::Right),
            "LEFT OUTER" => Ok(JoinType::LeftOuter),
            "RIGHT OUTER" => Ok(JoinType::RightOuter),
            _ => Err(OrmError::configuration(format!("Unknown join type '{s}'"))),
        }
    }
}

/// One joined table.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub table: String,
    pub alias: String,
    pub kind: JoinType,
    pub on: Conditions,
}

impl JoinSpec {
    /// Join `table` under its own name with a LEFT join and no ON condition yet.
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            alias: table.clone(),
            table,
            kind: JoinType::default(),
            on: Conditions::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn kind(mut self, kind: JoinType) -> Self {
        self.kind = kind;
        self
    }

    pub fn on(mut self, on: Conditions) -> Self {
        self.on.extend(on);
        self
    }

    /// Read a join from JSON under `alias`.
    ///
    /// `{"table": .., "type": .., "conditions": {..}}` is the structured form (every member
    /// optional, `table` defaults to the alias); any other object is taken as the ON
    /// condition itself.
    pub fn from_json(alias: &str, value: &Value) -> OrmResult<Self> {
        let Value::Object(map) = value else {
            return Err(OrmError::configuration(format!(
                "Join '{alias}' must be an object, got {value}"
            )));
        };
        let structured = map
            .keys()
            .all(|k| matches!(k.as_str(), "table" | "type" | "conditions"));
        if !structured {
            return Ok(JoinSpec::new(alias).on(Conditions::from_json(value)?));
        }

        let table = match map.get("table") {
            Some(Value::String(t)) => t.clone(),
            Some(other) => {
                return Err(OrmError::configuration(format!(
                    "Join '{alias}' table must be a string, got {other}"
                )));
            }
            None => alias.to_string(),
        };
        let kind = match map.get("type") {
            Some(Value::String(t)) => JoinType::parse(t)?,
            Some(other) => {
                return Err(OrmError::configuration(format!(
                    "Join '{alias}' type must be a string, got {other}"
                )));
            }
            None => JoinType::default(),
        };
        let on = match map.get("conditions") {
            Some(c) => Conditions::from_json(c)?,
            None => Conditions::new(),
        };
        Ok(JoinSpec::new(table).alias(alias).kind(kind).on(on))
    }
}

/// Render every join, each with a leading space.
///
/// ON conditions are compiled column-to-column: string right-hand sides are column
/// references and unqualified keys belong to the joined alias.
pub fn compile_joins(
    joins: &[JoinSpec],
    dialect: Dialect,
    joined: &[String],
    bindings: &mut Bindings,
) -> OrmResult<String> {
    let mut sql = String::new();
    for join in joins {
        if join.on.is_empty() {
            return Err(OrmError::configuration(format!(
                "Join '{}' has no ON condition",
                join.alias
            )));
        }
        let scope = Scope::new(dialect)
            .default_table(Some(&join.alias))
            .parameterize(false)
            .joined(joined);
        let on = compile(&join.on, &scope, bindings)?;

        sql.push(' ');
        sql.push_str(join.kind.as_sql());
        sql.push(' ');
        sql.push_str(&quote(&join.table, dialect)?);
        if join.alias != join.table {
            sql.push_str(" AS ");
            sql.push_str(&Ident::parse(&join.alias)?.render(dialect));
        }
        sql.push_str(" ON ");
        sql.push_str(&on);
    }
    Ok(sql)
}
