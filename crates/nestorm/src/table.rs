//! Table definitions with named associations, and the fetch modes built on them.

use crate::client::Execution;
use crate::condition::Conditions;
use crate::eager::{Relation, RelationshipDescriptor};
use crate::engine::QueryEngine;
use crate::error::{OrmError, OrmResult};
use crate::qb::join::JoinSpec;
use crate::result::ResultSet;
use crate::row::{Row, Value};
use crate::state::{Field, Limit, OrderTerm};
use std::collections::HashMap;

/// A table and the relations that can be contained by alias when fetching from it.
#[derive(Debug, Clone)]
pub struct TableDef {
    name: String,
    associations: Vec<RelationshipDescriptor>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            associations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn associations(&self) -> &[RelationshipDescriptor] {
        &self.associations
    }

    pub fn association(&self, alias: &str) -> OrmResult<&RelationshipDescriptor> {
        self.associations
            .iter()
            .find(|a| a.alias == alias)
            .ok_or_else(|| {
                OrmError::configuration(format!(
                    "Association '{alias}' is not declared on table '{}'",
                    self.name
                ))
            })
    }

    /// Declare an association; its alias must be unique on this table.
    pub fn associate(mut self, relation: Relation) -> OrmResult<Self> {
        let descriptor = relation.build()?;
        if descriptor.alias == self.name || self.associations.iter().any(|a| a.alias == descriptor.alias) {
            return Err(OrmError::configuration(format!(
                "Association '{}' declared twice on table '{}'",
                descriptor.alias, self.name
            )));
        }
        self.associations.push(descriptor);
        Ok(self)
    }

    pub fn has_one(self, table: &str) -> OrmResult<Self> {
        self.associate(Relation::has_one(table))
    }

    pub fn has_many(self, table: &str) -> OrmResult<Self> {
        self.associate(Relation::has_many(table))
    }

    pub fn belongs_to(self, table: &str) -> OrmResult<Self> {
        self.associate(Relation::belongs_to(table))
    }

    pub fn belongs_to_many(self, table: &str) -> OrmResult<Self> {
        self.associate(Relation::belongs_to_many(table))
    }

    /// Fetch from this table in `mode`.
    pub fn fetch<'c>(
        &self,
        engine: &mut QueryEngine<'c>,
        mode: FetchMode,
        options: FetchOptions,
    ) -> OrmResult<Fetched<'c>> {
        let FetchOptions {
            mut fields,
            conditions,
            join,
            order,
            limit,
            contain,
        } = options;

        // Resolve everything fallible before a statement is opened.
        let contained = contain
            .iter()
            .map(|alias| self.association(alias).cloned())
            .collect::<OrmResult<Vec<_>>>()?;
        let required: Vec<&str> = match &mode {
            FetchMode::Id if !fields.is_empty() => vec!["id"],
            FetchMode::Unique(field) => vec![field.as_str()],
            FetchMode::Combine { values, key } => {
                if values.is_empty() {
                    return Err(OrmError::configuration("Combine fetch needs at least one value field"));
                }
                values.iter().map(String::as_str).chain([key.as_str()]).collect()
            }
            _ => Vec::new(),
        };
        for column in required {
            if !fields.iter().any(|f| f.covers(&self.name, column, true)) {
                fields.push(Field::column(column));
            }
        }

        engine.find(self.name.as_str());
        if !fields.is_empty() {
            engine.fields(fields)?;
        }
        if !join.is_empty() {
            engine.join(join)?;
        }
        if let Some(conditions) = conditions {
            engine.r#where(conditions)?;
        }
        for term in order {
            engine.order_term(term)?;
        }
        if let Some(limit) = limit {
            engine.limit_to(limit)?;
        }
        for relation in contained {
            engine.contain(relation)?;
        }

        tracing::trace!(target: "nestorm.sql", table = %self.name, mode = ?mode, "table fetch");
        Ok(match mode {
            FetchMode::All => Fetched::Rows(engine.all()?),
            FetchMode::First => Fetched::Row(engine.first()?),
            FetchMode::Count => Fetched::Count(engine.count()?),
            FetchMode::Id => Fetched::Keyed(engine.all()?.by("id")?),
            FetchMode::Column(field) => Fetched::Values(engine.all()?.column(&field)?),
            FetchMode::ColumnUnique(field) => {
                let mut values = engine.all()?.column(&field)?;
                let mut seen = Vec::with_capacity(values.len());
                values.retain(|v| {
                    if seen.contains(v) {
                        false
                    } else {
                        seen.push(v.clone());
                        true
                    }
                });
                Fetched::Values(values)
            }
            FetchMode::Unique(field) => Fetched::Value(
                engine
                    .first()?
                    .and_then(|mut row| row.shift_remove(&field))
                    .unwrap_or(Value::Null),
            ),
            FetchMode::Combine { values, key } => Fetched::Keyed(engine.all()?.combine(values.as_slice(), &key)?),
        })
    }

    /// Whether any row matches `conditions`.
    pub fn exists(&self, engine: &mut QueryEngine<'_>, conditions: Conditions) -> OrmResult<bool> {
        engine.find(self.name.as_str()).r#where(conditions)?.exists()
    }

    /// Row with the given id, optionally restricted to `fields`.
    pub fn get<I, F>(&self, engine: &mut QueryEngine<'_>, id: impl Into<Value>, fields: I) -> OrmResult<Option<Row>>
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        let fields: Vec<Field> = fields.into_iter().map(Into::into).collect();
        engine.find(self.name.as_str());
        if !fields.is_empty() {
            engine.fields(fields)?;
        }
        engine.by_id(id)
    }

    /// Write `row`: an update by `id` when the row carries a non-null `id`, else an insert
    /// whose generated key is reported in [`Execution::last_insert_id`].
    pub fn save(&self, engine: &mut QueryEngine<'_>, mut row: Row) -> OrmResult<Execution> {
        match row.shift_remove("id") {
            Some(id) if !id.is_null() => engine
                .update(self.name.as_str())
                .set(Value::Object(row))?
                .r#where(Conditions::new().eq("id", id))?
                .execute(),
            _ => engine.insert(self.name.as_str()).values(Value::Object(row))?.execute(),
        }
    }

    /// Delete the row with the given id.
    pub fn delete(&self, engine: &mut QueryEngine<'_>, id: impl Into<Value>) -> OrmResult<Execution> {
        let id = id.into();
        if id.is_null() {
            return Err(OrmError::configuration(format!(
                "Cannot delete from '{}' without an id",
                self.name
            )));
        }
        engine
            .delete(self.name.as_str())
            .r#where(Conditions::new().eq("id", id))?
            .execute()
    }
}

/// How [`TableDef::fetch`] returns its rows.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchMode {
    /// A lazy [`ResultSet`].
    All,
    /// The first row.
    First,
    /// Number of matching rows.
    Count,
    /// Rows keyed by `id` (`id` is added to an explicit field list).
    Id,
    /// One field of every row.
    Column(String),
    /// One field of every row, duplicates removed.
    ColumnUnique(String),
    /// One cell of the first row.
    Unique(String),
    /// `key -> values joined by " "`.
    Combine { values: Vec<String>, key: String },
}

impl FetchMode {
    /// Parse a mode name (`all`, `first`, `count`, `id`, `column`, `column_unique`,
    /// `unique`, `combine`) with the field arguments the mode needs.
    pub fn parse(name: &str, args: &[&str]) -> OrmResult<Self> {
        let field = |what: &str| {
            args.first()
                .map(|f| f.to_string())
                .ok_or_else(|| OrmError::configuration(format!("Fetch mode '{name}' needs a {what}")))
        };
        Ok(match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "all" => FetchMode::All,
            "first" => FetchMode::First,
            "count" => FetchMode::Count,
            "id" => FetchMode::Id,
            "column" => FetchMode::Column(field("column")?),
            "column_unique" | "columnunique" => FetchMode::ColumnUnique(field("column")?),
            "unique" => FetchMode::Unique(field("field")?),
            "combine" => match args {
                [] => return Err(OrmError::configuration("Fetch mode 'combine' needs value fields")),
                [value] => FetchMode::Combine {
                    values: vec![value.to_string()],
                    key: "id".to_string(),
                },
                [values @ .., key] => FetchMode::Combine {
                    values: values.iter().map(|v| v.to_string()).collect(),
                    key: key.to_string(),
                },
            },
            other => {
                return Err(OrmError::configuration(format!("Unknown fetch mode '{other}'")));
            }
        })
    }
}

/// What [`TableDef::fetch`] produced.
#[derive(Debug)]
pub enum Fetched<'c> {
    Rows(ResultSet<'c>),
    Row(Option<Row>),
    Count(u64),
    Keyed(Row),
    Values(Vec<Value>),
    Value(Value),
}

/// Clauses applied by [`TableDef::fetch`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub fields: Vec<Field>,
    pub conditions: Option<Conditions>,
    pub join: Vec<JoinSpec>,
    pub order: Vec<OrderTerm>,
    pub limit: Option<Limit>,
    /// Aliases of associations to contain.
    pub contain: Vec<String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn join(mut self, join: JoinSpec) -> Self {
        self.join.push(join);
        self
    }

    pub fn order(mut self, term: OrderTerm) -> Self {
        self.order.push(term);
        self
    }

    pub fn limit(mut self, start: u64, count: Option<u64>) -> Self {
        self.limit = Some(Limit::new(start, count));
        self
    }

    pub fn contain(mut self, alias: impl Into<String>) -> Self {
        self.contain.push(alias.into());
        self
    }

    /// Read options from a JSON object with optional `fields`, `conditions`, `join`,
    /// `order`, `limit` and `contain` members. Unknown members are rejected.
    pub fn from_json(value: &Value) -> OrmResult<Self> {
        let Value::Object(map) = value else {
            return Err(OrmError::configuration(format!("Fetch options must be an object, got {value}")));
        };
        let mut options = FetchOptions::new();
        for (key, member) in map {
            match key.as_str() {
                "fields" => options.fields = strings(key, member)?.iter().map(|f| Field::parse(f)).collect(),
                "conditions" => options.conditions = Some(Conditions::from_json(member)?),
                "join" => {
                    let Value::Object(joins) = member else {
                        return Err(OrmError::configuration(format!(
                            "'join' must map aliases to join specs, got {member}"
                        )));
                    };
                    for (alias, spec) in joins {
                        options.join.push(JoinSpec::from_json(alias, spec)?);
                    }
                }
                "order" => {
                    for spec in strings(key, member)? {
                        options.order.extend(OrderTerm::parse_list(&spec)?);
                    }
                }
                "limit" => options.limit = Some(Limit::from_json(member)?),
                "contain" => options.contain = strings(key, member)?,
                other => {
                    return Err(OrmError::configuration(format!("Unknown fetch option '{other}'")));
                }
            }
        }
        Ok(options)
    }
}

/// A string or an array of strings.
fn strings(key: &str, value: &Value) -> OrmResult<Vec<String>> {
    let bad = || OrmError::configuration(format!("'{key}' must be a string or a list of strings, got {value}"));
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(bad))
            .collect(),
        _ => Err(bad()),
    }
}

/// Table definitions by name, registered as factories and built on lookup.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    factories: HashMap<String, fn() -> OrmResult<TableDef>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: fn() -> OrmResult<TableDef>) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn get(&self, name: &str) -> OrmResult<TableDef> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| OrmError::configuration(format!("Table '{name}' is not registered")))?;
        factory()
    }
}
