//! Lazy result sets and row shaping.

use crate::eager::ResolvedPlan;
use crate::eager::loader::{attach_to_many, unprefix_to_one};
use crate::engine::Context;
use crate::error::{OrmError, OrmResult};
use crate::qb::CompiledStatement;
use crate::row::{Row, Value, key_of};
use std::cell::OnceCell;

/// Projection applied to a list of rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Shaping {
    /// List of one field's values (`null` where a row lacks it).
    Column(String),
    /// Object `key -> values joined by glue`.
    Combine {
        values: Vec<String>,
        key: String,
        glue: String,
    },
    /// Object `field -> row` (last row wins on duplicates).
    By(String),
    /// Object `field -> [rows]`.
    GroupedBy(String),
}

impl Shaping {
    pub fn column(field: impl Into<String>) -> Self {
        Shaping::Column(field.into())
    }

    /// Combine with the default `" "` glue.
    pub fn combine<I, S>(values: I, key: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Shaping::Combine {
            values: values.into_iter().map(Into::into).collect(),
            key: key.into(),
            glue: " ".to_string(),
        }
    }

    pub fn by(field: impl Into<String>) -> Self {
        Shaping::By(field.into())
    }

    pub fn grouped_by(field: impl Into<String>) -> Self {
        Shaping::GroupedBy(field.into())
    }

    /// Replace the glue of a `Combine` shaping; other shapings are returned unchanged.
    pub fn glue(self, glue: impl Into<String>) -> Self {
        match self {
            Shaping::Combine { values, key, .. } => Shaping::Combine {
                values,
                key,
                glue: glue.into(),
            },
            other => other,
        }
    }

    /// Apply to `rows`. `alias` names the row set in [`OrmError::MissingKey`].
    pub fn apply(&self, rows: &[Row], alias: &str) -> OrmResult<Value> {
        Ok(match self {
            Shaping::Column(field) => Value::Array(column(rows, field)),
            Shaping::Combine { values, key, glue } => Value::Object(combine(rows, values, key, glue, alias)?),
            Shaping::By(field) => Value::Object(by(rows, field, alias)?),
            Shaping::GroupedBy(field) => Value::Object(grouped_by(rows, field, alias)?),
        })
    }
}

fn keyed<'r>(row: &'r Row, field: &str, alias: &str) -> OrmResult<Option<String>> {
    let value = row
        .get(field)
        .ok_or_else(|| OrmError::missing_key(field, alias))?;
    Ok(key_of(value))
}

fn column(rows: &[Row], field: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get(field).cloned().unwrap_or(Value::Null))
        .collect()
}

fn combine(rows: &[Row], values: &[String], key: &str, glue: &str, alias: &str) -> OrmResult<Row> {
    let mut out = Row::new();
    for row in rows {
        let Some(k) = keyed(row, key, alias)? else {
            continue;
        };
        let parts: Vec<String> = values
            .iter()
            .filter_map(|field| row.get(field))
            .filter(|v| !v.is_null())
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        out.insert(k, Value::String(parts.join(glue)));
    }
    Ok(out)
}

fn by(rows: &[Row], field: &str, alias: &str) -> OrmResult<Row> {
    let mut out = Row::new();
    for row in rows {
        if let Some(k) = keyed(row, field, alias)? {
            out.insert(k, Value::Object(row.clone()));
        }
    }
    Ok(out)
}

fn grouped_by(rows: &[Row], field: &str, alias: &str) -> OrmResult<Row> {
    let mut out = Row::new();
    for row in rows {
        let Some(k) = keyed(row, field, alias)? else {
            continue;
        };
        let member = Value::Object(row.clone());
        if let Some(Value::Array(group)) = out.get_mut(&k) {
            group.push(member);
        } else {
            out.insert(k, Value::Array(vec![member]));
        }
    }
    Ok(out)
}

/// Rows of a select, fetched on first access.
///
/// Materialization runs the statement, folds to-one relation columns into nested objects
/// and attaches to-many relations (one batched query each). After that the rows are an
/// immutable snapshot unless replaced with [`ResultSet::set_rows`].
pub struct ResultSet<'c> {
    ctx: Context<'c>,
    statement: Option<CompiledStatement>,
    plan: ResolvedPlan,
    shaping: Option<Shaping>,
    alias: String,
    rows: OnceCell<Vec<Row>>,
}

impl std::fmt::Debug for ResultSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("statement", &self.statement)
            .field("alias", &self.alias)
            .field("shaping", &self.shaping)
            .field("materialized", &self.rows.get().is_some())
            .finish()
    }
}

impl<'c> ResultSet<'c> {
    pub(crate) fn new(
        ctx: Context<'c>,
        statement: CompiledStatement,
        plan: ResolvedPlan,
        shaping: Option<Shaping>,
        alias: String,
    ) -> Self {
        Self {
            ctx,
            statement: Some(statement),
            plan,
            shaping,
            alias,
            rows: OnceCell::new(),
        }
    }

    /// The statement this result set runs (or ran).
    pub fn statement(&self) -> Option<&CompiledStatement> {
        self.statement.as_ref()
    }

    /// Whether the rows have been fetched yet.
    pub fn is_materialized(&self) -> bool {
        self.rows.get().is_some()
    }

    fn materialize(&self) -> OrmResult<Vec<Row>> {
        let Some(statement) = &self.statement else {
            return Ok(Vec::new());
        };
        let mut rows = self
            .ctx
            .driver
            .fetch(&statement.sql, &statement.bindings)
            .map_err(|e| e.into_error(&statement.sql, &statement.bindings))?;
        unprefix_to_one(&mut rows, &self.plan.to_one);
        attach_to_many(&self.ctx, &mut rows, &self.plan.to_many)?;
        Ok(rows)
    }

    /// All rows, fetching them on first call.
    pub fn rows(&self) -> OrmResult<&[Row]> {
        if let Some(rows) = self.rows.get() {
            return Ok(rows);
        }
        let rows = self.materialize()?;
        Ok(self.rows.get_or_init(|| rows))
    }

    pub fn iter(&self) -> OrmResult<std::slice::Iter<'_, Row>> {
        Ok(self.rows()?.iter())
    }

    pub fn get(&self, index: usize) -> OrmResult<Option<&Row>> {
        Ok(self.rows()?.get(index))
    }

    pub fn first_row(&self) -> OrmResult<Option<&Row>> {
        self.get(0)
    }

    pub fn len(&self) -> OrmResult<usize> {
        Ok(self.rows()?.len())
    }

    pub fn is_empty(&self) -> OrmResult<bool> {
        Ok(self.rows()?.is_empty())
    }

    /// Take the rows, fetching them first if needed.
    pub fn into_rows(self) -> OrmResult<Vec<Row>> {
        self.rows()?;
        Ok(self.rows.into_inner().unwrap_or_default())
    }

    /// Replace the rows; later access sees exactly these.
    pub fn set_rows(&mut self, rows: Vec<Row>) {
        self.rows = OnceCell::from(rows);
    }

    /// Values of one field, `null` where a row lacks it.
    pub fn column(&self, field: &str) -> OrmResult<Vec<Value>> {
        Ok(column(self.rows()?, field))
    }

    /// `key -> values joined by " "`; value fields missing from a row (or null) are skipped.
    pub fn combine<S: AsRef<str>>(&self, values: &[S], key: &str) -> OrmResult<Row> {
        self.combine_with(values, key, " ")
    }

    pub fn combine_with<S: AsRef<str>>(&self, values: &[S], key: &str, glue: &str) -> OrmResult<Row> {
        let values: Vec<String> = values.iter().map(|v| v.as_ref().to_string()).collect();
        combine(self.rows()?, &values, key, glue, &self.alias)
    }

    /// `field -> row`. Every row must have `field`.
    pub fn by(&self, field: &str) -> OrmResult<Row> {
        by(self.rows()?, field, &self.alias)
    }

    /// `field -> [rows]`. Every row must have `field`.
    pub fn grouped_by(&self, field: &str) -> OrmResult<Row> {
        grouped_by(self.rows()?, field, &self.alias)
    }

    /// Apply the statement's shaping directive, or return the rows as an array.
    pub fn shaped(&self) -> OrmResult<Value> {
        let rows = self.rows()?;
        match &self.shaping {
            Some(shaping) => shaping.apply(rows, &self.alias),
            None => Ok(Value::Array(rows.iter().cloned().map(Value::Object).collect())),
        }
    }
}

impl<'a> TryFrom<&'a ResultSet<'_>> for Vec<Row> {
    type Error = OrmError;

    fn try_from(result: &'a ResultSet<'_>) -> Result<Self, Self::Error> {
        Ok(result.rows()?.to_vec())
    }
}
