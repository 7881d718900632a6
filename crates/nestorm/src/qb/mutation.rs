use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::ident::quote;
use crate::qb::expr::{Scope, compile};
use crate::qb::param::Bindings;
use crate::qb::CompiledStatement;
use crate::row::Value;
use crate::state::{Activity, FieldName, QueryState};

/// Values to write: every value, or only those named by the statement's field list.
fn writable(state: &QueryState) -> Vec<(&String, &Value)> {
    let allowed: Vec<&str> = state
        .fields
        .iter()
        .filter_map(|f| match &f.name {
            FieldName::Column(c) => Some(c.as_str()),
            _ => None,
        })
        .collect();
    state
        .values
        .iter()
        .filter(|(k, _)| allowed.is_empty() || allowed.contains(&k.as_str()))
        .collect()
}

fn require_values<'a>(state: &'a QueryState, table: &str) -> OrmResult<Vec<(&'a String, &'a Value)>> {
    let values = writable(state);
    if values.is_empty() {
        return Err(OrmError::configuration(format!(
            "{} on '{table}' has no values to write",
            state.activity
        )));
    }
    Ok(values)
}

/// `INSERT INTO t (a, b) VALUES (:a, :b)`
pub fn render_insert(state: &QueryState, dialect: Dialect) -> OrmResult<CompiledStatement> {
    let table = &state.table()?.name;
    let values = require_values(state, table)?;
    let mut bindings = Bindings::new();

    let mut columns = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (column, value) in values {
        columns.push(quote(column, dialect)?);
        placeholders.push(format!(":{}", bindings.bind(column, value.clone())));
    }

    Ok(CompiledStatement {
        activity: Activity::Insert,
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table, dialect)?,
            columns.join(", "),
            placeholders.join(", ")
        ),
        bindings,
    })
}

/// `UPDATE t SET a = :a [WHERE ...]`
pub fn render_update(state: &QueryState, dialect: Dialect) -> OrmResult<CompiledStatement> {
    let table = &state.table()?.name;
    let values = require_values(state, table)?;
    let mut bindings = Bindings::new();

    let mut sets = Vec::with_capacity(values.len());
    for (column, value) in values {
        let name = bindings.bind(column, value.clone());
        sets.push(format!("{} = :{name}", quote(column, dialect)?));
    }
    let mut sql = format!("UPDATE {} SET {}", quote(table, dialect)?, sets.join(", "));
    push_where(&mut sql, state, dialect, &mut bindings)?;

    Ok(CompiledStatement {
        activity: Activity::Update,
        sql,
        bindings,
    })
}

/// `DELETE FROM t WHERE ...`; refuses to render without conditions.
pub fn render_delete(state: &QueryState, dialect: Dialect) -> OrmResult<CompiledStatement> {
    let table = &state.table()?.name;
    if state.conditions.is_empty() {
        return Err(OrmError::configuration(format!(
            "DELETE on '{table}' requires conditions"
        )));
    }
    let mut bindings = Bindings::new();
    let mut sql = format!("DELETE FROM {}", quote(table, dialect)?);
    push_where(&mut sql, state, dialect, &mut bindings)?;

    Ok(CompiledStatement {
        activity: Activity::Delete,
        sql,
        bindings,
    })
}

fn push_where(sql: &mut String, state: &QueryState, dialect: Dialect, bindings: &mut Bindings) -> OrmResult<()> {
    let condition = compile(&state.conditions, &Scope::new(dialect), bindings)?;
    if !condition.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&condition);
    }
    Ok(())
}
