//! Materialization of resolved relations into fetched rows.

use super::resolver::{ToManyPlan, ToOneNode, prefixed};
use crate::condition::Conditions;
use crate::engine::{Context, QueryEngine};
use crate::error::{OrmError, OrmResult};
use crate::qb::join::{JoinSpec, JoinType};
use crate::row::{Row, Value, key_of};
use crate::state::{Field, FieldName};
use std::collections::{HashMap, HashSet};

const PIVOT_PARENT_KEY: &str = "__pivot_parent_key";

/// Fold `__contain_<alias>__<field>` columns into nested objects (`null` when every
/// column of the relation is null).
pub(crate) fn unprefix_to_one(rows: &mut [Row], nodes: &[ToOneNode]) {
    if nodes.is_empty() {
        return;
    }
    for row in rows.iter_mut() {
        for node in nodes {
            let embedded = extract(row, node);
            row.insert(node.alias.clone(), embedded);
        }
    }
}

fn extract(row: &mut Row, node: &ToOneNode) -> Value {
    let mut object = Row::new();
    let mut any_value = false;
    for column in &node.columns {
        let value = row.shift_remove(&prefixed(&node.alias, column)).unwrap_or(Value::Null);
        any_value |= !value.is_null();
        object.insert(column.clone(), value);
    }
    for child in &node.children {
        let embedded = extract(row, child);
        object.insert(child.alias.clone(), embedded);
    }
    if any_value { Value::Object(object) } else { Value::Null }
}

/// Run one batched query per to-many plan and attach each parent's group.
///
/// Keys for every plan are collected before any group is attached, so sibling relations
/// all read the same parent snapshot.
pub(crate) fn attach_to_many(ctx: &Context<'_>, rows: &mut [Row], plans: &[ToManyPlan]) -> OrmResult<()> {
    if plans.is_empty() || rows.is_empty() {
        return Ok(());
    }

    let batches = plans
        .iter()
        .map(|plan| collect_keys(rows, plan))
        .collect::<OrmResult<Vec<_>>>()?;

    for (plan, keys) in plans.iter().zip(batches) {
        let groups = fetch_groups(ctx, plan, keys)?;
        inject(rows, plan, &groups)?;
    }
    Ok(())
}

fn anchor<'r>(row: &'r Row, path: &[String]) -> Option<&'r Row> {
    let mut current = row;
    for alias in path {
        match current.get(alias) {
            Some(Value::Object(inner)) => current = inner,
            _ => return None,
        }
    }
    Some(current)
}

fn anchor_mut<'r>(row: &'r mut Row, path: &[String]) -> Option<&'r mut Row> {
    let mut current = row;
    for alias in path {
        match current.get_mut(alias) {
            Some(Value::Object(inner)) => current = inner,
            _ => return None,
        }
    }
    Some(current)
}

fn collect_keys(rows: &[Row], plan: &ToManyPlan) -> OrmResult<Vec<Value>> {
    let alias = &plan.descriptor.alias;
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for row in rows {
        let Some(owner) = anchor(row, &plan.path) else {
            continue;
        };
        let value = owner
            .get(&plan.parent_key)
            .ok_or_else(|| OrmError::missing_key(&plan.parent_key, alias))?;
        if let Some(key) = key_of(value) {
            if seen.insert(key) {
                keys.push(value.clone());
            }
        }
    }
    Ok(keys)
}

fn fetch_groups(ctx: &Context<'_>, plan: &ToManyPlan, keys: Vec<Value>) -> OrmResult<HashMap<String, Vec<Row>>> {
    let mut groups: HashMap<String, Vec<Row>> = HashMap::new();
    if keys.is_empty() {
        return Ok(groups);
    }

    let relation = &plan.descriptor;
    tracing::debug!(
        target: "nestorm.sql",
        alias = %relation.alias,
        mode = %relation.mode,
        batch = keys.len(),
        "loading related rows"
    );

    let mut engine = QueryEngine::from_context(ctx.clone());
    engine.find(relation.table.as_str());

    let filter_key = match &plan.junction {
        None => {
            if !relation.fields.is_empty() {
                let mut fields: Vec<Field> = relation.fields.iter().map(|f| Field::parse(f)).collect();
                if !fields.iter().any(|f| f.covers(&relation.table, &plan.child_key, true)) {
                    fields.push(Field::column(plan.child_key.as_str()));
                }
                engine.fields(fields)?;
            }
            plan.child_key.clone()
        }
        Some(junction) => {
            let mut fields: Vec<Field> = if relation.fields.is_empty() {
                vec![Field::all().of(relation.table.as_str())]
            } else {
                relation
                    .fields
                    .iter()
                    .map(|f| {
                        let field = Field::parse(f);
                        match (&field.table, &field.name) {
                            (None, FieldName::Column(_) | FieldName::All) => field.of(relation.table.as_str()),
                            _ => field,
                        }
                    })
                    .collect()
            };
            fields.push(
                Field::column(plan.child_key.as_str())
                    .of(junction.table.as_str())
                    .alias(PIVOT_PARENT_KEY),
            );
            engine.fields(fields)?;
            engine.join([JoinSpec::new(junction.table.as_str())
                .kind(JoinType::Inner)
                .on(Conditions::new().column(
                    format!("{}.{}", junction.table, junction.target_foreign_key),
                    format!("{}.{}", relation.table, junction.target_key),
                ))])?;
            format!("{}.{}", junction.table, plan.child_key)
        }
    };

    let filter = match &relation.replace_conditions {
        Some(replace) => replace.clone(),
        None => {
            let mut filter = Conditions::new().is_in(filter_key, keys);
            if let Some(extra) = &relation.conditions {
                filter.extend(extra.clone());
            }
            filter
        }
    };
    engine.r#where(filter)?;
    for term in &relation.shaping.order {
        engine.order_term(term.clone())?;
    }
    for nested in &relation.nested {
        engine.contain(nested.clone())?;
    }

    let rows = engine.all()?.into_rows()?;
    for mut row in rows {
        let key = match &plan.junction {
            Some(_) => row.shift_remove(PIVOT_PARENT_KEY),
            None => row.get(&plan.child_key).cloned(),
        }
        .ok_or_else(|| OrmError::missing_key(&plan.child_key, &relation.alias))?;
        if let Some(key) = key_of(&key) {
            groups.entry(key).or_default().push(row);
        }
    }
    Ok(groups)
}

fn inject(rows: &mut [Row], plan: &ToManyPlan, groups: &HashMap<String, Vec<Row>>) -> OrmResult<()> {
    let relation = &plan.descriptor;
    for row in rows.iter_mut() {
        let Some(owner) = anchor_mut(row, &plan.path) else {
            continue;
        };
        let key = owner.get(&plan.parent_key).and_then(key_of);
        let mut group = key
            .and_then(|k| groups.get(&k))
            .cloned()
            .unwrap_or_default();
        if let Some(limit) = relation.shaping.limit {
            group.truncate(limit);
        }
        let embedded = match &relation.shaping.shape {
            Some(shape) => shape.apply(&group, &relation.alias)?,
            None => Value::Array(group.into_iter().map(Value::Object).collect()),
        };
        owner.insert(relation.alias.clone(), embedded);
    }
    Ok(())
}
