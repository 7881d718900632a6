//! Condition compiler: [`Conditions`] -> SQL boolean expression + named bindings.
//!
//! Rules, in the order they apply:
//! - entries are walked in declaration order; a connector keyword sets the connector for
//!   every following clause until the next one (default: the scope's connector, `AND` at
//!   top level). Nothing is emitted before the first clause except a unary `NOT`.
//! - `true`/`false` bind as `1`/`0`; `null` is written inline (`=` -> `IS`, `!=` -> `IS NOT`).
//! - a key may carry an operator suffix (`"age >="`) and a `table.` qualifier.
//! - a nested expression under a joined alias is compiled scoped to that alias; under any
//!   other key the key is forced onto every child and the children are ORed.
//! - each parenthesized group is wrapped exactly once, and only when it holds more than one
//!   clause.
//!
//! The compiler is a pure function of its input: compiling the same tree into fresh
//! [`Bindings`] always yields the same SQL and the same bindings.

use crate::condition::{CondEntry, CondValue, Conditions, Connector, Operator};
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::qb::param::Bindings;
use crate::row::Value;

/// Compilation context.
#[derive(Clone, Debug)]
pub struct Scope<'a> {
    pub dialect: Dialect,
    /// Qualifier for leaves without an explicit `table.` prefix.
    pub default_table: Option<&'a str>,
    /// Connector used between clauses until an explicit one is seen.
    pub default_connector: Connector,
    /// Field every child leaf compares against (forced-key groups).
    pub forced_key: Option<&'a str>,
    /// Bind values as parameters (`WHERE`) or render them as column references / literals (`ON`).
    pub parameterize: bool,
    /// Aliases of the tables joined into the statement (including the main table).
    pub joined: &'a [String],
}

impl<'a> Scope<'a> {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            default_table: None,
            default_connector: Connector::And,
            forced_key: None,
            parameterize: true,
            joined: &[],
        }
    }

    pub fn default_table(mut self, table: Option<&'a str>) -> Self {
        self.default_table = table;
        self
    }

    pub fn parameterize(mut self, parameterize: bool) -> Self {
        self.parameterize = parameterize;
        self
    }

    pub fn joined(mut self, joined: &'a [String]) -> Self {
        self.joined = joined;
        self
    }

    fn is_joined(&self, alias: &str) -> bool {
        self.joined.iter().any(|j| j == alias)
    }
}

/// Compile `conditions` into a SQL fragment, binding parameters into `bindings`.
///
/// Returns an empty string for an empty expression.
pub fn compile(conditions: &Conditions, scope: &Scope<'_>, bindings: &mut Bindings) -> OrmResult<String> {
    Ok(compile_counted(conditions, scope, bindings)?.0)
}

/// Compile and report how many clauses made it into the output.
fn compile_counted(
    conditions: &Conditions,
    scope: &Scope<'_>,
    bindings: &mut Bindings,
) -> OrmResult<(String, usize)> {
    let mut sql = String::new();
    let mut connector: Option<Connector> = None;
    let mut count = 0;

    for entry in conditions.entries() {
        let fragment = match entry {
            CondEntry::Connector(c) => {
                connector = Some(*c);
                continue;
            }
            CondEntry::Clause { key, op, value } => compile_clause(key, *op, value, scope, bindings)?,
            CondEntry::Group(inner) => {
                let inner_scope = Scope {
                    default_connector: Connector::And,
                    forced_key: None,
                    ..scope.clone()
                };
                let (inner_sql, n) = compile_counted(inner, &inner_scope, bindings)?;
                wrap(inner_sql, n)
            }
        };
        if fragment.is_empty() {
            continue;
        }

        let current = connector.unwrap_or(scope.default_connector);
        if count == 0 {
            sql.push_str(current.prefix());
        } else {
            sql.push(' ');
            sql.push_str(current.infix());
            sql.push(' ');
        }
        sql.push_str(&fragment);
        count += 1;
    }

    Ok((sql, count))
}

fn wrap(sql: String, count: usize) -> String {
    if count > 1 { format!("({sql})") } else { sql }
}

fn compile_clause(
    key: &str,
    op: Option<Operator>,
    value: &CondValue,
    scope: &Scope<'_>,
    bindings: &mut Bindings,
) -> OrmResult<String> {
    // Table-scoped nesting: `{authors: {movies: 3}}` with `authors` joined.
    if let CondValue::Nested(inner) = value {
        if scope.forced_key.is_none() && scope.is_joined(key.trim()) {
            let inner_scope = Scope {
                default_table: Some(key.trim()),
                default_connector: Connector::And,
                forced_key: None,
                ..scope.clone()
            };
            let (sql, n) = compile_counted(inner, &inner_scope, bindings)?;
            return Ok(wrap(sql, n));
        }
    }

    let (field, op) = resolve_key(key, op, scope.forced_key);

    match value {
        CondValue::Nested(inner) => forced_group(field, op, inner, scope, bindings),
        CondValue::List(items) => match op.unwrap_or(Operator::In) {
            Operator::In => {
                let column = column_ref(field, scope)?;
                Ok(in_list(&column, items, scope.dialect))
            }
            other => {
                let mut alternatives = Conditions::new().connector(Connector::Or);
                for item in items {
                    alternatives = alternatives.cmp(field.to_string(), other, item.clone());
                }
                let group_scope = Scope {
                    forced_key: None,
                    default_connector: Connector::Or,
                    ..scope.clone()
                };
                let (sql, n) = compile_counted(&alternatives, &group_scope, bindings)?;
                Ok(wrap(sql, n))
            }
        },
        CondValue::Column(other) => {
            let column = column_ref(field, scope)?;
            let rhs = Ident::parse(other)?.render(scope.dialect);
            Ok(format!("{column} {} {rhs}", op.unwrap_or(Operator::Eq)))
        }
        CondValue::Scalar(v) => leaf(field, op.unwrap_or(Operator::Eq), v, scope, bindings),
    }
}

/// Work out the field and operator of a clause.
///
/// Inside a forced-key group the child key names the operator (`{">=": 18}`) or is ignored
/// apart from its operator suffix.
fn resolve_key<'k>(key: &'k str, op: Option<Operator>, forced: Option<&'k str>) -> (&'k str, Option<Operator>) {
    match forced {
        Some(forced) => {
            let key_op = Operator::parse(key).or_else(|| Operator::split_key(key).1);
            (forced, op.or(key_op))
        }
        None => {
            let (field, key_op) = Operator::split_key(key);
            (field, op.or(key_op))
        }
    }
}

fn forced_group(
    field: &str,
    op: Option<Operator>,
    inner: &Conditions,
    scope: &Scope<'_>,
    bindings: &mut Bindings,
) -> OrmResult<String> {
    if op.is_some() {
        return Err(OrmError::configuration(format!(
            "Nested conditions under '{field}' cannot carry an operator"
        )));
    }
    let group_scope = Scope {
        forced_key: Some(field),
        default_connector: Connector::Or,
        ..scope.clone()
    };
    let (sql, n) = compile_counted(inner, &group_scope, bindings)?;
    Ok(wrap(sql, n))
}

/// Render the column a leaf compares, qualified by the scope's default table when the
/// key has no qualifier of its own.
fn column_ref(field: &str, scope: &Scope<'_>) -> OrmResult<String> {
    let ident = if field.contains('.') {
        Ident::parse(field)?
    } else {
        Ident::column(scope.default_table, field)?
    };
    Ok(ident.render(scope.dialect))
}

fn param_base(field: &str, scope: &Scope<'_>) -> String {
    match (field.split_once('.'), scope.default_table) {
        (Some((table, column)), _) => format!("cnd_{table}_{column}"),
        (None, Some(table)) => format!("cnd_{table}_{field}"),
        (None, None) => format!("cnd_{field}"),
    }
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::from(i64::from(*b)),
        other => other.clone(),
    }
}

fn leaf(field: &str, op: Operator, value: &Value, scope: &Scope<'_>, bindings: &mut Bindings) -> OrmResult<String> {
    let column = column_ref(field, scope)?;

    if value.is_null() {
        let op = match op {
            Operator::Eq => Operator::Is,
            Operator::Ne => Operator::IsNot,
            other => other,
        };
        return Ok(format!("{column} {op} NULL"));
    }

    if !scope.parameterize {
        let rhs = match value {
            Value::String(s) => Ident::parse(s)?.render(scope.dialect),
            other => scope.dialect.literal(&normalize(other)),
        };
        return Ok(match op {
            Operator::In => format!("{column} IN ({rhs})"),
            _ => format!("{column} {op} {rhs}"),
        });
    }

    let name = bindings.bind(&param_base(field, scope), normalize(value));
    Ok(match op {
        Operator::In => format!("{column} IN (:{name})"),
        _ => format!("{column} {op} :{name}"),
    })
}

fn in_list(column: &str, items: &[Value], dialect: Dialect) -> String {
    if items.is_empty() {
        return format!("{column} IN (NULL)");
    }
    let rendered: Vec<String> = items.iter().map(|v| dialect.literal(&normalize(v))).collect();
    format!("{column} IN ({})", rendered.join(", "))
}
