//! Condition descriptors.
//!
//! A [`Conditions`] value is an ordered list of entries: clauses, connector keywords and
//! anonymous groups. Order matters: a connector applies to every following clause until
//! the next connector (see [`compile`](crate::qb::expr::compile)).
//!
//! ```ignore
//! use nestorm::{Conditions, Operator};
//!
//! // `age` >= :cnd_age OR `name` LIKE :cnd_name
//! let c = Conditions::new()
//!     .cmp("age", Operator::Ge, 18)
//!     .or()
//!     .cmp("name", Operator::Like, "A%");
//! ```

use crate::error::{OrmError, OrmResult};
use crate::row::Value;
use std::str::FromStr;

/// Whitelisted comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    NotLike,
    In,
    Is,
    IsNot,
    Regexp,
}

impl Operator {
    /// Every operator, longest SQL spelling first (so suffix matching is greedy).
    pub const ALL: [Operator; 12] = [
        Operator::NotLike,
        Operator::Regexp,
        Operator::IsNot,
        Operator::Like,
        Operator::Ne,
        Operator::Le,
        Operator::Ge,
        Operator::In,
        Operator::Is,
        Operator::Eq,
        Operator::Lt,
        Operator::Gt,
    ];

    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
            Operator::Regexp => "REGEXP",
        }
    }

    /// Parse an operator spelling, case-insensitively. `<>` is accepted as `!=`.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        if normalized == "<>" {
            return Some(Operator::Ne);
        }
        Self::ALL.into_iter().find(|op| op.as_sql() == normalized)
    }

    fn is_word(self) -> bool {
        self.as_sql().starts_with(|c: char| c.is_ascii_alphabetic())
    }

    /// Split a trailing operator off a condition key: `"age >="` -> `("age", Some(Ge))`.
    ///
    /// Word operators (`LIKE`, `IN`, ...) must be separated from the field by whitespace so
    /// that a column such as `domain` is not read as `doma IN`.
    pub fn split_key(key: &str) -> (&str, Option<Self>) {
        let trimmed = key.trim_end();
        let upper = trimmed.to_ascii_uppercase();
        for op in Self::ALL {
            let sql = op.as_sql();
            if !upper.ends_with(sql) {
                continue;
            }
            let field = &trimmed[..trimmed.len() - sql.len()];
            if field.trim().is_empty() {
                continue;
            }
            if op.is_word() && !field.ends_with(char::is_whitespace) {
                continue;
            }
            return (field.trim(), Some(op));
        }
        (key.trim(), None)
    }
}

impl FromStr for Operator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| OrmError::configuration(format!("Unknown operator '{s}'")))
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Boolean connector keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
    AndNot,
    OrNot,
    Not,
}

impl Connector {
    pub fn parse(s: &str) -> Option<Self> {
        match s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase().as_str() {
            "AND" => Some(Connector::And),
            "OR" => Some(Connector::Or),
            "AND NOT" => Some(Connector::AndNot),
            "OR NOT" => Some(Connector::OrNot),
            "NOT" => Some(Connector::Not),
            _ => None,
        }
    }

    /// Text placed between two clauses.
    pub fn infix(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
            Connector::AndNot | Connector::Not => "AND NOT",
            Connector::OrNot => "OR NOT",
        }
    }

    /// Text placed before the first clause.
    pub fn prefix(self) -> &'static str {
        match self {
            Connector::And | Connector::Or => "",
            Connector::AndNot | Connector::OrNot | Connector::Not => "NOT ",
        }
    }
}

/// Right-hand side of a clause.
#[derive(Debug, Clone, PartialEq)]
pub enum CondValue {
    Scalar(Value),
    /// IN list, or OR-alternatives for any other operator.
    List(Vec<Value>),
    /// Reference to another column (`table.field`), never bound.
    Column(String),
    /// Nested expression: table-scoped when the key is a joined alias, otherwise
    /// an OR group with the key forced onto every child.
    Nested(Conditions),
}

impl From<Value> for CondValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => CondValue::List(items),
            other => CondValue::Scalar(other),
        }
    }
}

macro_rules! cond_value_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CondValue {
                fn from(value: $ty) -> Self {
                    CondValue::Scalar(Value::from(value))
                }
            }
        )*
    };
}

cond_value_from_scalar!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool, String, &str);

impl<T: Into<Value>> From<Vec<T>> for CondValue {
    fn from(values: Vec<T>) -> Self {
        CondValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for CondValue {
    fn from(value: Option<T>) -> Self {
        CondValue::Scalar(value.map(Into::into).unwrap_or(Value::Null))
    }
}

/// One entry of a [`Conditions`] list.
#[derive(Debug, Clone, PartialEq)]
pub enum CondEntry {
    Connector(Connector),
    Clause {
        key: String,
        op: Option<Operator>,
        value: CondValue,
    },
    Group(Conditions),
}

/// Ordered condition expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    entries: Vec<CondEntry>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[CondEntry] {
        &self.entries
    }

    /// True when there is no clause or group (connectors alone do not count).
    pub fn is_empty(&self) -> bool {
        !self
            .entries
            .iter()
            .any(|e| !matches!(e, CondEntry::Connector(_)))
    }

    /// Number of clauses and groups.
    pub fn clause_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !matches!(e, CondEntry::Connector(_)))
            .count()
    }

    pub fn push(&mut self, entry: CondEntry) {
        self.entries.push(entry);
    }

    /// Add a clause whose operator comes from the key suffix (default `=`).
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<CondValue>) -> Self {
        self.entries.push(CondEntry::Clause {
            key: key.into(),
            op: None,
            value: value.into(),
        });
        self
    }

    /// Add a clause with an explicit operator.
    pub fn cmp(mut self, key: impl Into<String>, op: Operator, value: impl Into<CondValue>) -> Self {
        self.entries.push(CondEntry::Clause {
            key: key.into(),
            op: Some(op),
            value: value.into(),
        });
        self
    }

    /// `key IN (values...)`
    pub fn is_in<V: Into<Value>>(mut self, key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.entries.push(CondEntry::Clause {
            key: key.into(),
            op: Some(Operator::In),
            value: CondValue::List(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// `key = other_column`
    pub fn column(mut self, key: impl Into<String>, column: impl Into<String>) -> Self {
        self.entries.push(CondEntry::Clause {
            key: key.into(),
            op: None,
            value: CondValue::Column(column.into()),
        });
        self
    }

    /// Nest an expression under `key` (a joined alias or a field name).
    pub fn nested(mut self, key: impl Into<String>, inner: Conditions) -> Self {
        self.entries.push(CondEntry::Clause {
            key: key.into(),
            op: None,
            value: CondValue::Nested(inner),
        });
        self
    }

    /// Add an anonymous parenthesized group.
    pub fn group(mut self, inner: Conditions) -> Self {
        if !inner.is_empty() {
            self.entries.push(CondEntry::Group(inner));
        }
        self
    }

    pub fn and(self) -> Self {
        self.connector(Connector::And)
    }

    pub fn or(self) -> Self {
        self.connector(Connector::Or)
    }

    pub fn and_not(self) -> Self {
        self.connector(Connector::AndNot)
    }

    pub fn or_not(self) -> Self {
        self.connector(Connector::OrNot)
    }

    pub fn not(self) -> Self {
        self.connector(Connector::Not)
    }

    pub fn connector(mut self, connector: Connector) -> Self {
        self.entries.push(CondEntry::Connector(connector));
        self
    }

    /// Append another expression's entries, ANDed after the existing ones.
    ///
    /// When both sides hold clauses an explicit `AND` is inserted so a sticky `OR` from
    /// `self` does not leak into `other`.
    pub fn extend(&mut self, other: Conditions) {
        if other.is_empty() {
            return;
        }
        if !self.is_empty() {
            self.entries.push(CondEntry::Connector(Connector::And));
        }
        self.entries.extend(other.entries);
    }

    /// Parse a JSON condition descriptor.
    ///
    /// - object: each member is a clause, in document order; a nested object is a
    ///   [`CondValue::Nested`] expression; `[op, value]` pairs carry an explicit operator;
    ///   any other array is a list.
    /// - array: strings are connectors, objects contribute their clauses in place and
    ///   nested arrays become parenthesized groups.
    pub fn from_json(value: &Value) -> OrmResult<Self> {
        let mut out = Conditions::new();
        match value {
            Value::Null => {}
            Value::Object(map) => {
                for (key, v) in map {
                    out.entries.push(clause_from_json(key, v)?);
                }
            }
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(s) => {
                            let connector = Connector::parse(s).ok_or_else(|| {
                                OrmError::configuration(format!("Unknown connector '{s}'"))
                            })?;
                            out.entries.push(CondEntry::Connector(connector));
                        }
                        Value::Object(_) => out.entries.extend(Self::from_json(item)?.entries),
                        Value::Array(_) => {
                            let group = Self::from_json(item)?;
                            out = out.group(group);
                        }
                        other => {
                            return Err(OrmError::configuration(format!(
                                "Unexpected condition entry {other}"
                            )));
                        }
                    }
                }
            }
            other => {
                return Err(OrmError::configuration(format!(
                    "Conditions must be an object or an array, got {other}"
                )));
            }
        }
        Ok(out)
    }
}

fn clause_from_json(key: &str, value: &Value) -> OrmResult<CondEntry> {
    let (op, value) = match value {
        Value::Object(_) => (None, CondValue::Nested(Conditions::from_json(value)?)),
        Value::Array(items) => match items.as_slice() {
            [Value::String(op), rhs] if Operator::parse(op).is_some() => {
                (Operator::parse(op), list_or_scalar(rhs)?)
            }
            _ => (None, list_or_scalar(value)?),
        },
        scalar => (None, CondValue::Scalar(scalar.clone())),
    };
    Ok(CondEntry::Clause {
        key: key.to_string(),
        op,
        value,
    })
}

fn list_or_scalar(value: &Value) -> OrmResult<CondValue> {
    match value {
        Value::Array(items) => {
            if items.iter().any(|v| v.is_array() || v.is_object()) {
                return Err(OrmError::configuration(format!(
                    "List values must be scalars, got {value}"
                )));
            }
            Ok(CondValue::List(items.clone()))
        }
        Value::Object(_) => Ok(CondValue::Nested(Conditions::from_json(value)?)),
        scalar => Ok(CondValue::Scalar(scalar.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_key_prefers_longest_operator() {
        assert_eq!(Operator::split_key("age >="), ("age", Some(Operator::Ge)));
        assert_eq!(Operator::split_key("age>="), ("age", Some(Operator::Ge)));
        assert_eq!(Operator::split_key("status !="), ("status", Some(Operator::Ne)));
        assert_eq!(Operator::split_key("name not like"), ("name", Some(Operator::NotLike)));
        assert_eq!(Operator::split_key("deleted_at IS NOT"), ("deleted_at", Some(Operator::IsNot)));
        assert_eq!(Operator::split_key("u.name LIKE"), ("u.name", Some(Operator::Like)));
    }

    #[test]
    fn split_key_ignores_words_glued_to_field() {
        assert_eq!(Operator::split_key("domain"), ("domain", None));
        assert_eq!(Operator::split_key("this"), ("this", None));
        assert_eq!(Operator::split_key("IN"), ("IN", None));
    }

    #[test]
    fn connectors_parse_case_insensitively() {
        assert_eq!(Connector::parse("or"), Some(Connector::Or));
        assert_eq!(Connector::parse("and   not"), Some(Connector::AndNot));
        assert_eq!(Connector::parse("xor"), None);
    }

    #[test]
    fn from_json_object_keeps_document_order() {
        let c = Conditions::from_json(&json!({"b": 1, "a": [">=", 2], "c": [1, 2]})).unwrap();
        let keys: Vec<&str> = c
            .entries()
            .iter()
            .filter_map(|e| match e {
                CondEntry::Clause { key, .. } => Some(key.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(keys, ["b", "a", "c"]);
        assert!(matches!(
            &c.entries()[1],
            CondEntry::Clause { op: Some(Operator::Ge), value: CondValue::Scalar(v), .. } if v == &json!(2)
        ));
        assert!(matches!(&c.entries()[2], CondEntry::Clause { value: CondValue::List(_), .. }));
    }

    #[test]
    fn from_json_array_reads_connectors_and_groups() {
        let c = Conditions::from_json(&json!([
            {"age": [">=", 18]},
            "OR",
            {"name": ["LIKE", "A%"]},
            "AND",
            [{"a": 1}, "OR", {"b": 2}]
        ]))
        .unwrap();
        assert_eq!(c.entries().len(), 5);
        assert_eq!(c.entries()[1], CondEntry::Connector(Connector::Or));
        assert!(matches!(&c.entries()[4], CondEntry::Group(g) if g.clause_count() == 2));
    }

    #[test]
    fn from_json_rejects_unknown_connector() {
        let err = Conditions::from_json(&json!([{"a": 1}, "XOR", {"b": 2}])).unwrap_err();
        assert!(err.is_configuration());
        assert!(Conditions::from_json(&json!(5)).is_err());
    }

    #[test]
    fn extend_inserts_and_between_clauses() {
        let mut c = Conditions::new().eq("a", 1).or().eq("b", 2);
        c.extend(Conditions::new().eq("c", 3));
        assert_eq!(c.clause_count(), 3);
        assert_eq!(c.entries()[3], CondEntry::Connector(Connector::And));
    }
}
