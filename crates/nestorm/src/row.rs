//! Row representation shared by drivers and result shaping.
//!
//! Rows are ordered JSON objects: column order follows the driver's column order and
//! embedded relations are nested objects (to-one) or arrays (to-many).

pub use serde_json::Value;

/// A single result row, keyed by column name in select order.
pub type Row = serde_json::Map<String, Value>;

/// Convenience accessors for [`Row`].
pub trait RowExt {
    /// Get a column, treating absent columns as an error.
    fn try_get_column(&self, column: &str, alias: &str) -> crate::OrmResult<&Value>;

    /// Get a column as `i64`, if it holds an integer (or an integer-looking string).
    fn get_i64(&self, column: &str) -> Option<i64>;

    /// Get a column as `&str`, if it holds a string.
    fn get_str(&self, column: &str) -> Option<&str>;
}

impl RowExt for Row {
    fn try_get_column(&self, column: &str, alias: &str) -> crate::OrmResult<&Value> {
        self.get(column)
            .ok_or_else(|| crate::OrmError::missing_key(column, alias))
    }

    fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column)?.as_str()
    }
}

/// Render a value as an object key.
///
/// Keys of `by`/`groupedBy`/`combine` projections and relationship grouping go through here,
/// so `5` and `"5"` land in the same bucket. `null` has no key.
pub fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        other => Some(other.to_string()),
    }
}

/// Turn a JSON value into a row, rejecting anything that is not an object.
pub fn row_from_value(value: Value, what: &str) -> crate::OrmResult<Row> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(crate::OrmError::configuration(format!(
            "{what} expects an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_of_unifies_numbers_and_strings() {
        assert_eq!(key_of(&json!(5)), Some("5".to_string()));
        assert_eq!(key_of(&json!("5")), Some("5".to_string()));
        assert_eq!(key_of(&json!(true)), Some("1".to_string()));
        assert_eq!(key_of(&Value::Null), None);
    }

    #[test]
    fn try_get_column_reports_alias() {
        let row = row_from_value(json!({"id": 1}), "test").unwrap();
        assert_eq!(row.get_i64("id"), Some(1));
        let err = row.try_get_column("email", "users").unwrap_err();
        assert!(matches!(
            err,
            crate::OrmError::MissingKey { ref key, ref alias } if key == "email" && alias == "users"
        ));
    }
}
