//! Named parameter bindings.

use crate::error::{OrmError, OrmResult};
use crate::row::Value;

/// Ordered named parameters of one statement.
///
/// Names are unique within a statement: the first use of a base name is bound as-is,
/// later uses get `_2`, `_3`, ... appended.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    params: Vec<(String, Value)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Bind `value` under a name derived from `base` and return the name (without `:`).
    pub fn bind(&mut self, base: &str, value: Value) -> String {
        let base = sanitize(base);
        let mut name = base.clone();
        let mut n = 1;
        while self.contains(&name) {
            n += 1;
            name = format!("{base}_{n}");
        }
        self.params.push((name.clone(), value));
        name
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Rewrite `:name` placeholders for a positional protocol.
    ///
    /// Each occurrence gets its own position (`placeholder(1)`, `placeholder(2)`, ...) and the
    /// returned values follow placeholder order. Quoted strings/identifiers and `::` casts are
    /// left alone.
    pub fn to_positional(
        &self,
        sql: &str,
        placeholder: impl Fn(usize) -> String,
    ) -> OrmResult<(String, Vec<&Value>)> {
        let mut out = String::with_capacity(sql.len());
        let mut values = Vec::with_capacity(self.params.len());
        let mut chars = sql.char_indices().peekable();
        let mut quote: Option<char> = None;

        while let Some((i, c)) = chars.next() {
            if let Some(q) = quote {
                out.push(c);
                if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                ':' if matches!(chars.peek(), Some((_, ':'))) => {
                    out.push_str("::");
                    chars.next();
                }
                ':' if matches!(chars.peek(), Some((_, n)) if n.is_ascii_alphabetic() || *n == '_') => {
                    let start = i + 1;
                    let mut end = start;
                    while let Some(&(j, n)) = chars.peek() {
                        if n.is_ascii_alphanumeric() || n == '_' {
                            end = j + n.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let name = &sql[start..end];
                    let value = self.get(name).ok_or_else(|| {
                        OrmError::configuration(format!("No value bound for parameter :{name}"))
                    })?;
                    values.push(value);
                    out.push_str(&placeholder(values.len()));
                }
                _ => out.push(c),
            }
        }
        Ok((out, values))
    }
}

fn sanitize(base: &str) -> String {
    let mut out: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'p');
    }
    out
}
