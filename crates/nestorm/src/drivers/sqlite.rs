//! SQLite driver over `rusqlite`.

use crate::client::{Driver, Execution};
use crate::dialect::Dialect;
use crate::error::DriverFailure;
use crate::qb::Bindings;
use crate::row::{Row, Value};
use rusqlite::types::{Null, ValueRef};
use rusqlite::{Connection, Statement};
use std::path::Path;

impl From<rusqlite::Error> for DriverFailure {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message) => DriverFailure::with_code(
                code.extended_code.to_string(),
                message.clone().unwrap_or_else(|| err.to_string()),
            ),
            _ => DriverFailure::new(err.to_string()),
        }
    }
}

/// Blocking driver over one SQLite connection.
///
/// SQLite understands `:name` parameters natively, so statements are prepared as rendered.
#[derive(Debug)]
pub struct SqliteDriver {
    conn: Connection,
}

impl SqliteDriver {
    /// Open (or create) a database file. `":memory:"` opens an in-memory database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DriverFailure> {
        let path = path.as_ref();
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn memory() -> Result<Self, DriverFailure> {
        Self::open(":memory:")
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run several `;`-separated statements without parameters (schema setup, fixtures).
    pub fn execute_batch(&self, sql: &str) -> Result<(), DriverFailure> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn prepare(&self, sql: &str, params: &Bindings) -> Result<Statement<'_>, DriverFailure> {
        let mut stmt = self.conn.prepare(sql)?;
        for (name, value) in params.iter() {
            // Bindings the statement does not reference are skipped.
            let Some(index) = stmt.parameter_index(&format!(":{name}"))? else {
                continue;
            };
            bind(&mut stmt, index, value)?;
        }
        Ok(stmt)
    }
}

fn bind(stmt: &mut Statement<'_>, index: usize, value: &Value) -> Result<(), DriverFailure> {
    match value {
        Value::Null => stmt.raw_bind_parameter(index, Null),
        Value::Bool(b) => stmt.raw_bind_parameter(index, i64::from(*b)),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => stmt.raw_bind_parameter(index, i),
            (None, Some(f)) => stmt.raw_bind_parameter(index, f),
            (None, None) => stmt.raw_bind_parameter(index, n.to_string()),
        },
        Value::String(s) => stmt.raw_bind_parameter(index, s.as_str()),
        other => stmt.raw_bind_parameter(index, other.to_string()),
    }?;
    Ok(())
}

fn decode(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn fetch(&self, sql: &str, params: &Bindings) -> Result<Vec<Row>, DriverFailure> {
        let mut stmt = self.prepare(sql, params)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = Vec::new();
        let mut raw = stmt.raw_query();
        while let Some(row) = raw.next()? {
            let mut out = Row::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                out.insert(name.clone(), decode(row.get_ref(i)?));
            }
            rows.push(out);
        }
        Ok(rows)
    }

    fn execute(&self, sql: &str, params: &Bindings) -> Result<Execution, DriverFailure> {
        let mut stmt = self.prepare(sql, params)?;
        let affected = stmt.raw_execute()?;
        let is_insert = sql.trim_start().get(..6).is_some_and(|kw| kw.eq_ignore_ascii_case("insert"));
        Ok(Execution {
            affected: affected as u64,
            last_insert_id: is_insert.then(|| self.conn.last_insert_rowid()),
        })
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, DriverFailure> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let names = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}
