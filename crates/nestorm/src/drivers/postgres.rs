//! PostgreSQL driver over `tokio-postgres`, driven by a private current-thread runtime.

use crate::client::{Driver, Execution};
use crate::dialect::Dialect;
use crate::error::DriverFailure;
use crate::qb::Bindings;
use crate::row::{Row, Value};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio::runtime::Runtime;
use tokio_postgres::types::{IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

impl From<tokio_postgres::Error> for DriverFailure {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db_err) => DriverFailure::with_code(db_err.code().code(), db_err.message()),
            None => DriverFailure::new(err.to_string()),
        }
    }
}

/// Blocking driver over one PostgreSQL connection.
///
/// Named `:name` placeholders are rewritten to `$n` before each statement is sent.
pub struct PgDriver {
    runtime: Runtime,
    client: Client,
}

impl std::fmt::Debug for PgDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDriver")
            .field("closed", &self.client.is_closed())
            .finish_non_exhaustive()
    }
}

impl PgDriver {
    /// Connect with a libpq-style connection string (`host=localhost user=postgres`).
    pub fn connect(config: &str) -> Result<Self, DriverFailure> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DriverFailure::new(format!("Failed to start runtime: {e}")))?;
        let (client, connection) = runtime.block_on(tokio_postgres::connect(config, NoTls))?;
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(target: "nestorm.sql", error = %e, "postgres connection closed");
            }
        });
        Ok(Self { runtime, client })
    }

    fn positional<'p>(sql: &str, params: &'p Bindings) -> Result<(String, Vec<PgParam<'p>>), DriverFailure> {
        let (sql, values) = params
            .to_positional(sql, |n| format!("${n}"))
            .map_err(|e| DriverFailure::new(e.to_string()))?;
        Ok((sql, values.into_iter().map(PgParam).collect()))
    }
}

/// A JSON value bound to whatever type the server expects for its placeholder.
#[derive(Debug)]
struct PgParam<'a>(&'a Value);

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind {value} as {ty}").into()
}

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let value = self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }
        let int = || {
            value
                .as_i64()
                .or_else(|| value.as_bool().map(i64::from))
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| mismatch(value, ty))
        };
        let float = || {
            value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| mismatch(value, ty))
        };
        let text = || match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        match *ty {
            Type::BOOL => match value {
                Value::Bool(b) => b.to_sql(ty, out),
                _ => (int()? != 0).to_sql(ty, out),
            },
            Type::INT2 => i16::try_from(int()?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(int()?)?.to_sql(ty, out),
            Type::INT8 => int()?.to_sql(ty, out),
            Type::FLOAT4 => (float()? as f32).to_sql(ty, out),
            Type::FLOAT8 => float()?.to_sql(ty, out),
            Type::JSON | Type::JSONB => value.to_sql(ty, out),
            Type::DATE => NaiveDate::parse_from_str(&text(), "%Y-%m-%d")?.to_sql(ty, out),
            Type::TIMESTAMP => parse_timestamp(&text())?.to_sql(ty, out),
            Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(&text())?
                .with_timezone(&Utc)
                .to_sql(ty, out),
            Type::UUID => uuid::Uuid::parse_str(&text())?.to_sql(ty, out),
            _ => text().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

fn decode(row: &tokio_postgres::Row, idx: usize) -> Result<Value, tokio_postgres::Error> {
    let ty = row.columns()[idx].type_().clone();
    Ok(match ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map_or(Value::Null, Value::from),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map_or(Value::Null, Value::from),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map_or(Value::Null, Value::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map_or(Value::Null, Value::from),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map_or(Value::Null, Value::from),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map_or(Value::Null, |f| Value::from(f64::from(f))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map_or(Value::Null, Value::from),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?.unwrap_or(Value::Null),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map_or(Value::Null, |d| Value::String(d.to_string())),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map_or(Value::Null, |t| Value::String(t.to_string())),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map_or(Value::Null, |t| Value::String(t.to_rfc3339())),
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map_or(Value::Null, |u| Value::String(u.to_string())),
        // text-like and anything without a dedicated mapping
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(s) => s.map_or(Value::Null, Value::String),
            Err(_) => Value::Null,
        },
    })
}

impl Driver for PgDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn fetch(&self, sql: &str, params: &Bindings) -> Result<Vec<Row>, DriverFailure> {
        let (sql, values) = Self::positional(sql, params)?;
        let refs: Vec<&(dyn ToSql + Sync)> = values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        let rows = self.runtime.block_on(self.client.query(sql.as_str(), &refs))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut decoded = Row::with_capacity(row.len());
            for (idx, column) in row.columns().iter().enumerate() {
                decoded.insert(column.name().to_string(), decode(row, idx)?);
            }
            out.push(decoded);
        }
        Ok(out)
    }

    /// PostgreSQL reports no generated key; add `RETURNING` and use `fetch` for that.
    fn execute(&self, sql: &str, params: &Bindings) -> Result<Execution, DriverFailure> {
        let (sql, values) = Self::positional(sql, params)?;
        let refs: Vec<&(dyn ToSql + Sync)> = values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        let affected = self.runtime.block_on(self.client.execute(sql.as_str(), &refs))?;
        Ok(Execution {
            affected,
            last_insert_id: None,
        })
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, DriverFailure> {
        let rows = self.runtime.block_on(self.client.query(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
            &[&table],
        ))?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(DriverFailure::from))
            .collect()
    }
}
