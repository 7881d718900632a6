//! # nestorm
//!
//! Declarative query building with nested relationship loading.
//!
//! ## Features
//!
//! - **Structured intent**: tables, fields, filters and related records are described as
//!   values ([`Conditions`], [`Relation`], [`JoinSpec`]) or parsed from JSON configuration
//! - **Parameterized SQL**: every filter value is bound to a named `:cnd_*` parameter
//! - **Nested results**: to-one relations are joined inline and folded into nested objects;
//!   to-many relations are loaded with one batched query per relation
//! - **Shaping**: project rows with `column`, `combine`, `by` and `grouped_by`
//! - **Dialects**: MySQL-style, SQLite and PostgreSQL rendering; SQLite and PostgreSQL drivers
//! - **Observability**: `tracing` events under `nestorm.sql` and an in-memory query log
//!
//! ## Example
//!
//! ```ignore
//! use nestorm::{Conditions, Operator, QueryEngine, Relation, drivers::SqliteDriver};
//!
//! let driver = SqliteDriver::open("app.db")?;
//! let mut engine = QueryEngine::new(&driver);
//!
//! let users = engine
//!     .find("users")
//!     .r#where(Conditions::new().cmp("age", Operator::Ge, 18))?
//!     .contain(Relation::has_one("profiles").build()?)?
//!     .contain(Relation::has_many("posts").order(OrderTerm::desc("id")).limit(3).build()?)?
//!     .all()?;
//!
//! let emails = users.by("email")?;
//! ```

pub mod client;
pub mod condition;
pub mod config;
pub mod dialect;
pub mod drivers;
pub mod eager;
pub mod engine;
pub mod error;
pub mod ident;
pub mod monitor;
pub mod naming;
pub mod qb;
pub mod result;
pub mod row;
pub mod state;
pub mod table;

pub use client::{Driver, Execution};
pub use condition::{CondEntry, CondValue, Conditions, Connector, Operator};
pub use config::EngineConfig;
pub use dialect::Dialect;
pub use eager::{Relation, RelationMode, RelationshipDescriptor};
pub use engine::{DebugMode, QueryEngine};
pub use error::{DriverFailure, OrmError, OrmResult};
pub use monitor::QueryLog;
pub use naming::{DefaultNaming, NamingStrategy};
pub use qb::{Bindings, CompiledStatement, JoinSpec, JoinType};
pub use result::{ResultSet, Shaping};
pub use row::{Row, RowExt, Value};
pub use state::{Activity, Direction, Field, Limit, OrderTerm, TableRef};
pub use table::{FetchMode, FetchOptions, Fetched, TableDef, TableRegistry};

#[cfg(feature = "sqlite")]
pub use drivers::SqliteDriver;

#[cfg(feature = "postgres")]
pub use drivers::PgDriver;
