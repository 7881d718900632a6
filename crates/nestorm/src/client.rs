//! Driver abstraction the engine executes through.

use crate::dialect::Dialect;
use crate::error::DriverFailure;
use crate::qb::Bindings;
use crate::row::Row;

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Execution {
    pub affected: u64,
    /// Generated key of the inserted row, when the driver can report one.
    pub last_insert_id: Option<i64>,
}

/// A blocking database connection.
///
/// SQL handed to a driver always uses named `:name` placeholders whose values are in
/// `params`; drivers for positional protocols rewrite them with
/// [`Bindings::to_positional`]. Methods take `&self`: drivers manage their own interior
/// mutability so that result sets can keep borrowing the same handle while secondary
/// queries run.
pub trait Driver {
    /// SQL dialect statements for this driver are rendered in.
    fn dialect(&self) -> Dialect;

    /// Run a query and return all rows, columns in select order.
    fn fetch(&self, sql: &str, params: &Bindings) -> Result<Vec<Row>, DriverFailure>;

    /// Run a write statement.
    fn execute(&self, sql: &str, params: &Bindings) -> Result<Execution, DriverFailure>;

    /// Column names of `table`, in table order.
    fn columns(&self, table: &str) -> Result<Vec<String>, DriverFailure>;
}
