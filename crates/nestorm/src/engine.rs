//! Fluent statement façade.
//!
//! A [`QueryEngine`] borrows a [`Driver`] and builds one statement at a time. Opening a
//! statement (`find`, `select`, `insert`, `update`, `delete`) suspends the one being built;
//! a terminal call (`all`, `first`, `count`, `execute`, ...) finalizes the active statement
//! and restores the suspended one.
//!
//! ```ignore
//! let mut engine = QueryEngine::new(&driver);
//! let users = engine
//!     .find("users")
//!     .r#where(Conditions::new().cmp("age", Operator::Ge, 18))?
//!     .contain(Relation::has_many("posts").build()?)?
//!     .all()?;
//! for user in users.iter()? {
//!     println!("{} has {} posts", user["name"], user["posts"].as_array().map_or(0, Vec::len));
//! }
//! ```

use crate::client::{Driver, Execution};
use crate::condition::Conditions;
use crate::config::EngineConfig;
use crate::dialect::Dialect;
use crate::eager::{RelationshipDescriptor, Resolver};
use crate::error::{OrmError, OrmResult};
use crate::monitor::QueryLog;
use crate::naming::{DefaultNaming, NamingStrategy};
use crate::qb::join::JoinSpec;
use crate::qb::mutation::{render_delete, render_insert, render_update};
use crate::qb::select::{render_count, render_select};
use crate::qb::CompiledStatement;
use crate::result::{ResultSet, Shaping};
use crate::row::{Row, Value, row_from_value};
use crate::state::{Activity, Field, Limit, OrderTerm, QueryState, StatementStack, TableRef};
use std::rc::Rc;

const SELECT: &[Activity] = &[Activity::Select];
const INSERT: &[Activity] = &[Activity::Insert];
const UPDATE: &[Activity] = &[Activity::Update];
const WITH_FIELDS: &[Activity] = &[Activity::Select, Activity::Insert, Activity::Update];
const WITH_WHERE: &[Activity] = &[Activity::Select, Activity::Update, Activity::Delete];
const WRITES: &[Activity] = &[Activity::Insert, Activity::Update, Activity::Delete];

/// Everything an engine shares with the engines it spawns for relationship loading.
///
/// Engines are single-threaded, so every shared part is reference counted with `Rc`.
#[derive(Clone)]
pub struct Context<'c> {
    pub(crate) driver: &'c dyn Driver,
    pub(crate) naming: Rc<dyn NamingStrategy>,
    pub(crate) config: Rc<EngineConfig>,
    pub(crate) log: QueryLog,
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("dialect", &self.driver.dialect())
            .field("naming", &self.naming)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// What [`QueryEngine::debug`] renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    /// The statement under construction.
    #[default]
    Active,
    /// The query log.
    Log,
    /// Both.
    All,
}

/// Builds, runs and logs statements over a borrowed driver.
#[derive(Debug)]
pub struct QueryEngine<'c> {
    ctx: Context<'c>,
    stack: StatementStack,
}

impl<'c> QueryEngine<'c> {
    pub fn new(driver: &'c dyn Driver) -> Self {
        Self::with_config(driver, EngineConfig::default())
    }

    pub fn with_config(driver: &'c dyn Driver, config: EngineConfig) -> Self {
        let naming = DefaultNaming::new().reference_suffix(config.reference_suffix.clone());
        Self::from_context(Context {
            driver,
            naming: Rc::new(naming),
            config: Rc::new(config),
            log: QueryLog::new(),
        })
    }

    pub(crate) fn from_context(ctx: Context<'c>) -> Self {
        Self {
            ctx,
            stack: StatementStack::new(),
        }
    }

    /// Replace the naming strategy used to infer foreign keys and junction tables.
    pub fn naming_strategy(mut self, naming: impl NamingStrategy + 'static) -> Self {
        self.ctx.naming = Rc::new(naming);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Dialect statements are rendered in: the configured override, else the driver's.
    pub fn dialect(&self) -> Dialect {
        self.ctx.config.dialect.unwrap_or_else(|| self.ctx.driver.dialect())
    }

    /// Activity of the statement under construction.
    pub fn activity(&self) -> Activity {
        self.stack.activity()
    }

    /// Number of statements suspended behind the active one.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    // ==================== Opening statements ====================

    /// Start a select over `table` (`"users"`, `"users u"`, `"users AS u"`).
    pub fn find(&mut self, table: impl Into<TableRef>) -> &mut Self {
        self.stack.begin(QueryState::new(Activity::Select).with_table(table));
        self
    }

    /// Set the table of a select opened by [`select`](Self::select); otherwise start a
    /// new select like [`find`](Self::find).
    pub fn from(&mut self, table: impl Into<TableRef>) -> &mut Self {
        let table = table.into();
        if let Some(state) = self
            .stack
            .active_mut()
            .filter(|s| s.activity == Activity::Select && s.table.is_none())
        {
            state.table = Some(table);
        } else {
            self.stack.begin(QueryState::new(Activity::Select).with_table(table));
        }
        self
    }

    /// Start a select with `fields`; its table comes from a following [`from`](Self::from).
    pub fn select<I, F>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        let mut state = QueryState::new(Activity::Select);
        state.fields = fields.into_iter().map(Into::into).collect();
        self.stack.begin(state);
        self
    }

    pub fn insert(&mut self, table: impl Into<TableRef>) -> &mut Self {
        self.stack.begin(QueryState::new(Activity::Insert).with_table(table));
        self
    }

    pub fn update(&mut self, table: impl Into<TableRef>) -> &mut Self {
        self.stack.begin(QueryState::new(Activity::Update).with_table(table));
        self
    }

    pub fn delete(&mut self, table: impl Into<TableRef>) -> &mut Self {
        self.stack.begin(QueryState::new(Activity::Delete).with_table(table));
        self
    }

    // ==================== Clauses ====================

    /// Apply a clause to the active statement. Any failure abandons the statement.
    fn clause<F>(&mut self, method: &'static str, allowed: &'static [Activity], apply: F) -> OrmResult<&mut Self>
    where
        F: FnOnce(&mut QueryState) -> OrmResult<()>,
    {
        let state = self.stack.clause(method, allowed)?;
        if let Err(err) = apply(state) {
            self.stack.abandon();
            return Err(err);
        }
        Ok(self)
    }

    /// Append fields. On insert/update the field list restricts which values are written.
    pub fn fields<I, F>(&mut self, fields: I) -> OrmResult<&mut Self>
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        let fields: Vec<Field> = fields.into_iter().map(Into::into).collect();
        self.clause("fields", WITH_FIELDS, |state| {
            state.fields.extend(fields);
            Ok(())
        })
    }

    /// AND `conditions` to the statement's filter.
    pub fn r#where(&mut self, conditions: Conditions) -> OrmResult<&mut Self> {
        self.clause("where", WITH_WHERE, |state| {
            state.conditions.extend(conditions);
            Ok(())
        })
    }

    /// Append order terms from `"name"`, `"name DESC"` or a comma separated list.
    pub fn order(&mut self, spec: &str) -> OrmResult<&mut Self> {
        let terms = OrderTerm::parse_list(spec);
        self.clause("order", SELECT, |state| {
            state.order.extend(terms?);
            Ok(())
        })
    }

    pub fn order_term(&mut self, term: OrderTerm) -> OrmResult<&mut Self> {
        self.clause("order", SELECT, |state| {
            state.order.push(term);
            Ok(())
        })
    }

    /// `limit(10, None)` takes ten rows; `limit(20, Some(10))` skips twenty and takes ten.
    pub fn limit(&mut self, start: u64, count: Option<u64>) -> OrmResult<&mut Self> {
        self.limit_to(Limit::new(start, count))
    }

    pub fn limit_to(&mut self, limit: Limit) -> OrmResult<&mut Self> {
        self.clause("limit", SELECT, |state| {
            state.limit = Some(limit);
            Ok(())
        })
    }

    pub fn join<I>(&mut self, joins: I) -> OrmResult<&mut Self>
    where
        I: IntoIterator<Item = JoinSpec>,
    {
        self.clause("join", SELECT, |state| {
            for join in joins {
                if join.on.is_empty() {
                    return Err(OrmError::configuration(format!(
                        "Join '{}' has no ON condition",
                        join.alias
                    )));
                }
                state.add_join(join)?;
            }
            Ok(())
        })
    }

    /// Embed related rows under the relation's alias.
    pub fn contain(&mut self, relation: RelationshipDescriptor) -> OrmResult<&mut Self> {
        self.clause("contain", SELECT, |state| state.add_relation(relation))
    }

    /// Merge `data` (a JSON object) into the values of an update.
    pub fn set(&mut self, data: Value) -> OrmResult<&mut Self> {
        self.clause("set", UPDATE, |state| {
            state.merge_values(row_from_value(data, "set")?);
            Ok(())
        })
    }

    /// Merge `data` (a JSON object) into the values of an insert.
    pub fn values(&mut self, data: Value) -> OrmResult<&mut Self> {
        self.clause("values", INSERT, |state| {
            state.merge_values(row_from_value(data, "values")?);
            Ok(())
        })
    }

    /// Projection [`ResultSet::shaped`] applies.
    pub fn shape(&mut self, shaping: Shaping) -> OrmResult<&mut Self> {
        self.clause("shape", SELECT, |state| {
            state.shaping = Some(shaping);
            Ok(())
        })
    }

    // ==================== Terminals ====================

    fn record(&self, statement: &CompiledStatement) {
        self.ctx.log.record(statement, &self.ctx.config);
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self.ctx.driver, self.ctx.naming.as_ref())
    }

    fn render(&self, state: &QueryState) -> OrmResult<CompiledStatement> {
        let dialect = self.dialect();
        match state.activity {
            Activity::Select => {
                let plan = self.resolver().expand(&state.relations, state.table()?)?;
                render_select(state, &plan, dialect)
            }
            Activity::Insert => render_insert(state, dialect),
            Activity::Update => render_update(state, dialect),
            Activity::Delete => render_delete(state, dialect),
            Activity::Unset => Err(OrmError::configuration("No statement to render")),
        }
    }

    fn result_set(&self, state: QueryState) -> OrmResult<ResultSet<'c>> {
        let table = state.table()?.clone();
        let plan = self.resolver().expand(&state.relations, &table)?;
        let statement = render_select(&state, &plan, self.dialect())?;
        self.record(&statement);
        Ok(ResultSet::new(
            self.ctx.clone(),
            statement,
            plan,
            state.shaping,
            table.reference().to_string(),
        ))
    }

    /// Run the active insert, update or delete.
    pub fn execute(&mut self) -> OrmResult<Execution> {
        let state = self.stack.finish("execute", WRITES)?;
        let statement = self.render(&state)?;
        self.record(&statement);
        self.ctx
            .driver
            .execute(&statement.sql, &statement.bindings)
            .map_err(|e| e.into_error(&statement.sql, &statement.bindings))
    }

    /// Finalize the active select. Rows are fetched on first access to the result set.
    pub fn all(&mut self) -> OrmResult<ResultSet<'c>> {
        let state = self.stack.finish("all", SELECT)?;
        self.result_set(state)
    }

    /// First row of the active select (limited to one row, keeping any offset).
    pub fn first(&mut self) -> OrmResult<Option<Row>> {
        let mut state = self.stack.finish("first", SELECT)?;
        state.limit = Some(Limit {
            offset: state.limit.and_then(|l| l.offset),
            count: Some(1),
        });
        Ok(self.result_set(state)?.into_rows()?.into_iter().next())
    }

    /// Row with the highest `id`: appends `id DESC` to the order, then [`first`](Self::first).
    pub fn last(&mut self) -> OrmResult<Option<Row>> {
        self.clause("last", SELECT, |state| {
            state.order.push(OrderTerm::desc("id"));
            Ok(())
        })?;
        self.first()
    }

    /// Row whose `id` equals `id`.
    pub fn by_id(&mut self, id: impl Into<Value>) -> OrmResult<Option<Row>> {
        let id = id.into();
        self.clause("by_id", SELECT, |state| {
            state.conditions.extend(Conditions::new().eq("id", id));
            Ok(())
        })?;
        self.first()
    }

    /// `COUNT(*)` of the active select, to-one joins included.
    pub fn count(&mut self) -> OrmResult<u64> {
        let state = self.stack.finish("count", SELECT)?;
        let plan = self
            .resolver()
            .joins_only()
            .expand(&state.relations, state.table()?)?;
        let statement = render_count(&state, &plan, self.dialect())?;
        self.record(&statement);

        let rows = self
            .ctx
            .driver
            .fetch(&statement.sql, &statement.bindings)
            .map_err(|e| e.into_error(&statement.sql, &statement.bindings))?;
        let value = rows
            .first()
            .and_then(|row| row.get("count"))
            .cloned()
            .unwrap_or(Value::Null);
        count_of(&value).ok_or_else(|| OrmError::Other(format!("COUNT(*) returned {value}")))
    }

    /// Whether the active select matches any row.
    pub fn exists(&mut self) -> OrmResult<bool> {
        Ok(self.count()? > 0)
    }

    /// Rendered SQL and bindings of the active statement and/or the query log.
    ///
    /// Rendering the active statement does not finalize it.
    pub fn debug(&self, mode: DebugMode) -> OrmResult<String> {
        let mut sections = Vec::new();
        if matches!(mode, DebugMode::Active | DebugMode::All) {
            match self.stack.active() {
                Some(state) => sections.push(self.render(state)?.to_string()),
                None => sections.push("-- no active statement".to_string()),
            }
        }
        if matches!(mode, DebugMode::Log | DebugMode::All) {
            sections.extend(self.ctx.log.entries().iter().map(ToString::to_string));
        }
        Ok(sections.join("\n\n"))
    }

    /// Finalized statements, oldest first (secondary relationship queries included).
    pub fn query_log(&self) -> Vec<CompiledStatement> {
        self.ctx.log.entries()
    }

    pub fn log(&self) -> &QueryLog {
        &self.ctx.log
    }
}

fn count_of(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
