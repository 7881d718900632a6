//! Statement state: the clauses of one in-flight statement and the hold stack of
//! suspended parent statements.

use crate::condition::Conditions;
use crate::eager::RelationshipDescriptor;
use crate::error::{OrmError, OrmResult};
use crate::qb::join::JoinSpec;
use crate::result::Shaping;
use crate::row::{Row, Value};

/// What kind of statement is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    Select,
    Insert,
    Update,
    Delete,
    Unset,
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Activity::Select => "select",
            Activity::Insert => "insert",
            Activity::Update => "update",
            Activity::Delete => "delete",
            Activity::Unset => "unset",
        })
    }
}

/// Main table of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name other clauses use to refer to this table.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl From<&str> for TableRef {
    /// Accepts `users`, `users u` and `users AS u`.
    fn from(s: &str) -> Self {
        let words: Vec<&str> = s.split_whitespace().collect();
        match words.as_slice() {
            [name, as_kw, alias] if as_kw.eq_ignore_ascii_case("as") => {
                TableRef::new(*name).alias(*alias)
            }
            [name, alias] => TableRef::new(*name).alias(*alias),
            _ => TableRef::new(s.trim()),
        }
    }
}

impl From<String> for TableRef {
    fn from(s: String) -> Self {
        TableRef::from(s.as_str())
    }
}

/// What a select-list entry selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldName {
    Column(String),
    /// `*`, or `table.*` when the field has a table.
    All,
    /// Raw expression written verbatim (`COUNT(*)`, `MAX(price)`).
    Raw(String),
}

/// One select-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub table: Option<String>,
    pub name: FieldName,
    pub alias: Option<String>,
}

impl Field {
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: FieldName::Column(name.into()),
            alias: None,
        }
    }

    pub fn all() -> Self {
        Self {
            table: None,
            name: FieldName::All,
            alias: None,
        }
    }

    pub fn raw(expr: impl Into<String>) -> Self {
        Self {
            table: None,
            name: FieldName::Raw(expr.into()),
            alias: None,
        }
    }

    pub fn of(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Parse a field spec: `name`, `t.name`, `*`, `t.*`, `expr AS alias`, or a function
    /// call (anything with parentheses) which is kept raw.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        let (body, alias) = split_alias(spec);
        let mut field = if body.contains('(') {
            Field::raw(body)
        } else if body == "*" {
            Field::all()
        } else {
            match body.rsplit_once('.') {
                Some((table, "*")) => Field::all().of(table),
                Some((table, column)) => Field::column(column).of(table),
                None => Field::column(body),
            }
        };
        field.alias = alias.map(str::to_string);
        field
    }

    /// The key this field produces in a result row, if known.
    pub fn output_name(&self) -> Option<&str> {
        match (&self.alias, &self.name) {
            (Some(alias), _) => Some(alias),
            (None, FieldName::Column(c)) => Some(c),
            _ => None,
        }
    }

    /// Whether this field makes `column` of `table` (or of the main table when
    /// `table_is_main`) appear in the output under its own name.
    pub fn covers(&self, table: &str, column: &str, table_is_main: bool) -> bool {
        let same_table = match &self.table {
            Some(t) => t == table,
            None => table_is_main,
        };
        match &self.name {
            FieldName::All => same_table,
            FieldName::Column(c) => {
                same_table && c == column && self.alias.as_deref().is_none_or(|a| a == column)
            }
            FieldName::Raw(_) => self.alias.as_deref() == Some(column),
        }
    }
}

/// Split `expr AS alias` on the last ` AS ` outside parentheses.
fn split_alias(spec: &str) -> (&str, Option<&str>) {
    let bytes = spec.as_bytes();
    let mut depth = 0usize;
    let mut split = None;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b' ' if depth == 0 && bytes.get(i..i + 4).is_some_and(|w| w.eq_ignore_ascii_case(b" AS ")) => {
                split = Some(i);
            }
            _ => {}
        }
    }
    match split {
        Some(pos) => (spec[..pos].trim(), Some(spec[pos + 4..].trim())),
        None => (spec, None),
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::parse(s)
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Field::parse(&s)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: String,
    pub direction: Direction,
}

impl OrderTerm {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    /// Parse `"name"`, `"name DESC"` or a comma separated list of those.
    pub fn parse_list(spec: &str) -> OrmResult<Vec<Self>> {
        let mut terms = Vec::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let words: Vec<&str> = part.split_whitespace().collect();
            let term = match words.as_slice() {
                [field] => OrderTerm::asc(*field),
                [field, dir] if dir.eq_ignore_ascii_case("asc") => OrderTerm::asc(*field),
                [field, dir] if dir.eq_ignore_ascii_case("desc") => OrderTerm::desc(*field),
                _ => {
                    return Err(OrmError::configuration(format!(
                        "Malformed order term '{part}'"
                    )));
                }
            };
            terms.push(term);
        }
        Ok(terms)
    }
}

/// LIMIT clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limit {
    pub offset: Option<u64>,
    pub count: Option<u64>,
}

impl Limit {
    /// `limit(10, None)` limits to ten rows; `limit(20, Some(10))` skips twenty and takes ten.
    pub fn new(start: u64, count: Option<u64>) -> Self {
        match count {
            None => Limit {
                offset: None,
                count: Some(start),
            },
            Some(count) => Limit {
                offset: Some(start),
                count: Some(count),
            },
        }
    }

    /// Read a limit from JSON: `10` or `[20, 10]`.
    pub fn from_json(value: &Value) -> OrmResult<Self> {
        let number = |v: &Value| {
            v.as_u64().ok_or_else(|| {
                OrmError::configuration(format!("Limit bounds must be non-negative integers, got {v}"))
            })
        };
        match value {
            Value::Number(_) => Ok(Limit::new(number(value)?, None)),
            Value::Array(items) => match items.as_slice() {
                [start] => Ok(Limit::new(number(start)?, None)),
                [start, count] => Ok(Limit::new(number(start)?, Some(number(count)?))),
                _ => Err(OrmError::configuration(format!(
                    "Limit expects one or two bounds, got {value}"
                ))),
            },
            other => Err(OrmError::configuration(format!("Malformed limit {other}"))),
        }
    }
}

/// All clauses of one statement.
#[derive(Debug, Clone)]
pub struct QueryState {
    pub activity: Activity,
    pub table: Option<TableRef>,
    pub fields: Vec<Field>,
    pub conditions: Conditions,
    pub joins: Vec<JoinSpec>,
    pub order: Vec<OrderTerm>,
    pub limit: Option<Limit>,
    pub values: Row,
    pub relations: Vec<RelationshipDescriptor>,
    pub shaping: Option<Shaping>,
}

impl QueryState {
    pub fn new(activity: Activity) -> Self {
        Self {
            activity,
            table: None,
            fields: Vec::new(),
            conditions: Conditions::new(),
            joins: Vec::new(),
            order: Vec::new(),
            limit: None,
            values: Row::new(),
            relations: Vec::new(),
            shaping: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<TableRef>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// The main table, or a configuration error when the statement has none yet.
    pub fn table(&self) -> OrmResult<&TableRef> {
        self.table
            .as_ref()
            .ok_or_else(|| OrmError::configuration(format!("{} statement has no table", self.activity)))
    }

    /// Every alias in use: the main table, explicit joins and declared relations.
    pub fn aliases(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(t) = &self.table {
            out.push(t.reference().to_string());
        }
        out.extend(self.joins.iter().map(|j| j.alias.clone()));
        out.extend(self.relations.iter().flat_map(|r| r.aliases()));
        out
    }

    fn ensure_alias_free(&self, alias: &str) -> OrmResult<()> {
        if self.aliases().iter().any(|a| a == alias) {
            return Err(OrmError::configuration(format!(
                "Alias '{alias}' is already used in this statement"
            )));
        }
        Ok(())
    }

    pub fn add_join(&mut self, join: JoinSpec) -> OrmResult<()> {
        self.ensure_alias_free(&join.alias)?;
        self.joins.push(join);
        Ok(())
    }

    pub fn add_relation(&mut self, relation: RelationshipDescriptor) -> OrmResult<()> {
        for alias in relation.aliases() {
            self.ensure_alias_free(&alias)?;
        }
        self.relations.push(relation);
        Ok(())
    }

    /// Merge `data` into the values to write; later keys overwrite earlier ones.
    pub fn merge_values(&mut self, data: Row) {
        for (k, v) in data {
            self.values.insert(k, v);
        }
    }
}

/// The active statement plus the statements suspended while it is built.
#[derive(Debug, Default)]
pub struct StatementStack {
    active: Option<QueryState>,
    held: Vec<QueryState>,
}

impl StatementStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a statement, suspending the active one (if any).
    pub fn begin(&mut self, state: QueryState) {
        if let Some(active) = self.active.take() {
            self.held.push(active);
        }
        self.active = Some(state);
    }

    /// Activity of the active statement (`Unset` when there is none).
    pub fn activity(&self) -> Activity {
        self.active.as_ref().map_or(Activity::Unset, |s| s.activity)
    }

    pub fn active(&self) -> Option<&QueryState> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut QueryState> {
        self.active.as_mut()
    }

    /// Number of suspended statements.
    pub fn depth(&self) -> usize {
        self.held.len()
    }

    /// Borrow the active statement for `method`, which is only valid for `allowed` activities.
    ///
    /// On mismatch the statement under construction is abandoned (and the previous one
    /// restored) before the error is returned.
    pub fn clause(
        &mut self,
        method: &'static str,
        allowed: &'static [Activity],
    ) -> OrmResult<&mut QueryState> {
        let actual = self.activity();
        if !allowed.contains(&actual) {
            self.abandon();
            return Err(OrmError::ActivityMismatch {
                method,
                required: allowed,
                actual,
            });
        }
        self.active.as_mut().ok_or(OrmError::ActivityMismatch {
            method,
            required: allowed,
            actual: Activity::Unset,
        })
    }

    /// Take the active statement for a terminal call and restore the previous one.
    pub fn finish(&mut self, method: &'static str, allowed: &'static [Activity]) -> OrmResult<QueryState> {
        let actual = self.activity();
        let state = self.pop();
        match state {
            Some(state) if allowed.contains(&state.activity) => Ok(state),
            _ => Err(OrmError::ActivityMismatch {
                method,
                required: allowed,
                actual,
            }),
        }
    }

    /// Drop the active statement and restore the previous one.
    pub fn abandon(&mut self) {
        if self.active.is_some() {
            tracing::debug!(target: "nestorm.sql", activity = %self.activity(), "statement abandoned");
        }
        self.pop();
    }

    fn pop(&mut self) -> Option<QueryState> {
        let state = self.active.take();
        self.active = self.held.pop();
        state
    }
}
