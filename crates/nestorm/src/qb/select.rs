use crate::dialect::Dialect;
use crate::eager::ResolvedPlan;
use crate::error::OrmResult;
use crate::ident::{Ident, quote};
use crate::qb::expr::{Scope, compile};
use crate::qb::join::{JoinSpec, compile_joins};
use crate::qb::param::Bindings;
use crate::qb::CompiledStatement;
use crate::state::{Activity, Field, FieldName, QueryState};

struct Frame<'s> {
    main: &'s str,
    joins: Vec<JoinSpec>,
    joined: Vec<String>,
}

impl<'s> Frame<'s> {
    fn new(state: &'s QueryState, plan: &ResolvedPlan) -> OrmResult<Self> {
        let main = state.table()?.reference();
        let joins: Vec<JoinSpec> = state.joins.iter().chain(plan.joins.iter()).cloned().collect();
        let mut joined = vec![main.to_string()];
        joined.extend(joins.iter().map(|j| j.alias.clone()));
        Ok(Self { main, joins, joined })
    }

    /// Qualifier for unqualified columns: the main table, once anything is joined.
    fn qualifier(&self) -> Option<&str> {
        (!self.joins.is_empty()).then_some(self.main)
    }
}

fn render_from(state: &QueryState, frame: &Frame<'_>, dialect: Dialect, bindings: &mut Bindings) -> OrmResult<String> {
    let table = state.table()?;
    let mut sql = format!(" FROM {}", quote(&table.name, dialect)?);
    if let Some(alias) = &table.alias {
        sql.push_str(" AS ");
        sql.push_str(&quote(alias, dialect)?);
    }
    sql.push_str(&compile_joins(&frame.joins, dialect, &frame.joined, bindings)?);

    let scope = Scope::new(dialect)
        .default_table(frame.qualifier())
        .joined(&frame.joined);
    let condition = compile(&state.conditions, &scope, bindings)?;
    if !condition.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&condition);
    }
    Ok(sql)
}

fn render_field(field: &Field, frame: &Frame<'_>, dialect: Dialect) -> OrmResult<String> {
    let mut sql = match &field.name {
        FieldName::Raw(expr) => expr.clone(),
        FieldName::All => {
            let table = field.table.as_deref().unwrap_or(frame.main);
            quote(&format!("{table}.*"), dialect)?
        }
        FieldName::Column(column) => {
            let table = field.table.as_deref().or(frame.qualifier());
            Ident::column(table, column)?.render(dialect)
        }
    };
    if let Some(alias) = &field.alias {
        sql.push_str(" AS ");
        sql.push_str(&quote(alias, dialect)?);
    }
    Ok(sql)
}

/// Select list: user fields (or the main table's `*`), missing relation keys, then the
/// prefixed fields of to-one relations.
fn select_list(state: &QueryState, plan: &ResolvedPlan, frame: &Frame<'_>) -> Vec<Field> {
    let mut fields = Vec::new();
    if state.fields.is_empty() {
        fields.push(Field::all().of(frame.main));
    } else {
        for field in &state.fields {
            let bare_star = field.table.is_none() && field.name == FieldName::All && field.alias.is_none();
            if bare_star {
                fields.push(Field::all().of(frame.main));
                fields.extend(state.joins.iter().map(|j| Field::all().of(j.alias.as_str())));
            } else {
                fields.push(field.clone());
            }
        }
        for key in &plan.root_keys {
            if !fields.iter().any(|f| f.covers(frame.main, key, true)) {
                fields.push(Field::column(key.as_str()));
            }
        }
    }
    fields.extend(plan.fields.iter().cloned());
    fields
}

/// Render a SELECT statement.
pub fn render_select(state: &QueryState, plan: &ResolvedPlan, dialect: Dialect) -> OrmResult<CompiledStatement> {
    let frame = Frame::new(state, plan)?;
    let mut bindings = Bindings::new();

    let fields = select_list(state, plan, &frame);
    let rendered = fields
        .iter()
        .map(|f| render_field(f, &frame, dialect))
        .collect::<OrmResult<Vec<_>>>()?;

    let mut sql = format!("SELECT {}", rendered.join(", "));
    sql.push_str(&render_from(state, &frame, dialect, &mut bindings)?);

    if !state.order.is_empty() {
        let output_names: Vec<&str> = fields.iter().filter_map(|f| f.alias.as_deref()).collect();
        let terms = state
            .order
            .iter()
            .map(|term| {
                let column = if term.field.contains('.') || output_names.contains(&term.field.as_str()) {
                    Ident::parse(&term.field)?
                } else {
                    Ident::column(frame.qualifier(), &term.field)?
                };
                Ok(format!("{} {}", column.render(dialect), term.direction.as_sql()))
            })
            .collect::<OrmResult<Vec<_>>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    if let Some(limit) = state.limit {
        if let Some(clause) = dialect.limit(limit.offset, limit.count) {
            sql.push(' ');
            sql.push_str(&clause);
        }
    }

    Ok(CompiledStatement {
        activity: Activity::Select,
        sql,
        bindings,
    })
}

/// Render `SELECT COUNT(*)` over the statement's table, joins and conditions.
pub fn render_count(state: &QueryState, plan: &ResolvedPlan, dialect: Dialect) -> OrmResult<CompiledStatement> {
    let frame = Frame::new(state, plan)?;
    let mut bindings = Bindings::new();
    let mut sql = format!("SELECT COUNT(*) AS {}", dialect.quote("count"));
    sql.push_str(&render_from(state, &frame, dialect, &mut bindings)?);
    Ok(CompiledStatement {
        activity: Activity::Select,
        sql,
        bindings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Conditions, Operator};
    use crate::state::{Limit, OrderTerm, TableRef};

    fn select(table: &str) -> QueryState {
        QueryState::new(Activity::Select).with_table(TableRef::from(table))
    }

    #[test]
    fn bare_select_uses_main_table_star() {
        let stmt = render_select(&select("users"), &ResolvedPlan::default(), Dialect::MySql).unwrap();
        assert_eq!(stmt.sql, "SELECT `users`.* FROM `users`");
        assert!(stmt.bindings.is_empty());
    }

    #[test]
    fn fields_conditions_order_and_limit() {
        let mut state = select("users");
        state.fields = vec![Field::parse("id"), Field::parse("name AS n"), Field::parse("COUNT(*) AS total")];
        state.conditions = Conditions::new().cmp("age", Operator::Ge, 18);
        state.order = vec![OrderTerm::desc("id"), OrderTerm::asc("n")];
        state.limit = Some(Limit::new(20, Some(10)));

        let stmt = render_select(&state, &ResolvedPlan::default(), Dialect::MySql).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT `id`, `name` AS `n`, COUNT(*) AS `total` FROM `users` WHERE `age` >= :cnd_age ORDER BY `id` DESC, `n` ASC LIMIT 20, 10"
        );

        let stmt = render_select(&state, &ResolvedPlan::default(), Dialect::Sqlite).unwrap();
        assert!(stmt.sql.ends_with("LIMIT 10 OFFSET 20"));
    }

    #[test]
    fn joins_qualify_main_table_columns() {
        let mut state = select("movies m");
        state.fields = vec![Field::parse("*")];
        state.joins = vec![
            JoinSpec::new("authors").on(Conditions::new().eq("authors.id", "m.author_id")),
        ];
        state.conditions = Conditions::new()
            .eq("year", 1999)
            .nested("authors", Conditions::new().eq("name", "X"));
        state.order = vec![OrderTerm::asc("title")];

        let stmt = render_select(&state, &ResolvedPlan::default(), Dialect::MySql).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT `m`.*, `authors`.* FROM `movies` AS `m` LEFT JOIN `authors` ON `authors`.`id` = `m`.`author_id` \
             WHERE `m`.`year` = :cnd_m_year AND `authors`.`name` = :cnd_authors_name ORDER BY `m`.`title` ASC"
        );
    }

    #[test]
    fn root_keys_are_appended_to_explicit_fields() {
        let mut state = select("users");
        state.fields = vec![Field::parse("name")];
        let plan = ResolvedPlan {
            root_keys: vec!["id".to_string()],
            ..ResolvedPlan::default()
        };
        let stmt = render_select(&state, &plan, Dialect::Sqlite).unwrap();
        assert_eq!(stmt.sql, "SELECT \"name\", \"id\" FROM \"users\"");
    }

    #[test]
    fn count_ignores_order_and_limit() {
        let mut state = select("users");
        state.conditions = Conditions::new().eq("active", true);
        state.order = vec![OrderTerm::asc("id")];
        state.limit = Some(Limit::new(1, None));
        let stmt = render_count(&state, &ResolvedPlan::default(), Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) AS \"count\" FROM \"users\" WHERE \"active\" = :cnd_active"
        );
    }

    #[test]
    fn missing_table_is_a_configuration_error() {
        let state = QueryState::new(Activity::Select);
        let err = render_select(&state, &ResolvedPlan::default(), Dialect::MySql).unwrap_err();
        assert!(err.is_configuration());
    }
}
