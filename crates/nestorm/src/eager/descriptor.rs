use crate::condition::Conditions;
use crate::error::{OrmError, OrmResult};
use crate::ident::validate_part;
use crate::naming::NamingStrategy;
use crate::qb::join::JoinType;
use crate::result::Shaping;
use crate::state::{Direction, OrderTerm};
use std::sync::Arc;

/// How a related table hangs off its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationMode {
    /// Child row references the parent (`child.fk = parent.id`); joined inline.
    HasOne,
    /// Many child rows reference the parent; loaded by one batched secondary query.
    HasMany,
    /// Parent row references the child (`child.id = parent.fk`); joined inline.
    BelongsTo,
    /// Linked through a junction table; loaded by one batched secondary query.
    BelongsToMany,
}

impl RelationMode {
    pub fn is_to_one(self) -> bool {
        matches!(self, RelationMode::HasOne | RelationMode::BelongsTo)
    }
}

impl std::fmt::Display for RelationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RelationMode::HasOne => "hasOne",
            RelationMode::HasMany => "hasMany",
            RelationMode::BelongsTo => "belongsTo",
            RelationMode::BelongsToMany => "belongsToMany",
        })
    }
}

/// Post-processing applied to each parent's group of to-many rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationShaping {
    pub shape: Option<Shaping>,
    /// Keep at most this many rows per parent.
    pub limit: Option<usize>,
    /// ORDER BY of the secondary query.
    pub order: Vec<OrderTerm>,
}

impl RelationShaping {
    fn is_empty(&self) -> bool {
        self.shape.is_none() && self.limit.is_none() && self.order.is_empty()
    }
}

/// A validated relationship declaration. Build one with [`Relation`].
#[derive(Debug, Clone)]
pub struct RelationshipDescriptor {
    pub mode: RelationMode,
    /// Key under which related data is embedded, and the SQL alias of to-one joins.
    pub alias: String,
    pub table: String,
    /// Referenced key: on the parent for hasOne/hasMany/belongsToMany, on the child for belongsTo.
    pub binding_key: Option<String>,
    /// Referencing key: on the child for hasOne/hasMany, on the parent for belongsTo,
    /// on the junction table for belongsToMany.
    pub foreign_key: Option<String>,
    /// Junction table (belongsToMany).
    pub through: Option<String>,
    /// Junction column referencing the target (belongsToMany).
    pub target_foreign_key: Option<String>,
    /// Target column the junction references (belongsToMany).
    pub target_key: Option<String>,
    pub join_type: JoinType,
    /// ANDed to the inferred join/filter condition.
    pub conditions: Option<Conditions>,
    /// Replaces the inferred join/filter condition entirely.
    pub replace_conditions: Option<Conditions>,
    pub fields: Vec<String>,
    pub nested: Vec<RelationshipDescriptor>,
    pub shaping: RelationShaping,
    pub naming: Option<Arc<dyn NamingStrategy>>,
}

impl RelationshipDescriptor {
    /// The naming strategy this relation resolves with.
    pub fn naming<'a>(&'a self, fallback: &'a dyn NamingStrategy) -> &'a dyn NamingStrategy {
        self.naming.as_deref().unwrap_or(fallback)
    }

    /// Aliases this relation occupies in its parent statement (to-one relations pull their
    /// nested to-one joins into the same statement).
    pub fn aliases(&self) -> Vec<String> {
        let mut out = vec![self.alias.clone()];
        if self.mode.is_to_one() {
            for nested in &self.nested {
                out.extend(nested.aliases());
            }
        }
        out
    }
}

/// Builder for [`RelationshipDescriptor`].
///
/// ```ignore
/// let posts = Relation::has_many("posts")
///     .fields(["id", "title", "user_id"])
///     .order(OrderTerm::desc("id"))
///     .limit(5)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct Relation {
    inner: RelationshipDescriptor,
    join_type: Option<JoinType>,
    nested: Vec<Relation>,
}

impl Relation {
    pub fn new(mode: RelationMode, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            inner: RelationshipDescriptor {
                mode,
                alias: table.clone(),
                table,
                binding_key: None,
                foreign_key: None,
                through: None,
                target_foreign_key: None,
                target_key: None,
                join_type: JoinType::Left,
                conditions: None,
                replace_conditions: None,
                fields: Vec::new(),
                nested: Vec::new(),
                shaping: RelationShaping::default(),
                naming: None,
            },
            join_type: None,
            nested: Vec::new(),
        }
    }

    pub fn has_one(table: impl Into<String>) -> Self {
        Self::new(RelationMode::HasOne, table)
    }

    pub fn has_many(table: impl Into<String>) -> Self {
        Self::new(RelationMode::HasMany, table)
    }

    pub fn belongs_to(table: impl Into<String>) -> Self {
        Self::new(RelationMode::BelongsTo, table)
    }

    pub fn belongs_to_many(table: impl Into<String>) -> Self {
        Self::new(RelationMode::BelongsToMany, table)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.inner.alias = alias.into();
        self
    }

    pub fn binding_key(mut self, key: impl Into<String>) -> Self {
        self.inner.binding_key = Some(key.into());
        self
    }

    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.inner.foreign_key = Some(key.into());
        self
    }

    pub fn through(mut self, junction: impl Into<String>) -> Self {
        self.inner.through = Some(junction.into());
        self
    }

    pub fn target_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.inner.target_foreign_key = Some(key.into());
        self
    }

    pub fn target_key(mut self, key: impl Into<String>) -> Self {
        self.inner.target_key = Some(key.into());
        self
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    pub fn conditions(mut self, conditions: Conditions) -> Self {
        self.inner.conditions = Some(conditions);
        self
    }

    pub fn replace_conditions(mut self, conditions: Conditions) -> Self {
        self.inner.replace_conditions = Some(conditions);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Nest a relation of the related table.
    pub fn contain(mut self, relation: Relation) -> Self {
        self.nested.push(relation);
        self
    }

    pub fn shape(mut self, shaping: Shaping) -> Self {
        self.inner.shaping.shape = Some(shaping);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.inner.shaping.limit = Some(limit);
        self
    }

    pub fn order(mut self, term: OrderTerm) -> Self {
        self.inner.shaping.order.push(term);
        self
    }

    pub fn order_by(self, field: impl Into<String>, direction: Direction) -> Self {
        self.order(OrderTerm {
            field: field.into(),
            direction,
        })
    }

    pub fn naming(mut self, naming: Arc<dyn NamingStrategy>) -> Self {
        self.inner.naming = Some(naming);
        self
    }

    /// Validate and produce the descriptor (nested relations included).
    pub fn build(self) -> OrmResult<RelationshipDescriptor> {
        let Relation {
            mut inner,
            join_type,
            nested,
        } = self;
        let what = format!("{} relation '{}'", inner.mode, inner.alias);

        validate_part(&inner.alias).map_err(|e| context(&what, e))?;
        validate_part(&inner.table).map_err(|e| context(&what, e))?;
        for key in [
            &inner.binding_key,
            &inner.foreign_key,
            &inner.through,
            &inner.target_foreign_key,
            &inner.target_key,
        ]
        .into_iter()
        .flatten()
        {
            validate_part(key).map_err(|e| context(&what, e))?;
        }

        if inner.mode != RelationMode::BelongsToMany
            && (inner.through.is_some() || inner.target_foreign_key.is_some() || inner.target_key.is_some())
        {
            return Err(OrmError::configuration(format!(
                "{what}: through/target keys are only valid for belongsToMany"
            )));
        }
        if inner.mode.is_to_one() && !inner.shaping.is_empty() {
            return Err(OrmError::configuration(format!(
                "{what}: shape/limit/order are only valid for to-many relations"
            )));
        }
        if let Some(join_type) = join_type {
            if !inner.mode.is_to_one() {
                return Err(OrmError::configuration(format!(
                    "{what}: join type is only valid for to-one relations"
                )));
            }
            inner.join_type = join_type;
        }
        if inner.conditions.is_some() && inner.replace_conditions.is_some() {
            return Err(OrmError::configuration(format!(
                "{what}: conditions and replace_conditions are mutually exclusive"
            )));
        }

        let mut built = Vec::with_capacity(nested.len());
        for relation in nested {
            let child = relation.build()?;
            if built
                .iter()
                .any(|b: &RelationshipDescriptor| b.alias == child.alias)
            {
                return Err(OrmError::configuration(format!(
                    "{what}: nested alias '{}' declared twice",
                    child.alias
                )));
            }
            built.push(child);
        }
        inner.nested = built;
        Ok(inner)
    }
}

fn context(what: &str, err: OrmError) -> OrmError {
    match err {
        OrmError::Configuration(msg) => OrmError::configuration(format!("{what}: {msg}")),
        other => other,
    }
}
