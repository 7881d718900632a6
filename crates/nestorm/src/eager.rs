//! Relationship loading.
//!
//! Relations are declared with [`Relation`] and attached to a select with
//! [`QueryEngine::contain`](crate::QueryEngine::contain):
//! - to-one relations (`hasOne`, `belongsTo`) are joined into the statement; their columns
//!   are selected under `__contain_<alias>__<field>` and folded back into a nested object.
//! - to-many relations (`hasMany`, `belongsToMany`) run exactly one extra query per relation
//!   once the parent rows are fetched, filtered with `IN (<distinct parent keys>)`, and each
//!   parent receives its group as an array (or its shaped projection).

mod descriptor;
pub(crate) mod loader;
mod resolver;

pub use descriptor::{Relation, RelationMode, RelationShaping, RelationshipDescriptor};
pub use resolver::{Junction, ResolvedPlan, Resolver, ToManyPlan, ToOneNode, prefixed};
