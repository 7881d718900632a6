use super::descriptor::{RelationMode, RelationshipDescriptor};
use crate::client::Driver;
use crate::condition::Conditions;
use crate::error::{OrmError, OrmResult};
use crate::naming::NamingStrategy;
use crate::qb::Bindings;
use crate::qb::join::JoinSpec;
use crate::state::{Field, TableRef};

const CONTAIN_PREFIX: &str = "__contain_";

/// Output column of to-one relation `alias`'s `field` in the flat parent row.
pub fn prefixed(alias: &str, field: &str) -> String {
    format!("{CONTAIN_PREFIX}{alias}__{field}")
}

/// A to-one relation embedded from prefixed columns of the parent row.
#[derive(Debug, Clone, PartialEq)]
pub struct ToOneNode {
    pub alias: String,
    pub columns: Vec<String>,
    pub children: Vec<ToOneNode>,
}

/// Junction details of a belongsToMany plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    pub table: String,
    /// Junction column referencing the target table.
    pub target_foreign_key: String,
    /// Target column the junction references.
    pub target_key: String,
}

/// A deferred to-many relation.
#[derive(Debug, Clone)]
pub struct ToManyPlan {
    pub descriptor: RelationshipDescriptor,
    /// To-one aliases leading from the root row to the object that owns this relation.
    pub path: Vec<String>,
    /// Key read from the owning object.
    pub parent_key: String,
    /// Key of the fetched rows (child table for hasMany, junction for belongsToMany)
    /// matched against `parent_key`.
    pub child_key: String,
    pub junction: Option<Junction>,
}

/// Everything a statement's relations add to it.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPlan {
    pub joins: Vec<JoinSpec>,
    pub fields: Vec<Field>,
    pub to_one: Vec<ToOneNode>,
    pub to_many: Vec<ToManyPlan>,
    /// Main-table columns the to-many plans read from every root row.
    pub root_keys: Vec<String>,
}

impl ResolvedPlan {
    pub fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.to_many.is_empty()
    }
}

/// Expands relationship descriptors into joins, prefixed fields and deferred plans.
pub struct Resolver<'a> {
    driver: &'a dyn Driver,
    naming: &'a dyn NamingStrategy,
    with_fields: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(driver: &'a dyn Driver, naming: &'a dyn NamingStrategy) -> Self {
        Self {
            driver,
            naming,
            with_fields: true,
        }
    }

    /// Only produce joins (COUNT statements): no column metadata lookups, no fields.
    pub fn joins_only(mut self) -> Self {
        self.with_fields = false;
        self
    }

    pub fn expand(&self, relations: &[RelationshipDescriptor], main: &TableRef) -> OrmResult<ResolvedPlan> {
        let mut plan = ResolvedPlan::default();
        let mut to_one = Vec::new();
        self.expand_level(relations, main.reference(), &main.name, &[], &mut plan, &mut to_one)?;
        plan.to_one = to_one;
        Ok(plan)
    }

    fn expand_level(
        &self,
        relations: &[RelationshipDescriptor],
        parent_alias: &str,
        parent_table: &str,
        path: &[String],
        plan: &mut ResolvedPlan,
        to_one: &mut Vec<ToOneNode>,
    ) -> OrmResult<()> {
        for relation in relations {
            let naming = relation.naming(self.naming);
            tracing::trace!(
                target: "nestorm.sql",
                alias = %relation.alias,
                mode = %relation.mode,
                parent = parent_alias,
                "expanding relation"
            );

            if relation.mode.is_to_one() {
                let node = self.expand_to_one(relation, parent_alias, parent_table, naming, path, plan)?;
                to_one.push(node);
                continue;
            }

            let parent_key = relation.binding_key.clone().unwrap_or_else(|| "id".to_string());
            let child_key = relation
                .foreign_key
                .clone()
                .unwrap_or_else(|| naming.foreign_key(parent_table));
            let junction = (relation.mode == RelationMode::BelongsToMany).then(|| Junction {
                table: relation
                    .through
                    .clone()
                    .unwrap_or_else(|| naming.junction_table(parent_table, &relation.table)),
                target_foreign_key: relation
                    .target_foreign_key
                    .clone()
                    .unwrap_or_else(|| naming.foreign_key(&relation.table)),
                target_key: relation.target_key.clone().unwrap_or_else(|| "id".to_string()),
            });

            if path.is_empty() && !plan.root_keys.contains(&parent_key) {
                plan.root_keys.push(parent_key.clone());
            }
            plan.to_many.push(ToManyPlan {
                descriptor: relation.clone(),
                path: path.to_vec(),
                parent_key,
                child_key,
                junction,
            });
        }
        Ok(())
    }

    fn expand_to_one(
        &self,
        relation: &RelationshipDescriptor,
        parent_alias: &str,
        parent_table: &str,
        naming: &dyn NamingStrategy,
        path: &[String],
        plan: &mut ResolvedPlan,
    ) -> OrmResult<ToOneNode> {
        let alias = relation.alias.as_str();
        let binding_key = relation.binding_key.as_deref().unwrap_or("id");

        let on = match &relation.replace_conditions {
            Some(replace) => replace.clone(),
            None => {
                let mut on = match relation.mode {
                    RelationMode::HasOne => {
                        let fk = relation
                            .foreign_key
                            .clone()
                            .unwrap_or_else(|| naming.foreign_key(parent_table));
                        Conditions::new().column(
                            format!("{alias}.{fk}"),
                            format!("{parent_alias}.{binding_key}"),
                        )
                    }
                    _ => {
                        let fk = relation
                            .foreign_key
                            .clone()
                            .unwrap_or_else(|| naming.foreign_key(&relation.table));
                        Conditions::new().column(
                            format!("{alias}.{binding_key}"),
                            format!("{parent_alias}.{fk}"),
                        )
                    }
                };
                if let Some(extra) = &relation.conditions {
                    on.extend(extra.clone());
                }
                on
            }
        };
        plan.joins.push(
            JoinSpec::new(relation.table.as_str())
                .alias(alias)
                .kind(relation.join_type)
                .on(on),
        );

        let mut columns = Vec::new();
        if self.with_fields {
            columns = if relation.fields.is_empty() {
                self.driver.columns(&relation.table).map_err(|e| {
                    e.into_error(&format!("-- columns of {}", relation.table), &Bindings::new())
                })?
            } else {
                relation.fields.clone()
            };
            if columns.is_empty() {
                return Err(OrmError::configuration(format!(
                    "No columns known for table '{}' (relation '{alias}')",
                    relation.table
                )));
            }
            // Keys nested to-many relations will read from this object.
            for nested in relation.nested.iter().filter(|n| !n.mode.is_to_one()) {
                let key = nested.binding_key.clone().unwrap_or_else(|| "id".to_string());
                if !columns.contains(&key) {
                    columns.push(key);
                }
            }
            plan.fields.extend(columns.iter().map(|c| {
                Field::column(c.as_str())
                    .of(alias)
                    .alias(prefixed(alias, c))
            }));
        }

        let mut child_path = path.to_vec();
        child_path.push(alias.to_string());
        let mut node = ToOneNode {
            alias: alias.to_string(),
            columns,
            children: Vec::new(),
        };
        self.expand_level(
            &relation.nested,
            alias,
            &relation.table,
            &child_path,
            plan,
            &mut node.children,
        )?;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Execution;
    use crate::dialect::Dialect;
    use crate::eager::Relation;
    use crate::error::DriverFailure;
    use crate::naming::DefaultNaming;
    use crate::qb::join::JoinType;
    use crate::row::Row;
    use std::cell::RefCell;

    /// Answers column metadata from a fixed table list and records every lookup.
    struct MetadataDriver {
        lookups: RefCell<Vec<String>>,
    }

    impl MetadataDriver {
        fn new() -> Self {
            Self {
                lookups: RefCell::new(Vec::new()),
            }
        }
    }

    impl Driver for MetadataDriver {
        fn dialect(&self) -> Dialect {
            Dialect::MySql
        }

        fn fetch(&self, _sql: &str, _params: &Bindings) -> Result<Vec<Row>, DriverFailure> {
            panic!("resolver must not run queries")
        }

        fn execute(&self, _sql: &str, _params: &Bindings) -> Result<Execution, DriverFailure> {
            panic!("resolver must not run queries")
        }

        fn columns(&self, table: &str) -> Result<Vec<String>, DriverFailure> {
            self.lookups.borrow_mut().push(table.to_string());
            match table {
                "profiles" => Ok(vec!["id".into(), "user_id".into(), "bio".into()]),
                "countries" => Ok(vec!["id".into(), "name".into()]),
                _ => Err(DriverFailure::new(format!("no such table {table}"))),
            }
        }
    }

    #[test]
    fn has_one_joins_child_on_inferred_foreign_key() {
        let driver = MetadataDriver::new();
        let naming = DefaultNaming::new();
        let relations = vec![Relation::has_one("profiles").build().unwrap()];
        let plan = Resolver::new(&driver, &naming)
            .expand(&relations, &TableRef::new("users"))
            .unwrap();

        assert_eq!(plan.joins.len(), 1);
        assert_eq!(
            plan.joins[0].on,
            Conditions::new().column("profiles.user_id", "users.id")
        );
        let names: Vec<&str> = plan.fields.iter().filter_map(|f| f.output_name()).collect();
        assert_eq!(
            names,
            ["__contain_profiles__id", "__contain_profiles__user_id", "__contain_profiles__bio"]
        );
        assert_eq!(driver.lookups.borrow().as_slice(), ["profiles"]);
        assert!(plan.to_many.is_empty());
    }

    #[test]
    fn belongs_to_nests_joins_after_parent() {
        let driver = MetadataDriver::new();
        let naming = DefaultNaming::new();
        let relations = vec![
            Relation::has_one("profiles")
                .join_type(JoinType::Inner)
                .contain(Relation::belongs_to("countries"))
                .build()
                .unwrap(),
        ];
        let plan = Resolver::new(&driver, &naming)
            .expand(&relations, &TableRef::new("users").alias("u"))
            .unwrap();

        assert_eq!(plan.joins[0].alias, "profiles");
        assert_eq!(plan.joins[0].kind, JoinType::Inner);
        assert_eq!(plan.joins[0].on, Conditions::new().column("profiles.user_id", "u.id"));
        assert_eq!(plan.joins[1].alias, "countries");
        assert_eq!(
            plan.joins[1].on,
            Conditions::new().column("countries.id", "profiles.country_id")
        );
        assert_eq!(plan.to_one[0].children[0].alias, "countries");
    }

    #[test]
    fn to_many_relations_become_plans() {
        let driver = MetadataDriver::new();
        let naming = DefaultNaming::new();
        let relations = vec![
            Relation::has_many("posts").build().unwrap(),
            Relation::belongs_to_many("tags").build().unwrap(),
            Relation::has_one("profiles")
                .fields(["bio"])
                .contain(Relation::has_many("links"))
                .build()
                .unwrap(),
        ];
        let plan = Resolver::new(&driver, &naming)
            .expand(&relations, &TableRef::new("users"))
            .unwrap();

        assert_eq!(plan.to_many.len(), 3);
        assert_eq!(plan.to_many[0].child_key, "user_id");
        assert_eq!(plan.to_many[0].parent_key, "id");
        let junction = plan.to_many[1].junction.as_ref().unwrap();
        assert_eq!(junction.table, "tags_users");
        assert_eq!(junction.target_foreign_key, "tag_id");
        assert_eq!(plan.to_many[2].path, ["profiles"]);
        assert_eq!(plan.to_many[2].child_key, "profile_id");
        assert_eq!(plan.to_one[0].columns, ["bio", "id"]);
        assert_eq!(plan.root_keys, ["id"]);
        // explicit fields: no metadata lookup
        assert!(driver.lookups.borrow().is_empty());
    }

    #[test]
    fn conditions_are_anded_and_replace_conditions_substitute() {
        let driver = MetadataDriver::new();
        let naming = DefaultNaming::new();
        let extra = Conditions::new().eq("visible", 1);
        let relations = vec![
            Relation::has_one("profiles")
                .fields(["bio"])
                .conditions(extra.clone())
                .build()
                .unwrap(),
        ];
        let plan = Resolver::new(&driver, &naming)
            .expand(&relations, &TableRef::new("users"))
            .unwrap();
        let mut expected = Conditions::new().column("profiles.user_id", "users.id");
        expected.extend(extra);
        assert_eq!(plan.joins[0].on, expected);

        let replaced = Conditions::new().column("profiles.owner", "users.uuid");
        let relations = vec![
            Relation::has_one("profiles")
                .fields(["bio"])
                .replace_conditions(replaced.clone())
                .build()
                .unwrap(),
        ];
        let plan = Resolver::new(&driver, &naming)
            .expand(&relations, &TableRef::new("users"))
            .unwrap();
        assert_eq!(plan.joins[0].on, replaced);
    }

    #[test]
    fn metadata_failure_surfaces_as_driver_error() {
        let driver = MetadataDriver::new();
        let naming = DefaultNaming::new();
        let relations = vec![Relation::has_one("ghosts").build().unwrap()];
        let err = Resolver::new(&driver, &naming)
            .expand(&relations, &TableRef::new("users"))
            .unwrap_err();
        assert!(err.is_driver());
    }

    #[test]
    fn joins_only_skips_metadata() {
        let driver = MetadataDriver::new();
        let naming = DefaultNaming::new();
        let relations = vec![Relation::has_one("ghosts").build().unwrap()];
        let plan = Resolver::new(&driver, &naming)
            .joins_only()
            .expand(&relations, &TableRef::new("users"))
            .unwrap();
        assert_eq!(plan.joins.len(), 1);
        assert!(plan.fields.is_empty());
    }
}
