mod common;

use common::RecordingDriver;
use nestorm::{
    Activity, Conditions, FetchMode, FetchOptions, Fetched, OrderTerm, OrmError, OrmResult, QueryEngine, Relation,
    TableDef, TableRegistry,
};
use nestorm::row::row_from_value;
use serde_json::json;

fn users() -> OrmResult<TableDef> {
    TableDef::new("users")
        .has_many("posts")?
        .has_one("profiles")?
        .belongs_to_many("tags")
}

fn posts() -> OrmResult<TableDef> {
    TableDef::new("posts")
        .associate(Relation::belongs_to("users").alias("author").fields(["first", "last"]))?
        .associate(Relation::has_many("comments").order(OrderTerm::desc("id")))
}

fn registry() -> TableRegistry {
    let mut registry = TableRegistry::new();
    registry.register("users", users).register("posts", posts);
    registry
}

#[test]
fn fetch_modes_over_a_registered_table() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);
    let users = registry().get("users").unwrap();

    let Fetched::Count(n) = users.fetch(&mut engine, FetchMode::Count, FetchOptions::new()).unwrap() else {
        panic!("count mode returns a count");
    };
    assert_eq!(n, 4);

    let Fetched::Keyed(by_id) = users.fetch(&mut engine, FetchMode::Id, FetchOptions::new()).unwrap() else {
        panic!("id mode returns keyed rows");
    };
    assert_eq!(by_id.keys().collect::<Vec<_>>(), ["1", "2", "3", "4"]);
    assert_eq!(by_id["3"]["first"], json!("Grace"));

    let Fetched::Keyed(names) = users
        .fetch(
            &mut engine,
            FetchMode::parse("combine", &["first", "last", "id"]).unwrap(),
            FetchOptions::new(),
        )
        .unwrap()
    else {
        panic!("combine mode returns keyed values");
    };
    assert_eq!(
        serde_json::Value::Object(names),
        json!({"1": "Ada Lovelace", "2": "Alan Turing", "3": "Grace Hopper", "4": "Linus"})
    );
    assert_eq!(
        driver.statements().last().unwrap(),
        "SELECT \"first\", \"last\", \"id\" FROM \"users\""
    );

    let Fetched::Value(email) = users
        .fetch(
            &mut engine,
            FetchMode::Unique("email".into()),
            FetchOptions::new().conditions(Conditions::new().eq("id", 2)),
        )
        .unwrap()
    else {
        panic!("unique mode returns one value");
    };
    assert_eq!(email, json!("alan@example.com"));
    assert_eq!(
        driver.statements().last().unwrap(),
        "SELECT \"email\" FROM \"users\" WHERE \"id\" = :cnd_id LIMIT 1"
    );
}

#[test]
fn column_modes_keep_row_order() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);
    let posts = registry().get("posts").unwrap();

    let options = || FetchOptions::new().order(OrderTerm::asc("id"));
    let Fetched::Values(owners) = posts
        .fetch(&mut engine, FetchMode::Column("user_id".into()), options())
        .unwrap()
    else {
        panic!("column mode returns values");
    };
    assert_eq!(owners, [json!(1), json!(1), json!(2), json!(2)]);

    let Fetched::Values(owners) = posts
        .fetch(&mut engine, FetchMode::ColumnUnique("user_id".into()), options())
        .unwrap()
    else {
        panic!("column mode returns values");
    };
    assert_eq!(owners, [json!(1), json!(2)]);
}

#[test]
fn contain_by_alias_uses_declared_associations() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);
    let posts = registry().get("posts").unwrap();

    let options = FetchOptions::from_json(&json!({
        "conditions": {"id": 100},
        "contain": ["author", "comments"]
    }))
    .unwrap();
    let Fetched::Row(Some(post)) = posts.fetch(&mut engine, FetchMode::First, options).unwrap() else {
        panic!("first mode returns a row");
    };

    assert_eq!(post["author"], json!({"first": "Ada", "last": "Lovelace"}));
    let bodies: Vec<_> = post["comments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["body"].clone())
        .collect();
    assert_eq!(bodies, [json!("second"), json!("first")]);
    assert_eq!(
        driver.statements()[1],
        "SELECT \"comments\".* FROM \"comments\" WHERE \"post_id\" IN (100) ORDER BY \"id\" DESC"
    );
}

#[test]
fn all_mode_is_lazy() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);
    let users = registry().get("users").unwrap();

    let Fetched::Rows(rows) = users
        .fetch(
            &mut engine,
            FetchMode::All,
            FetchOptions::new().contain("tags").limit(2, None).order(OrderTerm::asc("id")),
        )
        .unwrap()
    else {
        panic!("all mode returns a result set");
    };
    assert!(driver.statements().is_empty());
    assert_eq!(rows.len().unwrap(), 2);
    assert_eq!(rows.get(1).unwrap().unwrap()["tags"][0]["label"], json!("computing"));
    assert_eq!(driver.statements().len(), 2);
}

#[test]
fn unknown_alias_fails_before_any_statement() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);
    let users = registry().get("users").unwrap();

    let err = users
        .fetch(&mut engine, FetchMode::All, FetchOptions::new().contain("comments"))
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(engine.activity(), Activity::Unset);
    assert!(driver.statements().is_empty());
}

#[test]
fn exists_and_get() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);
    let users = registry().get("users").unwrap();

    assert!(users.exists(&mut engine, Conditions::new().eq("first", "Linus")).unwrap());
    assert!(!users.exists(&mut engine, Conditions::new().eq("first", "Dennis")).unwrap());

    let linus = users.get(&mut engine, 4, ["first", "last"]).unwrap().unwrap();
    assert_eq!(serde_json::Value::Object(linus), json!({"first": "Linus", "last": null}));
    assert!(users.get(&mut engine, 99, Vec::<&str>::new()).unwrap().is_none());
}

#[test]
fn id_mode_needs_an_id_column() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let err = TableDef::new("tags_users")
        .fetch(&mut engine, FetchMode::Id, FetchOptions::new())
        .unwrap_err();
    match err {
        OrmError::MissingKey { key, alias } => {
            assert_eq!(key, "id");
            assert_eq!(alias, "tags_users");
        }
        other => panic!("expected a missing key, got {other:?}"),
    }
}

#[test]
fn save_inserts_then_updates_and_delete_removes() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);
    let tags = TableDef::new("tags");

    let row = row_from_value(json!({"id": null, "label": "logic"}), "tag").unwrap();
    let done = tags.save(&mut engine, row).unwrap();
    assert_eq!(done.last_insert_id, Some(3));

    let row = row_from_value(json!({"id": 3, "label": "set theory"}), "tag").unwrap();
    assert_eq!(tags.save(&mut engine, row).unwrap().affected, 1);
    let saved = tags.get(&mut engine, 3, ["label"]).unwrap().unwrap();
    assert_eq!(saved["label"], json!("set theory"));

    assert_eq!(tags.delete(&mut engine, 3).unwrap().affected, 1);
    assert!(tags.get(&mut engine, 3, Vec::<&str>::new()).unwrap().is_none());
    assert!(tags.delete(&mut engine, serde_json::Value::Null).unwrap_err().is_configuration());

    assert_eq!(
        driver.statements()[..2],
        [
            "INSERT INTO \"tags\" (\"label\") VALUES (:label)",
            "UPDATE \"tags\" SET \"label\" = :label WHERE \"id\" = :cnd_id",
        ]
    );
    assert!(driver.statements().contains(&"DELETE FROM \"tags\" WHERE \"id\" = :cnd_id".to_string()));
}
