mod common;

use common::{RecordingDriver, init_tracing};
use nestorm::{Conditions, OrderTerm, QueryEngine, Relation, Shaping, Value};
use serde_json::json;

#[test]
fn has_many_issues_one_batched_query() {
    init_tracing();
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let users = engine
        .find("users")
        .order("id")
        .unwrap()
        .contain(Relation::has_many("posts").build().unwrap())
        .unwrap()
        .all()
        .unwrap();
    let rows = users.rows().unwrap();

    assert_eq!(
        driver.statements(),
        [
            "SELECT \"users\".* FROM \"users\" ORDER BY \"id\" ASC",
            "SELECT \"posts\".* FROM \"posts\" WHERE \"user_id\" IN (1, 2, 3, 4)",
        ]
    );
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["posts"].as_array().unwrap().len(), 2);
    assert_eq!(rows[1]["posts"].as_array().unwrap().len(), 2);
    assert_eq!(rows[2]["posts"], json!([]));
    assert_eq!(rows[3]["posts"], json!([]));

    // materialized once
    users.rows().unwrap();
    assert_eq!(driver.statements().len(), 2);
}

#[test]
fn has_one_reads_columns_from_metadata() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let ada = engine
        .find("users")
        .contain(Relation::has_one("profiles").build().unwrap())
        .unwrap()
        .by_id(1)
        .unwrap()
        .unwrap();

    let sql = &driver.statements()[0];
    assert!(sql.starts_with("SELECT \"users\".*, \"profiles\".\"id\" AS \"__contain_profiles__id\""));
    assert!(sql.contains("\"profiles\".\"bio\" AS \"__contain_profiles__bio\""));
    assert!(sql.contains("LEFT JOIN \"profiles\" ON \"profiles\".\"user_id\" = \"users\".\"id\""));
    assert!(sql.contains("WHERE \"users\".\"id\" = :cnd_users_id"));

    assert_eq!(ada["id"], json!(1));
    assert_eq!(ada["first"], json!("Ada"));
    assert_eq!(
        ada["profiles"],
        json!({"id": 10, "user_id": 1, "country_id": 1, "bio": "analyst"})
    );
    assert!(ada.keys().all(|k| !k.starts_with("__contain_")));

    let grace = engine
        .find("users")
        .contain(Relation::has_one("profiles").build().unwrap())
        .unwrap()
        .by_id(3)
        .unwrap()
        .unwrap();
    assert_eq!(grace["profiles"], Value::Null);
}

#[test]
fn nested_relations_load_level_by_level() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let rows = engine
        .find("users")
        .r#where(Conditions::new().is_in("id", [1, 2]))
        .unwrap()
        .order("id")
        .unwrap()
        .contain(
            Relation::has_one("profiles")
                .fields(["bio", "country_id"])
                .contain(Relation::belongs_to("countries").fields(["name"]))
                .build()
                .unwrap(),
        )
        .unwrap()
        .contain(
            Relation::has_many("posts")
                .order(OrderTerm::asc("id"))
                .contain(Relation::has_many("comments"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .all()
        .unwrap()
        .into_rows()
        .unwrap();

    let statements = driver.statements();
    assert_eq!(statements.len(), 3);
    assert!(statements[0].contains(
        "LEFT JOIN \"countries\" ON \"countries\".\"id\" = \"profiles\".\"country_id\""
    ));
    assert_eq!(
        statements[1],
        "SELECT \"posts\".* FROM \"posts\" WHERE \"user_id\" IN (1, 2) ORDER BY \"id\" ASC"
    );
    assert_eq!(
        statements[2],
        "SELECT \"comments\".* FROM \"comments\" WHERE \"post_id\" IN (100, 101, 102, 103)"
    );

    assert_eq!(
        rows[0]["profiles"],
        json!({"bio": "analyst", "country_id": 1, "countries": {"name": "New Zealand"}})
    );
    assert_eq!(
        rows[1]["profiles"],
        json!({"bio": "logician", "country_id": null, "countries": null})
    );

    let ada_posts = rows[0]["posts"].as_array().unwrap();
    assert_eq!(ada_posts[0]["comments"].as_array().unwrap().len(), 2);
    assert_eq!(ada_posts[1]["comments"], json!([]));
    let alan_posts = rows[1]["posts"].as_array().unwrap();
    assert_eq!(alan_posts[0]["comments"][0]["body"], json!("halting"));
}

#[test]
fn to_many_under_to_one_reads_embedded_keys() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    // posts -> author (belongsTo users) -> profiles of that author (hasMany)
    let rows = engine
        .find("posts")
        .order("id")
        .unwrap()
        .contain(
            Relation::belongs_to("users")
                .alias("author")
                .fields(["first"])
                .contain(Relation::has_many("profiles"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .all()
        .unwrap()
        .into_rows()
        .unwrap();

    // binding key of the nested to-many relation is selected automatically
    assert_eq!(rows[0]["author"]["id"], json!(1));
    assert_eq!(rows[0]["author"]["profiles"][0]["bio"], json!("analyst"));
    assert_eq!(rows[2]["author"]["first"], json!("Alan"));
    assert_eq!(rows[2]["author"]["profiles"][0]["id"], json!(11));
    assert_eq!(driver.statements().len(), 2);
    assert!(driver.statements()[1].ends_with("WHERE \"user_id\" IN (1, 2)"));
}

#[test]
fn belongs_to_many_goes_through_junction() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let rows = engine
        .find("users")
        .order("id")
        .unwrap()
        .contain(Relation::belongs_to_many("tags").fields(["label"]).build().unwrap())
        .unwrap()
        .all()
        .unwrap()
        .into_rows()
        .unwrap();

    let secondary = &driver.statements()[1];
    assert!(secondary.starts_with(
        "SELECT \"tags\".\"label\", \"tags_users\".\"user_id\" AS \"__pivot_parent_key\" FROM \"tags\""
    ));
    assert!(secondary.contains("INNER JOIN \"tags_users\" ON \"tags_users\".\"tag_id\" = \"tags\".\"id\""));
    assert!(secondary.ends_with("WHERE \"tags_users\".\"user_id\" IN (1, 2, 3, 4)"));

    let mut labels: Vec<&str> = rows[0]["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["label"].as_str().unwrap())
        .collect();
    labels.sort();
    assert_eq!(labels, ["computing", "math"]);
    assert_eq!(rows[1]["tags"], json!([{"label": "computing"}]));
    assert_eq!(rows[2]["tags"], json!([]));
}

#[test]
fn to_many_shaping_orders_limits_and_projects() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let rows = engine
        .find("users")
        .order("id")
        .unwrap()
        .contain(
            Relation::has_many("posts")
                .order(OrderTerm::desc("id"))
                .limit(1)
                .shape(Shaping::column("title"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .all()
        .unwrap()
        .into_rows()
        .unwrap();

    assert_eq!(rows[0]["posts"], json!(["Bernoulli numbers"]));
    assert_eq!(rows[1]["posts"], json!(["Draft"]));
    assert_eq!(rows[2]["posts"], json!([]));
}

#[test]
fn explicit_fields_gain_foreign_key_and_conditions_filter_children() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let rows = engine
        .find("users")
        .fields(["first"])
        .unwrap()
        .order("id")
        .unwrap()
        .contain(
            Relation::has_many("posts")
                .fields(["title"])
                .conditions(Conditions::new().eq("published", true))
                .shape(Shaping::by("title"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .all()
        .unwrap()
        .into_rows()
        .unwrap();

    assert_eq!(
        driver.statements(),
        [
            "SELECT \"first\", \"id\" FROM \"users\" ORDER BY \"id\" ASC",
            "SELECT \"title\", \"user_id\" FROM \"posts\" WHERE \"user_id\" IN (1, 2, 3, 4) AND \"published\" = :cnd_published",
        ]
    );
    assert_eq!(
        rows[1]["posts"],
        json!({"Computable numbers": {"title": "Computable numbers", "user_id": 2}})
    );
    assert_eq!(rows[3]["posts"], json!({}));
}

#[test]
fn replace_conditions_substitute_the_key_filter() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let rows = engine
        .find("users")
        .order("id")
        .unwrap()
        .limit(1, None)
        .unwrap()
        .contain(
            Relation::has_many("posts")
                .replace_conditions(Conditions::new().is_in("user_id", [1]))
                .build()
                .unwrap(),
        )
        .unwrap()
        .all()
        .unwrap()
        .into_rows()
        .unwrap();

    assert_eq!(
        driver.statements()[1],
        "SELECT \"posts\".* FROM \"posts\" WHERE \"user_id\" IN (1)"
    );
    assert_eq!(rows[0]["posts"].as_array().unwrap().len(), 2);
}

#[test]
fn sibling_relations_share_the_parent_snapshot() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let rows = engine
        .find("users")
        .order("id")
        .unwrap()
        .contain(Relation::has_many("posts").build().unwrap())
        .unwrap()
        .contain(Relation::belongs_to_many("tags").build().unwrap())
        .unwrap()
        .all()
        .unwrap()
        .into_rows()
        .unwrap();

    let statements = driver.statements();
    assert_eq!(statements.len(), 3);
    assert!(statements[1].ends_with("IN (1, 2, 3, 4)"));
    assert!(statements[2].ends_with("IN (1, 2, 3, 4)"));
    assert_eq!(rows[0]["posts"].as_array().unwrap().len(), 2);
    assert_eq!(rows[0]["tags"].as_array().unwrap().len(), 2);
}

#[test]
fn shaping_on_absent_field_reports_missing_key() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let err = engine
        .find("users")
        .contain(
            Relation::has_many("posts")
                .shape(Shaping::by("slug"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .all()
        .unwrap()
        .into_rows()
        .unwrap_err();
    assert!(err.is_missing_key());
    assert!(err.to_string().contains("slug"));
}

#[test]
fn string_binding_keys_render_as_literals() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let rows = engine
        .find("users")
        .fields(["first AS name"])
        .unwrap()
        .order("id")
        .unwrap()
        .contain(
            Relation::has_many("posts")
                .binding_key("first")
                .foreign_key("title")
                .build()
                .unwrap(),
        )
        .unwrap()
        .all()
        .unwrap()
        .into_rows()
        .unwrap();

    // the binding key is appended to the explicit field list
    assert_eq!(
        driver.statements()[0],
        "SELECT \"first\" AS \"name\", \"first\" FROM \"users\" ORDER BY \"id\" ASC"
    );
    assert_eq!(
        driver.statements()[1],
        "SELECT \"posts\".* FROM \"posts\" WHERE \"title\" IN ('Ada', 'Alan', 'Grace', 'Linus')"
    );
    assert_eq!(rows[0]["name"], json!("Ada"));
    assert_eq!(rows[0]["posts"], json!([]));
}

#[test]
fn last_orders_by_id_descending() {
    let driver = RecordingDriver::seeded();
    let mut engine = QueryEngine::new(&driver);

    let newest = engine
        .find("posts")
        .contain(Relation::belongs_to("users").fields(["first"]).build().unwrap())
        .unwrap()
        .last()
        .unwrap()
        .unwrap();

    assert_eq!(newest["id"], json!(103));
    assert_eq!(newest["users"], json!({"first": "Alan"}));
    assert!(driver.statements()[0].ends_with("ORDER BY \"posts\".\"id\" DESC LIMIT 1"));
}
