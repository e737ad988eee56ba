//! Integration tests for the records API over an in-memory SQLite database

use actix_web::{test, web, App};
use serde_json::{json, Value};
use std::sync::Arc;

use records_api::common::config::RecordsConfig;
use records_api::rest::db::{Arguments, Dialect, PoolExecutor, PoolSettings, SqlExecutor};
use records_api::rest::{Authorization, Policies, RestServer};

const SHARKS: &[&str] = &[
    "CREATE TABLE sharks (id INTEGER PRIMARY KEY, name VARCHAR(255) NOT NULL, \
     length INTEGER NOT NULL, sharktype VARCHAR(255) NOT NULL)",
    "INSERT INTO sharks (name, length, sharktype) VALUES \
     ('Sammy', 427, 'Greenland Shark'), ('Tom', 1800, 'Whale Shark'), \
     ('Bob', 1200, 'Basking Shark')",
];

const BLOG: &[&str] = &[
    "CREATE TABLE categories (id INTEGER PRIMARY KEY, name VARCHAR(255) NOT NULL)",
    "CREATE TABLE posts (id INTEGER PRIMARY KEY, \
     category_id INTEGER NOT NULL REFERENCES categories (id), content VARCHAR(255) NOT NULL)",
    "INSERT INTO categories (name) VALUES ('announcement'), ('article')",
    "INSERT INTO posts (category_id, content) VALUES \
     (1, 'blog started'), (2, 'It works!'), (2, 'Second article')",
];

async fn server(statements: &[&str], policies: Policies) -> RestServer {
    let executor = Arc::new(
        PoolExecutor::connect_url(Dialect::Sqlite, "sqlite::memory:", PoolSettings::default())
            .await
            .unwrap(),
    );
    for sql in statements {
        executor
            .execute(sql, &Arguments::new(Dialect::Sqlite))
            .await
            .unwrap();
    }
    let mut config = RecordsConfig::default();
    config.database.driver = "sqlite".to_string();
    config.database.url = Some("sqlite::memory:".to_string());
    RestServer::with_executor(&config, executor, policies).unwrap()
}

macro_rules! app {
    ($server:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($server.state()))
                .configure(RestServer::configure),
        )
        .await
    };
}

// ============================================================================
// Sharks
// ============================================================================

#[actix_web::test]
async fn test_list_is_ordered_by_key() {
    let server = server(SHARKS, Policies::default()).await;
    let app = app!(server);

    let req = test::TestRequest::get().uri("/records/sharks").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let ids: Vec<i64> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(body.get("results").is_none());
}

#[actix_web::test]
async fn test_read_returns_only_row_fields() {
    let server = server(SHARKS, Policies::default()).await;
    let app = app!(server);

    let req = test::TestRequest::get().uri("/records/sharks/3").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        body,
        json!({"id": 3, "name": "Bob", "length": 1200, "sharktype": "Basking Shark"})
    );

    let req = test::TestRequest::get().uri("/records/sharks/4").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "record_not_found");
}

#[actix_web::test]
async fn test_filter_greater_than() {
    let server = server(SHARKS, Policies::default()).await;
    let app = app!(server);

    let req = test::TestRequest::get()
        .uri("/records/sharks?filter=length,gt,1000")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["length"].as_i64().unwrap() > 1000));
}

#[actix_web::test]
async fn test_filter_groups_are_ored() {
    let server = server(SHARKS, Policies::default()).await;
    let app = app!(server);

    let req = test::TestRequest::get()
        .uri("/records/sharks?filter1=name,eq,Sammy&filter2=name,eq,Bob&include=name")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["records"], json!([{"name": "Sammy"}, {"name": "Bob"}]));
}

#[actix_web::test]
async fn test_wide_and_nested_filter_groups() {
    let server = server(SHARKS, Policies::default()).await;
    let app = app!(server);

    for query in ["filter10=id,eq,1", "filter1g=id,eq,1", "filter1=id,eq,1"] {
        let req = test::TestRequest::get()
            .uri(&format!("/records/sharks?{query}"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["records"].as_array().unwrap().len(), 1, "{query}");
    }
}

#[actix_web::test]
async fn test_unconvertible_values_match_nothing() {
    let server = server(SHARKS, Policies::default()).await;
    let app = app!(server);

    let req = test::TestRequest::get()
        .uri("/records/sharks?filter=id,bt,1,")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["records"], json!([]));

    let req = test::TestRequest::get().uri("/records/sharks/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
}

#[actix_web::test]
async fn test_create_then_read() {
    let server = server(SHARKS, Policies::default()).await;
    let app = app!(server);

    let shark = json!({"name": "Mako", "length": 320, "sharktype": "Mako Shark"});
    let req = test::TestRequest::post()
        .uri("/records/sharks")
        .set_json(&shark)
        .to_request();
    let id: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(id, json!(4));

    let req = test::TestRequest::get().uri("/records/sharks/4").to_request();
    let mut body: Value = test::call_and_read_body_json(&app, req).await;
    body.as_object_mut().unwrap().remove("id");
    assert_eq!(body, shark);
}

#[actix_web::test]
async fn test_update_increment_delete() {
    let server = server(SHARKS, Policies::default()).await;
    let app = app!(server);

    let req = test::TestRequest::put()
        .uri("/records/sharks/1")
        .set_json(json!({"name": "Samuel"}))
        .to_request();
    let affected: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(affected, json!(1));

    let req = test::TestRequest::patch()
        .uri("/records/sharks/1")
        .set_json(json!({"length": 3}))
        .to_request();
    let affected: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(affected, json!(1));

    let req = test::TestRequest::get().uri("/records/sharks/1").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!((body["name"].clone(), body["length"].clone()), (json!("Samuel"), json!(430)));

    let req = test::TestRequest::delete().uri("/records/sharks/1,2").to_request();
    let affected: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(affected, json!([1, 1]));
}

#[actix_web::test]
async fn test_pagination() {
    let server = server(SHARKS, Policies::default()).await;
    let app = app!(server);

    let sharks: Vec<Value> = (4..=25)
        .map(|n| json!({"name": format!("Shark {n}"), "length": n, "sharktype": "Test"}))
        .collect();
    let req = test::TestRequest::post()
        .uri("/records/sharks")
        .set_json(Value::Array(sharks))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get()
        .uri("/records/sharks?page=2,10")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["results"], 25);
    let ids: Vec<i64> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, (11..=20).collect::<Vec<_>>());

    let req = test::TestRequest::get().uri("/records/sharks?size=5").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["records"].as_array().unwrap().len(), 5);
    assert!(body.get("results").is_none());
}

#[actix_web::test]
async fn test_failed_item_in_batch_returns_424() {
    let server = server(SHARKS, Policies::default()).await;
    let app = app!(server);

    let req = test::TestRequest::post()
        .uri("/records/sharks")
        .set_json(json!([
            {"name": "Angel", "length": 150, "sharktype": "Angel Shark"},
            {"name": "Nameless"}
        ]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 424);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body[0], 4);
    assert!(body[1]["code"].is_string());
}

// ============================================================================
// Joins
// ============================================================================

#[actix_web::test]
async fn test_join_replaces_foreign_key() {
    let server = server(BLOG, Policies::default()).await;
    let app = app!(server);

    let req = test::TestRequest::get()
        .uri("/records/posts?join=categories")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        body["records"][0],
        json!({"id": 1, "category_id": {"id": 1, "name": "announcement"}, "content": "blog started"})
    );
    assert_eq!(body["records"][2]["category_id"]["name"], "article");
}

#[actix_web::test]
async fn test_join_attaches_children() {
    let server = server(BLOG, Policies::default()).await;
    let app = app!(server);

    let req = test::TestRequest::get()
        .uri("/records/categories/2?join=posts")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let posts = body["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 2);
    assert!(posts.iter().all(|p| p["category_id"] == 2));
}

// ============================================================================
// Policies
// ============================================================================

#[actix_web::test]
async fn test_hidden_table_is_not_found() {
    let policies = Policies {
        authorization: Authorization::new().with_table_rule(|_, table| table != "categories"),
        ..Policies::default()
    };
    let server = server(BLOG, policies).await;
    let app = app!(server);

    let req = test::TestRequest::get().uri("/records/categories").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);

    // the join to a hidden table is skipped
    let req = test::TestRequest::get()
        .uri("/records/posts/1?join=categories")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["category_id"], 1);
}

// ============================================================================
// Definitions
// ============================================================================

#[actix_web::test]
async fn test_column_definitions() {
    let server = server(BLOG, Policies::default()).await;
    let app = app!(server);

    let req = test::TestRequest::get().uri("/columns/posts").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["name"], "posts");
    assert_eq!(body["columns"][1]["fk"], "categories");

    let req = test::TestRequest::post()
        .uri("/columns/posts")
        .set_json(json!({"name": "rating", "type": "integer", "nullable": true}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::put()
        .uri("/columns/posts/rating")
        .set_json(json!({"name": "score"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/records/posts/1").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["score"], Value::Null);

    let req = test::TestRequest::post()
        .uri("/columns")
        .set_json(json!({
            "name": "tags",
            "type": "table",
            "columns": [
                {"name": "id", "type": "integer", "pk": true},
                {"name": "name", "type": "varchar", "length": 50}
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/columns").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let names: Vec<&str> = body["tables"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"tags"));

    let req = test::TestRequest::delete().uri("/columns/tags").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/records/tags").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
}
