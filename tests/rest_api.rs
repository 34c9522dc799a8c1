//! End-to-end tests for the REST surface over the JSON document.

use std::sync::Arc;

use axum::http::StatusCode;
use mock_catalog_server::config::ServerConfig;
use mock_catalog_server::store::Store;
use serde_json::{json, Value};

mod common;

/// Configuration with a write budget large enough not to interfere.
fn roomy_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.write_limit.max_requests = 1_000;
    config
}

#[tokio::test]
async fn test_collection_crud() {
    let server = common::start_server(roomy_config(), common::document(2)).await;
    let client = common::client();

    let res = client
        .post(server.url("/orders"))
        .json(&json!({ "product": 1, "qty": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created, json!({ "id": 1, "product": 1, "qty": 2 }));

    let res = client.get(server.url("/orders/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), created);

    let res = client
        .patch(server.url("/orders/1"))
        .json(&json!({ "qty": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "id": 1, "product": 1, "qty": 5 }));

    let res = client
        .put(server.url("/orders/1"))
        .json(&json!({ "product": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "id": 1, "product": 2 }));

    let res = client.delete(server.url("/orders/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({}));

    let res = client.get(server.url("/orders/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({}));
}

#[tokio::test]
async fn test_unknown_resource_is_not_found() {
    let server = common::start_server(roomy_config(), common::document(0)).await;
    let client = common::client();

    let res = client.get(server.url("/customers")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(server.url("/customers"))
        .json(&json!({ "name": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_id_conflicts() {
    let server = common::start_server(roomy_config(), common::document(3)).await;
    let client = common::client();

    let res = client
        .post(server.url("/products_catalog"))
        .json(&json!({ "id": 2, "name": "dup" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_query_and_total_count() {
    let server = common::start_server(roomy_config(), common::document(12)).await;
    let client = common::client();

    let res = client
        .get(server.url("/products_catalog?_page=2&_limit=5"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-total-count"], "12");
    let page: Vec<Value> = res.json().await.unwrap();
    let ids: Vec<i64> = page.iter().map(|p| p["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![6, 7, 8, 9, 10]);

    let res = client
        .get(server.url("/products_catalog?price_gte=100&_sort=price&_order=desc"))
        .send()
        .await
        .unwrap();
    assert!(res.headers().get("x-total-count").is_none());
    let items: Vec<Value> = res.json().await.unwrap();
    let ids: Vec<i64> = items.iter().map(|p| p["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![12, 11, 10]);

    let res = client
        .get(server.url("/products_catalog?_limit=abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_singular_resource() {
    let server = common::start_server(roomy_config(), common::document(0)).await;
    let client = common::client();

    let res = client.get(server.url("/profile")).send().await.unwrap();
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "name": "Loja" }));

    let res = client
        .patch(server.url("/profile"))
        .json(&json!({ "city": "Recife" }))
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.json::<Value>().await.unwrap(),
        json!({ "name": "Loja", "city": "Recife" })
    );

    let res = client
        .post(server.url("/profile"))
        .json(&json!({ "name": "Nova" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "name": "Nova" }));
}

#[tokio::test]
async fn test_database_dump_and_default_headers() {
    let server = common::start_server(roomy_config(), common::document(1)).await;
    let client = common::client();

    let res = client.get(server.url("/db")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["cache-control"], "no-cache");
    assert_eq!(res.headers()["pragma"], "no-cache");
    assert_eq!(res.headers()["expires"], "-1");
    assert!(res.headers().contains_key("x-request-id"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body, common::document(1));

    let res = client
        .get(server.url("/db"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_writes_are_persisted() {
    let path = std::env::temp_dir().join(format!("mock-api-persist-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "products_catalog": [] }"#).unwrap();

    let store = Arc::new(Store::open(&path).await.unwrap());
    let server = common::start_with_store(roomy_config(), store).await;
    let client = common::client();

    let res = client
        .post(server.url("/products_catalog"))
        .json(&json!({ "name": "Persisted" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        on_disk,
        json!({ "products_catalog": [{ "id": 1, "name": "Persisted" }] })
    );

    std::fs::remove_file(path).unwrap_or_default();
}
