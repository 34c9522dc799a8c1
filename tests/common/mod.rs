//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use mock_catalog_server::config::ServerConfig;
use mock_catalog_server::http::HttpServer;
use mock_catalog_server::lifecycle::Shutdown;
use mock_catalog_server::store::{SharedStore, Store};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// A running server bound to an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: SharedStore,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server over an in-memory document.
pub async fn start_server(config: ServerConfig, document: Value) -> TestServer {
    let store: SharedStore = Arc::new(Store::in_memory(document).unwrap());
    start_with_store(config, store).await
}

pub async fn start_with_store(config: ServerConfig, store: SharedStore) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, store.clone());
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestServer {
        addr,
        store,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Document with `catalog_size` products and some other collections.
#[allow(dead_code)]
pub fn document(catalog_size: usize) -> Value {
    let products: Vec<Value> = (1..=catalog_size)
        .map(|i| json!({ "id": i, "name": format!("Product {}", i), "price": i * 10 }))
        .collect();
    json!({
        "products_catalog": products,
        "orders": [],
        "profile": { "name": "Loja" }
    })
}
