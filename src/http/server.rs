//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up the default middleware stack (request id, tracing, CORS,
//!   no-cache headers, body limit, timeout)
//! - Put the write guard in front of every route
//! - Bind server to listener and stop on the shutdown broadcast

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue},
    middleware,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::security::{write_guard_middleware, CatalogCap, WindowPolicy, WriteGuard, WriteLimiter};
use crate::store::SharedStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
}

/// HTTP server for the mock API.
pub struct HttpServer {
    router: Router,
    guard: Arc<WriteGuard>,
}

impl HttpServer {
    /// Create a server whose guard uses the system clock and an in-memory rate store.
    pub fn new(config: ServerConfig, store: SharedStore) -> Self {
        let limiter = WriteLimiter::in_memory(WindowPolicy {
            max_requests: config.write_limit.max_requests,
            window: config.write_limit.window(),
        });
        let guard = WriteGuard::new(limiter, CatalogCap::from_config(&config.catalog), store.clone())
            .trust_proxy(config.listener.trust_proxy);

        Self::with_guard(&config, store, guard)
    }

    /// Create a server around an already-built guard.
    pub fn with_guard(config: &ServerConfig, store: SharedStore, guard: WriteGuard) -> Self {
        let guard = Arc::new(guard);
        let state = AppState { store };
        let router = Self::build_router(config, state, guard.clone());
        Self { router, guard }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState, guard: Arc<WriteGuard>) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/db", get(handlers::database))
            .route(
                "/{resource}",
                get(handlers::list)
                    .post(handlers::create)
                    .put(handlers::replace_singular)
                    .patch(handlers::update_singular),
            )
            .route(
                "/{resource}/{id}",
                get(handlers::show)
                    .put(handlers::replace)
                    .patch(handlers::update)
                    .delete(handlers::destroy),
            )
            .with_state(state)
            .layer(middleware::from_fn_with_state(guard, write_guard_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::PRAGMA,
                HeaderValue::from_static("no-cache"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::EXPIRES,
                HeaderValue::from_static("-1"),
            ))
            .layer(CorsLayer::permissive())
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        self.guard.limiter().spawn_sweeper(shutdown.resubscribe());

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        // Serve with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
