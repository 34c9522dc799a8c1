//! Write guard middleware.
//!
//! Every request passes through here before routing. Reads go straight
//! through; writes must first clear the per-client rate check and then,
//! for inserts into the catalog collection, the record cap.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath, Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
    RequestExt,
};

use crate::http::response::json_error;
use crate::observability::metrics;
use crate::security::catalog::CatalogCap;
use crate::security::rate_limit::{Admission, WriteLimiter};
use crate::store::SharedStore;

pub const RATE_LIMITED_MESSAGE: &str = "Limite de operações atingido. Tente novamente em 1 minuto.";
pub const COLLECTION_FULL_MESSAGE: &str = "Limite máximo de produtos atingido";

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const COLLECTION_ROUTE: &str = "/{resource}";

/// The guard's verdict on one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    RateLimited,
    CollectionFull,
}

impl GuardDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardDecision::Allow => "allow",
            GuardDecision::RateLimited => "rate_limited",
            GuardDecision::CollectionFull => "collection_full",
        }
    }
}

/// Decision plus the limiter state it was based on. `admission` is `None`
/// for requests the limiter never saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub decision: GuardDecision,
    pub admission: Option<Admission>,
}

/// POST, PUT, PATCH and DELETE.
pub fn is_write_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Rate limiter and catalog cap, applied in that order.
pub struct WriteGuard {
    limiter: WriteLimiter,
    cap: CatalogCap,
    store: SharedStore,
    trust_proxy: bool,
}

impl WriteGuard {
    pub fn new(limiter: WriteLimiter, cap: CatalogCap, store: SharedStore) -> Self {
        Self {
            limiter,
            cap,
            store,
            trust_proxy: false,
        }
    }

    /// Key clients by the first `X-Forwarded-For` hop.
    pub fn trust_proxy(mut self, trust: bool) -> Self {
        self.trust_proxy = trust;
        self
    }

    pub fn limiter(&self) -> &WriteLimiter {
        &self.limiter
    }

    /// Decide what to do with a request from `client`. `target` is the
    /// collection named by a `/{resource}` route, already percent-decoded.
    pub async fn evaluate(&self, method: &Method, target: Option<&str>, client: IpAddr) -> Verdict {
        if !is_write_method(method) {
            return Verdict {
                decision: GuardDecision::Allow,
                admission: None,
            };
        }

        let admission = self.limiter.check(client);
        if !admission.allowed {
            return Verdict {
                decision: GuardDecision::RateLimited,
                admission: Some(admission),
            };
        }

        if self.cap.applies_to(method, target) {
            let current = self.store.collection_len(self.cap.collection()).await;
            if self.cap.is_full(current) {
                return Verdict {
                    decision: GuardDecision::CollectionFull,
                    admission: Some(admission),
                };
            }
        }

        Verdict {
            decision: GuardDecision::Allow,
            admission: Some(admission),
        }
    }

    /// Client address used as the rate-limit key.
    pub fn client_ip(&self, request: &Request<Body>) -> IpAddr {
        if self.trust_proxy {
            let forwarded = request
                .headers()
                .get(X_FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse::<IpAddr>().ok());
            if let Some(ip) = forwarded {
                return ip;
            }
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

/// Resource name a request addresses on the `/{resource}` route, decoded
/// the same way the handlers decode it.
async fn collection_target(request: &mut Request<Body>) -> Option<String> {
    let matched = request.extensions().get::<MatchedPath>()?;
    if matched.as_str() != COLLECTION_ROUTE {
        return None;
    }
    request
        .extract_parts::<Path<String>>()
        .await
        .ok()
        .map(|Path(resource)| resource)
}

/// Middleware function for the write guard.
pub async fn write_guard_middleware(
    State(guard): State<Arc<WriteGuard>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !is_write_method(request.method()) {
        return next.run(request).await;
    }

    let client = guard.client_ip(&request);
    let target = collection_target(&mut request).await;
    let verdict = guard
        .evaluate(request.method(), target.as_deref(), client)
        .await;
    metrics::record_write_decision(verdict.decision.as_str());

    match verdict.decision {
        GuardDecision::Allow => {
            let mut response = next.run(request).await;
            if let Some(admission) = verdict.admission {
                insert_rate_headers(response.headers_mut(), &admission);
            }
            response
        }
        GuardDecision::RateLimited => {
            tracing::warn!(
                client = %client,
                method = %request.method(),
                path = %request.uri().path(),
                "Write rate limit exceeded"
            );
            let mut response = json_error(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE);
            if let Some(admission) = verdict.admission {
                insert_rate_headers(response.headers_mut(), &admission);
                response.headers_mut().insert(
                    axum::http::header::RETRY_AFTER,
                    HeaderValue::from(reset_secs(&admission)),
                );
            }
            response
        }
        GuardDecision::CollectionFull => {
            tracing::warn!(
                client = %client,
                path = %request.uri().path(),
                "Catalog record cap reached"
            );
            let mut response = json_error(StatusCode::FORBIDDEN, COLLECTION_FULL_MESSAGE);
            if let Some(admission) = verdict.admission {
                insert_rate_headers(response.headers_mut(), &admission);
            }
            response
        }
    }
}

/// Whole seconds until reset, rounded up.
fn reset_secs(admission: &Admission) -> u64 {
    let reset = admission.reset_after;
    reset.as_secs() + u64::from(reset.subsec_nanos() > 0)
}

fn insert_rate_headers(headers: &mut HeaderMap, admission: &Admission) {
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(admission.limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(admission.remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(reset_secs(admission)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::rate_limit::{ManualClock, MemoryRateStore, WindowPolicy};
    use crate::store::Store;
    use serde_json::{json, Value};
    use std::time::Duration;

    const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));

    fn catalog_with(records: usize) -> Value {
        let items: Vec<Value> = (1..=records)
            .map(|i| json!({ "id": i, "name": format!("product {}", i) }))
            .collect();
        json!({ "products_catalog": items, "orders": [] })
    }

    fn guard(records: usize) -> (WriteGuard, Arc<ManualClock>, SharedStore) {
        let clock = Arc::new(ManualClock::new());
        let store: SharedStore = Arc::new(Store::in_memory(catalog_with(records)).unwrap());
        let limiter = WriteLimiter::new(
            Arc::new(MemoryRateStore::new()),
            clock.clone(),
            WindowPolicy::default(),
        );
        let guard = WriteGuard::new(limiter, CatalogCap::default(), store.clone());
        (guard, clock, store)
    }

    #[test]
    fn test_write_methods() {
        assert!(is_write_method(&Method::POST));
        assert!(is_write_method(&Method::PUT));
        assert!(is_write_method(&Method::PATCH));
        assert!(is_write_method(&Method::DELETE));
        assert!(!is_write_method(&Method::GET));
        assert!(!is_write_method(&Method::HEAD));
        assert!(!is_write_method(&Method::OPTIONS));
    }

    #[tokio::test]
    async fn test_reads_never_touch_limiter() {
        let (guard, _clock, _store) = guard(30);

        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            for _ in 0..20 {
                let verdict = guard.evaluate(&method, Some("products_catalog"), CLIENT).await;
                assert_eq!(verdict.decision, GuardDecision::Allow);
                assert_eq!(verdict.admission, None);
            }
        }

        // The full write budget is still available.
        let verdict = guard.evaluate(&Method::PATCH, None, CLIENT).await;
        assert_eq!(verdict.admission.map(|a| a.remaining), Some(4));
    }

    #[tokio::test]
    async fn test_catalog_full_rejects_post() {
        let (guard, _clock, _store) = guard(30);
        let verdict = guard.evaluate(&Method::POST, Some("products_catalog"), CLIENT).await;
        assert_eq!(verdict.decision, GuardDecision::CollectionFull);
    }

    #[tokio::test]
    async fn test_catalog_below_cap_allows_post() {
        let (guard, _clock, _store) = guard(29);
        let verdict = guard.evaluate(&Method::POST, Some("products_catalog"), CLIENT).await;
        assert_eq!(verdict.decision, GuardDecision::Allow);
    }

    #[tokio::test]
    async fn test_cap_ignores_other_routes_and_methods() {
        let (guard, _clock, _store) = guard(40);

        let cases = [
            (Method::POST, Some("orders")),
            (Method::PUT, Some("products_catalog")),
            (Method::PATCH, None),
            (Method::DELETE, None),
        ];
        for (method, target) in cases {
            let verdict = guard.evaluate(&method, target, CLIENT).await;
            assert_eq!(verdict.decision, GuardDecision::Allow, "{} {:?}", method, target);
        }
    }

    #[tokio::test]
    async fn test_rate_check_runs_before_cap() {
        let (guard, clock, store) = guard(25);

        for _ in 0..5 {
            let verdict = guard.evaluate(&Method::POST, Some("products_catalog"), CLIENT).await;
            assert_eq!(verdict.decision, GuardDecision::Allow);
            store
                .insert("products_catalog", json!({ "name": "new" }))
                .await
                .unwrap();
            clock.advance(Duration::from_secs(2));
        }
        assert_eq!(store.collection_len("products_catalog").await, 30);

        let verdict = guard.evaluate(&Method::POST, Some("products_catalog"), CLIENT).await;
        assert_eq!(verdict.decision, GuardDecision::RateLimited);
    }

    #[tokio::test]
    async fn test_window_reset_readmits_client() {
        let (guard, clock, _store) = guard(0);

        for _ in 0..5 {
            guard.evaluate(&Method::DELETE, None, CLIENT).await;
        }
        let verdict = guard.evaluate(&Method::DELETE, None, CLIENT).await;
        assert_eq!(verdict.decision, GuardDecision::RateLimited);

        clock.advance(Duration::from_secs(60));
        let verdict = guard.evaluate(&Method::POST, Some("products_catalog"), CLIENT).await;
        assert_eq!(verdict.decision, GuardDecision::Allow);
    }

    #[tokio::test]
    async fn test_client_ip_sources() {
        let (guard, _clock, _store) = guard(0);

        let mut request = Request::builder()
            .uri("/orders")
            .header(X_FORWARDED_FOR, "9.9.9.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(guard.client_ip(&request), IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([5, 6, 7, 8], 4000))));
        assert_eq!(guard.client_ip(&request), "5.6.7.8".parse::<IpAddr>().unwrap());

        let guard = guard.trust_proxy(true);
        assert_eq!(guard.client_ip(&request), "9.9.9.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_reset_secs_rounds_up() {
        let admission = Admission {
            allowed: false,
            limit: 5,
            remaining: 0,
            reset_after: Duration::from_millis(1500),
        };
        assert_eq!(reset_secs(&admission), 2);
    }
}
