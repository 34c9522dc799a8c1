//! Response helpers.
//!
//! # Responsibilities
//! - Build JSON error bodies of the form `{"error": "..."}`
//! - Attach `X-Total-Count` to sliced collection reads

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

pub const X_TOTAL_COUNT: HeaderName = HeaderName::from_static("x-total-count");

/// `{"error": message}` with the given status.
pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// JSON body, plus `X-Total-Count` when the collection was sliced.
pub fn json_with_total(body: Value, total: Option<usize>) -> Response {
    let mut response = Json(body).into_response();
    if let Some(total) = total {
        response
            .headers_mut()
            .insert(X_TOTAL_COUNT, HeaderValue::from(total));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_error_body() {
        let response = json_error(StatusCode::FORBIDDEN, "nope");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "nope" }));
    }

    #[test]
    fn test_total_header_only_when_sliced() {
        let response = json_with_total(json!([]), None);
        assert!(response.headers().get(X_TOTAL_COUNT).is_none());

        let response = json_with_total(json!([]), Some(12));
        assert_eq!(response.headers()[X_TOTAL_COUNT], "12");
    }
}
