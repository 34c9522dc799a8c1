//! REST handlers over the JSON document.
//!
//! Arrays become collections with full CRUD; objects become singular
//! resources that can be read, replaced and patched.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::http::error::ApiError;
use crate::http::response::json_with_total;
use crate::http::server::AppState;
use crate::store::{ListQuery, Resource, StoreError};

/// `GET /health`. Independent of store and limiter state.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /db`: the whole document.
pub async fn database(State(state): State<AppState>) -> Json<Value> {
    Json(state.store.snapshot().await)
}

/// `GET /{resource}`
pub async fn list(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let query = ListQuery::from_pairs(&params)?;
    match state.store.get(&resource, &query).await? {
        Resource::Collection(page) => Ok(json_with_total(Value::Array(page.items), page.total)),
        Resource::Singular(value) => Ok(Json(value).into_response()),
    }
}

/// `POST /{resource}`: insert into a collection, or overwrite a singular resource.
pub async fn create(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let created = match state.store.insert(&resource, body.clone()).await {
        Err(StoreError::NotACollection(_)) => state.store.replace_singular(&resource, body).await?,
        other => other?,
    };
    tracing::debug!(resource = %resource, "Created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /{resource}` on a singular resource.
pub async fn replace_singular(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.store.replace_singular(&resource, body).await?))
}

/// `PATCH /{resource}` on a singular resource.
pub async fn update_singular(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.store.update_singular(&resource, body).await?))
}

/// `GET /{resource}/{id}`
pub async fn show(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.store.find(&resource, &id).await?))
}

/// `PUT /{resource}/{id}`
pub async fn replace(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.store.replace(&resource, &id, body).await?))
}

/// `PATCH /{resource}/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.store.update(&resource, &id, body).await?))
}

/// `DELETE /{resource}/{id}`
pub async fn destroy(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.store.remove(&resource, &id).await?;
    tracing::debug!(resource = %resource, id = %id, "Deleted");
    Ok(Json(json!({})))
}
