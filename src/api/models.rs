//! Model catalog API endpoints
//!
//! - GET /api/models[?status=] - Catalog, newest first
//! - GET /api/models/{id} - Single listing
//! - POST /api/models/{id}/purchase - Record a purchase (auth)
//! - POST /api/models/{id}/print - Request a direct print (auth)
//!
//! Listing creation (POST /api/models) lives in `api::upload`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::str::FromStr;

use crate::api::common::{parse_id, MessageResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ModelStatus, ModelWithCreator};

/// Query parameters for the catalog
#[derive(Debug, Deserialize)]
pub struct ListModelsQuery {
    #[serde(default)]
    pub status: Option<String>,
}

/// Parse an optional `status` filter; blank means no filter.
pub fn parse_status_filter(raw: Option<&str>) -> Result<Option<ModelStatus>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => ModelStatus::from_str(s)
            .map(Some)
            .map_err(|_| ApiError::validation_error(format!("Invalid status: {}", s))),
        None => Ok(None),
    }
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/models", get(list_models))
        .route("/models/{id}", get(get_model))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/models/{id}/purchase", post(purchase_model))
        .route("/models/{id}/print", post(request_print))
}

/// GET /api/models
async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ListModelsQuery>,
) -> Result<Json<Vec<ModelWithCreator>>, ApiError> {
    let status = parse_status_filter(query.status.as_deref())?;
    Ok(Json(state.model_service.list(status).await?))
}

/// GET /api/models/{id}
async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ModelWithCreator>, ApiError> {
    let id = parse_id(&id, "model")?;
    Ok(Json(state.model_service.get(id).await?))
}

/// POST /api/models/{id}/purchase
async fn purchase_model(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id, "model")?;
    state.model_service.purchase(id, user.0.id).await?;
    Ok(Json(MessageResponse::new("Purchase successful")))
}

/// POST /api/models/{id}/print
///
/// The body is taken raw so that a listing without direct print answers 400
/// even when the payload is not valid JSON.
async fn request_print(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id, "model")?;
    state
        .model_service
        .request_print(id, user.0.id, &body)
        .await?;
    Ok(Json(MessageResponse::new("Print request submitted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_filter() {
        assert_eq!(parse_status_filter(None).unwrap(), None);
        assert_eq!(parse_status_filter(Some("")).unwrap(), None);
        assert_eq!(parse_status_filter(Some("active")).unwrap(), Some(ModelStatus::Active));
        assert_eq!(parse_status_filter(Some("approved")).unwrap(), Some(ModelStatus::Active));
        assert_eq!(parse_status_filter(Some("pending")).unwrap(), Some(ModelStatus::Pending));
        assert!(parse_status_filter(Some("deleted")).is_err());
    }
}
