//! Category API endpoints
//!
//! - GET /api/categories - All categories ordered by name
//!
//! Writes live under `api::admin`.

use axum::{extract::State, routing::get, Json, Router};

use crate::api::middleware::{ApiError, AppState};
use crate::models::Category;

pub fn router() -> Router<AppState> {
    Router::new().route("/categories", get(list_categories))
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.category_service.list().await?))
}
