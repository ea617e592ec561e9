//! Admin API endpoints
//!
//! `router` sits behind `require_auth` and `require_admin`; the read-only
//! moderation queue in `moderation_router` also admits moderators.
//!
//! - GET /api/admin/users - Paginated user list
//! - PATCH /api/admin/users/{id} - Change a user's role
//! - GET /api/admin/models[?status=] - Moderation queue (moderator or admin)
//! - PATCH /api/admin/models/{id} - Approve, reject or archive a listing
//! - GET /api/admin/analytics[?type=&limit=] - Event log
//! - POST /api/admin/categories, PATCH/DELETE /api/admin/categories/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use std::str::FromStr;

use crate::api::common::{parse_id, AdminPaginationQuery, PagedResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::models::{parse_status_filter, ListModelsQuery};
use crate::models::{
    AnalyticsEvent, Category, CreateCategoryInput, EventType, ModelStatus, ModelWithCreator,
    ModerationInput, UpdateCategoryInput, User, UserRole,
};

/// Request body for a role change
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

/// Request body for a moderation decision
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerateRequest {
    pub status: String,
    #[serde(default)]
    pub review_note: Option<String>,
}

/// Query parameters for the analytics log
#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}", patch(update_user_role))
        .route("/admin/models/{id}", patch(moderate_model))
        .route("/admin/analytics", get(list_events))
        .route("/admin/categories", post(create_category))
        .route(
            "/admin/categories/{id}",
            patch(update_category).delete(delete_category),
        )
}

/// Routes open to moderators as well as admins
pub fn moderation_router() -> Router<AppState> {
    Router::new().route("/admin/models", get(list_models))
}

/// GET /api/admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<AdminPaginationQuery>,
) -> Result<Json<PagedResponse<User>>, ApiError> {
    let (page, per_page) = query.normalized();
    let (users, total) = state.user_service.list(page, per_page).await?;
    Ok(Json(PagedResponse::new(users, total, page, per_page)))
}

/// PATCH /api/admin/users/{id}
async fn update_user_role(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateRoleRequest>,
) -> Result<Json<User>, ApiError> {
    let id = parse_id(&id, "user")?;
    let role = UserRole::from_str(body.role.trim())
        .map_err(|_| ApiError::validation_error(format!("Invalid role: {}", body.role)))?;

    if id == admin.0.id && role != UserRole::Admin {
        return Err(ApiError::validation_error("Admins cannot remove their own admin role"));
    }

    Ok(Json(state.user_service.set_role(id, role).await?))
}

/// GET /api/admin/models
async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ListModelsQuery>,
) -> Result<Json<Vec<ModelWithCreator>>, ApiError> {
    let status = parse_status_filter(query.status.as_deref())?;
    Ok(Json(state.model_service.list(status).await?))
}

/// PATCH /api/admin/models/{id}
async fn moderate_model(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<String>,
    Json(body): Json<ModerateRequest>,
) -> Result<Json<ModelWithCreator>, ApiError> {
    let id = parse_id(&id, "model")?;
    let status = ModelStatus::from_str(body.status.trim())
        .map_err(|_| ApiError::validation_error(format!("Invalid status: {}", body.status)))?;

    let input = ModerationInput {
        status,
        review_note: body.review_note.filter(|note| !note.trim().is_empty()),
        reviewed_by: admin.0.id,
    };
    Ok(Json(state.model_service.moderate(id, input).await?))
}

/// GET /api/admin/analytics
async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Vec<AnalyticsEvent>>, ApiError> {
    let event_type = match query.event_type.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(raw) => Some(
            EventType::from_str(raw)
                .map_err(|_| ApiError::validation_error(format!("Invalid event type: {}", raw)))?,
        ),
        None => None,
    };
    Ok(Json(state.model_service.events(event_type, query.limit).await?))
}

/// POST /api/admin/categories
async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PATCH /api/admin/categories/{id}
async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    let id = parse_id(&id, "category")?;
    Ok(Json(state.category_service.update(id, body).await?))
}

/// DELETE /api/admin/categories/{id}
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "category")?;
    state.category_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
