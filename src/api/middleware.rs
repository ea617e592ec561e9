//! API middleware
//!
//! Shared application state, the JSON error type, and the session
//! authentication and admin authorization layers.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::config::UploadConfig;
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    CategoryService, CategoryServiceError, ModelService, ModelServiceError, StorageError,
    UploadStore, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub model_service: Arc<ModelService>,
    pub category_service: Arc<CategoryService>,
    pub upload_store: Arc<UploadStore>,
    pub upload_config: Arc<UploadConfig>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    /// Logs the cause and returns a generic message to the client.
    pub fn internal_error(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(error = %message, "Internal error while handling request");
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::UserNotFound => ApiError::not_found("User not found"),
            UserServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<ModelServiceError> for ApiError {
    fn from(e: ModelServiceError) -> Self {
        match e {
            ModelServiceError::NotFound(_) => ApiError::not_found("Model not found"),
            ModelServiceError::NotAvailable(msg)
            | ModelServiceError::InvalidPrintOptions(msg)
            | ModelServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ModelServiceError::PrintDisabled => ApiError::validation_error(e.to_string()),
            ModelServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::DuplicateName(_) | CategoryServiceError::DuplicateSlug(_) => {
                ApiError::conflict(e.to_string())
            }
            CategoryServiceError::NotFound(_) => ApiError::not_found("Category not found"),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Internal(e) => ApiError::internal_error(format!("{:#}", e)),
            other => ApiError::validation_error(other.to_string()),
        }
    }
}

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Extract session token from the `Authorization: Bearer` header or the
/// session cookie. The header wins when both are present.
pub fn extract_session_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Authentication middleware
///
/// Runs before the handler and its extractors, so request bodies are never
/// read for unauthenticated callers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware; must run after [`require_auth`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Moderator-or-admin authorization middleware; must run after [`require_auth`].
pub async fn require_moderator(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_moderator() {
        return Err(ApiError::forbidden("Moderator privileges required"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer test-token-123")]);
        assert_eq!(extract_session_token(&map), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let map = headers(&[(header::COOKIE, "locale=en; session=test-token-456")]);
        assert_eq!(extract_session_token(&map), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer bearer-token"),
            (header::COOKIE, "session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&map), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_ignores_similar_cookie_names() {
        let map = headers(&[(header::COOKIE, "old_session=abc; session=")]);
        assert!(extract_session_token(&map).is_none());
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        let basic = headers(&[(header::AUTHORIZATION, "Basic invalid")]);
        assert!(extract_session_token(&basic).is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::new("SOMETHING", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let error = ApiError::internal_error("database is locked");
        assert_eq!(error.error.code, "INTERNAL_ERROR");
        assert!(!error.error.message.contains("locked"));
    }

    #[test]
    fn test_service_error_mapping() {
        assert_eq!(
            ApiError::from(ModelServiceError::PrintDisabled).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ModelServiceError::NotFound(1)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(CategoryServiceError::DuplicateSlug("art".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(UserServiceError::AuthenticationError("bad".into())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(StorageError::TooLarge { limit: 1 }).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_api_error_with_details() {
        let details = serde_json::json!({"rejected": ["price"]});
        let error = ApiError::with_details("VALIDATION_ERROR", "Invalid", details.clone());
        assert_eq!(error.error.details, Some(details));
    }
}
