//! Authentication API endpoints
//!
//! - POST /api/register - Create an account and sign in
//! - POST /api/login - Sign in with username or email
//! - POST /api/logout - End the current session
//! - GET /api/user - Current user

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser, SESSION_COOKIE};
use crate::models::{Session, User};
use crate::services::{LoginInput, RegisterInput};

/// Request body for user registration
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    pub email: String,
    pub password: String,
}

/// Request body for user login; `username` may also be an email address
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: User,
    pub token: String,
}

/// Routes that do not need a session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/user", get(get_current_user))
}

/// POST /api/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let password = body.password.clone();
    let user = state
        .user_service
        .register(RegisterInput::new(body.username, body.full_name, body.email, body.password))
        .await?;

    let (user, session) = state
        .user_service
        .login(LoginInput::new(user.username, password))
        .await?;

    let headers = session_cookie_headers(&session, state.user_service.session_expiration_days())?;
    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            message: "Registration successful".to_string(),
            user,
            token: session.id,
        }),
    ))
}

/// POST /api/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = state
        .user_service
        .login(LoginInput::new(body.username, body.password))
        .await?;

    let headers = session_cookie_headers(&session, state.user_service.session_expiration_days())?;
    Ok((
        headers,
        Json(AuthResponse {
            message: "Login successful".to_string(),
            user,
            token: session.id,
        }),
    ))
}

/// POST /api/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    state.user_service.logout(&token).await?;

    let clear_cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&clear_cookie)
            .map_err(|e| ApiError::internal_error(e.to_string()))?,
    );

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/user
async fn get_current_user(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}

fn session_cookie_headers(session: &Session, expiration_days: i64) -> Result<HeaderMap, ApiError> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        session.id,
        expiration_days * 24 * 60 * 60
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal_error(e.to_string()))?,
    );
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_cookie_is_http_only() {
        let session = Session::new(7, Duration::days(7));
        let headers = session_cookie_headers(&session, 7).unwrap();
        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();

        assert!(cookie.starts_with(&format!("session={};", session.id)));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=604800"));
    }

    #[test]
    fn test_register_request_uses_camel_case() {
        let body: RegisterRequest = serde_json::from_str(
            r#"{"username":"maker","fullName":"Mae Ker","email":"m@example.com","password":"secret1"}"#,
        )
        .unwrap();
        assert_eq!(body.full_name, "Mae Ker");
    }
}
