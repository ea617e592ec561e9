//! User service
//!
//! Registration (the first account becomes admin), login/logout, session
//! validation and role management.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User, UserRole};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 20;
const PASSWORD_MIN_LEN: usize = 6;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found")]
    UserNotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    /// Create a user service with a custom session lifetime
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Session lifetime in days, also used for the cookie Max-Age
    pub fn session_expiration_days(&self) -> i64 {
        self.session_expiration_days
    }

    /// Register a new user.
    ///
    /// The very first account is created as `admin`; everyone after that
    /// starts as `user`.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a bad username, email or password
    /// - `UserExists` if username or email is already taken
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        validate_register_input(&input)?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }

        if self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let role = if self.is_first_user().await? {
            UserRole::Admin
        } else {
            UserRole::User
        };

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(
            input.username,
            input.full_name,
            input.email,
            password_hash,
            role,
        );

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = created.id, role = %created.role, "Registered user");
        Ok(created)
    }

    /// Check credentials and open a session.
    ///
    /// Accepts either the username or the email address. Records the login
    /// time on success.
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let invalid =
            || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let mut user = self
            .find_user_by_username_or_email(&input.username_or_email)
            .await?
            .ok_or_else(invalid)?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            return Err(invalid());
        }

        let now = Utc::now();
        self.user_repo
            .touch_last_login(user.id, now)
            .await
            .context("Failed to record login")?;
        user.last_login = Some(now);

        let session = Session::new(user.id, Duration::days(self.session_expiration_days));
        let session = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        Ok((user, session))
    }

    /// Invalidate a session
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Returns `None` for unknown or expired tokens. Expired sessions are
    /// deleted on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    /// Paginated user list for the admin panel
    pub async fn list(&self, page: i64, per_page: i64) -> Result<(Vec<User>, i64), UserServiceError> {
        Ok(self
            .user_repo
            .list(page, per_page)
            .await
            .context("Failed to list users")?)
    }

    /// Change a user's role
    pub async fn set_role(&self, id: i64, role: UserRole) -> Result<User, UserServiceError> {
        let user = self
            .user_repo
            .update_role(id, role)
            .await
            .context("Failed to update user role")?
            .ok_or(UserServiceError::UserNotFound)?;

        tracing::info!(user_id = id, role = %role, "Updated user role");
        Ok(user)
    }

    /// Whether no account exists yet
    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?;
        Ok(count == 0)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        Ok(self
            .user_repo
            .get_by_email(username_or_email)
            .await
            .context("Failed to get user by email")?)
    }
}

fn validate_register_input(input: &RegisterInput) -> Result<(), UserServiceError> {
    let username_len = input.username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username_len) {
        return Err(UserServiceError::ValidationError(format!(
            "Username must be {}-{} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    if input.username.chars().any(char::is_whitespace) {
        return Err(UserServiceError::ValidationError(
            "Username cannot contain spaces".to_string(),
        ));
    }
    if !is_valid_email(&input.email) {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    if input.password.chars().count() < PASSWORD_MIN_LEN {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        )));
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(
        username: impl Into<String>,
        full_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            full_name: full_name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_service() -> UserService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
        )
    }

    fn register_input(username: &str, email: &str) -> RegisterInput {
        RegisterInput::new(username, "Some Maker", email, "password123")
    }

    #[tokio::test]
    async fn test_first_user_becomes_admin_then_users() {
        let service = setup_test_service().await;

        let first = service
            .register(register_input("founder", "founder@example.com"))
            .await
            .unwrap();
        assert_eq!(first.role, UserRole::Admin);

        let second = service
            .register(register_input("buyer", "buyer@example.com"))
            .await
            .unwrap();
        assert_eq!(second.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_register_duplicates_fail() {
        let service = setup_test_service().await;
        service
            .register(register_input("maker", "maker@example.com"))
            .await
            .unwrap();

        let same_name = service
            .register(register_input("maker", "other@example.com"))
            .await;
        assert!(matches!(same_name, Err(UserServiceError::UserExists(_))));

        let same_email = service
            .register(register_input("other", "maker@example.com"))
            .await;
        assert!(matches!(same_email, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let service = setup_test_service().await;

        for input in [
            RegisterInput::new("ab", "", "ab@example.com", "password123"),
            RegisterInput::new("a".repeat(21), "", "long@example.com", "password123"),
            RegisterInput::new("has space", "", "space@example.com", "password123"),
            RegisterInput::new("maker", "", "not-an-email", "password123"),
            RegisterInput::new("maker", "", "maker@localhost", "password123"),
            RegisterInput::new("maker", "", "maker@example.com", "short"),
        ] {
            let result = service.register(input).await;
            assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
        }
    }

    #[tokio::test]
    async fn test_login_with_username_or_email() {
        let service = setup_test_service().await;
        service
            .register(register_input("maker", "maker@example.com"))
            .await
            .unwrap();

        let (user, session) = service
            .login(LoginInput::new("maker", "password123"))
            .await
            .unwrap();
        assert_eq!(session.user_id, user.id);
        assert!(user.last_login.is_some());

        let (_, by_email) = service
            .login(LoginInput::new("maker@example.com", "password123"))
            .await
            .unwrap();
        assert_ne!(by_email.id, session.id);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let service = setup_test_service().await;
        service
            .register(register_input("maker", "maker@example.com"))
            .await
            .unwrap();

        let result = service.login(LoginInput::new("maker", "nope-nope")).await;
        assert!(matches!(result, Err(UserServiceError::AuthenticationError(_))));

        let result = service.login(LoginInput::new("ghost", "password123")).await;
        assert!(matches!(result, Err(UserServiceError::AuthenticationError(_))));
    }

    #[tokio::test]
    async fn test_validate_session_and_logout() {
        let service = setup_test_service().await;
        service
            .register(register_input("maker", "maker@example.com"))
            .await
            .unwrap();
        let (_, session) = service
            .login(LoginInput::new("maker", "password123"))
            .await
            .unwrap();

        let user = service.validate_session(&session.id).await.unwrap();
        assert_eq!(user.map(|u| u.username).as_deref(), Some("maker"));

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let service = UserService::with_session_expiration(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
            -1,
        );
        service
            .register(register_input("maker", "maker@example.com"))
            .await
            .unwrap();

        let (_, session) = service
            .login(LoginInput::new("maker", "password123"))
            .await
            .unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_role() {
        let service = setup_test_service().await;
        service
            .register(register_input("founder", "founder@example.com"))
            .await
            .unwrap();
        let buyer = service
            .register(register_input("buyer", "buyer@example.com"))
            .await
            .unwrap();

        let promoted = service.set_role(buyer.id, UserRole::Moderator).await.unwrap();
        assert_eq!(promoted.role, UserRole::Moderator);

        let missing = service.set_role(999, UserRole::Admin).await;
        assert!(matches!(missing, Err(UserServiceError::UserNotFound)));
    }
}
