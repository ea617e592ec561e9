//! User model
//!
//! Accounts are never hard-deleted; the role decides what a user may do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered marketplace user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique, 3-20 characters)
    pub username: String,
    /// Display name
    pub full_name: String,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// User role
    pub role: UserRole,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last successful login
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// The password must already be hashed with
    /// `services::password::hash_password()`.
    pub fn new(
        username: String,
        full_name: String,
        email: String,
        password_hash: String,
        role: UserRole,
    ) -> Self {
        Self {
            id: 0, // Will be set by the database
            username,
            full_name,
            email,
            password_hash,
            role,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    /// Check if the user is an administrator
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Moderators and admins may see the moderation queue
    pub fn is_moderator(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Moderator)
    }
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular buyer / creator
    #[default]
    User,
    /// Reviews submissions
    Moderator,
    /// Full access, including role changes and categories
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Moderator => write!(f, "moderator"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "moderator" => Ok(UserRole::Moderator),
            "admin" => Ok(UserRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}
