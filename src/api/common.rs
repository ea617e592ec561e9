//! Common API utilities and shared types

use serde::{Deserialize, Serialize};

use crate::api::middleware::ApiError;

// ============================================================================
// Pagination Defaults
// ============================================================================

/// Default page number (1-indexed)
pub fn default_page() -> i64 {
    1
}

/// Default page size for admin listings
pub fn default_per_page() -> i64 {
    20
}

/// Largest page size an admin listing will return
pub const MAX_PER_PAGE: i64 = 100;

// ============================================================================
// Query and Response Types
// ============================================================================

/// Admin pagination query parameters
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPaginationQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

impl AdminPaginationQuery {
    /// Page and page size clamped to sane bounds
    pub fn normalized(&self) -> (i64, i64) {
        (self.page.max(1), self.per_page.clamp(1, MAX_PER_PAGE))
    }
}

/// Paged list response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> PagedResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if total == 0 { 0 } else { (total + per_page - 1) / per_page };
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

/// `{"message": "..."}` acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse a numeric path id, answering 400 with the API error body on failure.
pub fn parse_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::validation_error(format!("Invalid {} ID", what)))
}
