//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A browsable model category (Gaming, Mechanical, ...).
///
/// Models reference categories by name, so renaming a category does not
/// rewrite existing listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    /// Display name (unique)
    pub name: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Create a new unsaved Category
    pub fn new(name: String, slug: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            slug,
            description,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive name comparison, as used by the catalog filter
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }
}

/// Input for creating a new category
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    /// Generated from the name when absent
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Input for updating a category; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategoryInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
