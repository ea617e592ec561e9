//! 3D model listing
//!
//! A listing is created `pending` on upload, moved by moderation, and never
//! deleted. Purchases and print requests do not touch the row; they are
//! recorded as analytics events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Creator name reported when the creator row cannot be joined
pub const UNKNOWN_CREATOR: &str = "Unknown Creator";

/// A listed 3D-printable asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Price in cents
    pub price: i64,
    pub thumbnail_url: String,
    pub model_url: String,
    pub category: String,
    pub status: ModelStatus,
    pub direct_print_enabled: bool,
    pub creator_id: i64,
    /// Size of the model file in bytes
    pub file_size: Option<i64>,
    /// Lowercase file extension without the dot (`glb`, `gltf`, `obj`)
    pub file_format: Option<String>,
    pub polygon_count: Option<i64>,
    /// Admin who last moderated the listing
    pub reviewed_by: Option<i64>,
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Purchases are only accepted for active listings
    pub fn is_purchasable(&self) -> bool {
        self.status == ModelStatus::Active
    }

    /// Direct print needs both the creator's opt-in and an active listing
    pub fn is_printable(&self) -> bool {
        self.direct_print_enabled && self.status == ModelStatus::Active
    }
}

/// Listing joined with its creator's username, as served by the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelWithCreator {
    #[serde(flatten)]
    pub model: Model,
    pub creator_name: String,
}

impl ModelWithCreator {
    pub fn new(model: Model, creator_name: Option<String>) -> Self {
        Self {
            model,
            creator_name: creator_name.unwrap_or_else(|| UNKNOWN_CREATOR.to_string()),
        }
    }
}

/// Moderation status of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// Awaiting review
    #[default]
    Pending,
    /// Approved and visible for purchase
    #[serde(alias = "approved")]
    Active,
    Rejected,
    Archived,
}

impl ModelStatus {
    /// Whether moderation may move a listing into this status
    pub fn is_moderation_target(&self) -> bool {
        !matches!(self, ModelStatus::Pending)
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Pending => write!(f, "pending"),
            ModelStatus::Active => write!(f, "active"),
            ModelStatus::Rejected => write!(f, "rejected"),
            ModelStatus::Archived => write!(f, "archived"),
        }
    }
}

impl FromStr for ModelStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ModelStatus::Pending),
            "active" | "approved" => Ok(ModelStatus::Active),
            "rejected" => Ok(ModelStatus::Rejected),
            "archived" => Ok(ModelStatus::Archived),
            _ => Err(anyhow::anyhow!("Invalid model status: {}", s)),
        }
    }
}

/// Everything needed to insert a freshly uploaded listing
#[derive(Debug, Clone)]
pub struct CreateModelInput {
    pub title: String,
    pub description: String,
    /// Price in cents
    pub price: i64,
    pub thumbnail_url: String,
    pub model_url: String,
    pub category: String,
    pub direct_print_enabled: bool,
    pub creator_id: i64,
    pub file_size: Option<i64>,
    pub file_format: Option<String>,
}

/// Moderation decision applied by an admin
#[derive(Debug, Clone)]
pub struct ModerationInput {
    pub status: ModelStatus,
    pub review_note: Option<String>,
    pub reviewed_by: i64,
}

/// Why a submitted price was refused
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PriceError {
    #[error("Price must be a number")]
    NotANumber,
    #[error("Price cannot be negative")]
    Negative,
    #[error("Price is too large")]
    TooLarge,
}

// Keeps cents well inside the range f64 represents exactly.
const MAX_PRICE_CENTS: f64 = 1e15;

/// Convert a decimal price ("19.99") into cents (1999).
pub fn parse_price_cents(raw: &str) -> Result<i64, PriceError> {
    let value: f64 = raw.trim().parse().map_err(|_| PriceError::NotANumber)?;
    if !value.is_finite() {
        return Err(PriceError::NotANumber);
    }
    if value < 0.0 {
        return Err(PriceError::Negative);
    }
    let cents = (value * 100.0).round();
    if cents > MAX_PRICE_CENTS {
        return Err(PriceError::TooLarge);
    }
    Ok(cents as i64)
}
