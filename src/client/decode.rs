//! Listing payload decoding
//!
//! `decode_listings` turns a raw `/api/models` body into validated
//! listings. Bad records are dropped and described; only a broken envelope
//! makes the whole payload invalid.

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// A listing as the client renders it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub creator_name: String,
    pub category: String,
    /// Price in cents
    pub price: u64,
    pub direct_print_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Result of decoding a listings body
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// The envelope was a JSON array; `rejected` describes dropped records
    Decoded {
        listings: Vec<Listing>,
        rejected: Vec<String>,
    },
    /// Not JSON, or not an array
    Malformed(String),
}

impl DecodeOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Decoded { .. })
    }
}

/// Decode and validate every record of a listings body.
pub fn decode_listings(body: &[u8]) -> DecodeOutcome {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => return DecodeOutcome::Malformed(format!("Response is not JSON: {}", e)),
    };
    let Value::Array(records) = value else {
        return DecodeOutcome::Malformed("Response is not an array".to_string());
    };

    let mut listings = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match validate_record(record) {
            Ok(listing) => listings.push(listing),
            Err(problems) => {
                let label = record
                    .get("id")
                    .and_then(Value::as_i64)
                    .map(|id| format!("Record {} (id {})", index, id))
                    .unwrap_or_else(|| format!("Record {}", index));
                rejected.push(format!("{}: {}", label, problems.join("; ")));
            }
        }
    }

    DecodeOutcome::Decoded { listings, rejected }
}

fn validate_record(record: &Value) -> Result<Listing, Vec<String>> {
    let Some(fields) = record.as_object() else {
        return Err(vec!["not an object".to_string()]);
    };
    let mut problems = Vec::new();

    let id = fields.get("id").and_then(Value::as_i64);
    if id.is_none() {
        problems.push("id must be an integer".to_string());
    }

    let mut text = |name: &str| -> String {
        match fields.get(name) {
            Some(Value::String(s)) => s.clone(),
            _ => {
                problems.push(format!("{} must be a string", name));
                String::new()
            }
        }
    };
    let title = text("title");
    let description = text("description");
    let creator_name = text("creatorName");
    let category = text("category");

    let price = match fields.get("price").and_then(Value::as_f64) {
        Some(p) if p.is_finite() && p >= 0.0 => Some(p.round() as u64),
        _ => {
            problems.push("price must be a non-negative number".to_string());
            None
        }
    };

    let direct_print_enabled = match fields.get("directPrintEnabled") {
        Some(Value::Bool(b)) => Some(*b),
        _ => {
            problems.push("directPrintEnabled must be a boolean".to_string());
            None
        }
    };

    let creator_id = match fields.get("creatorId") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let id = value.as_i64();
            if id.is_none() {
                problems.push("creatorId must be an integer".to_string());
            }
            id
        }
    };

    let thumbnail_url = optional_url(fields, "thumbnailUrl", &mut problems);
    let model_url = optional_url(fields, "modelUrl", &mut problems);

    match (id, price, direct_print_enabled) {
        (Some(id), Some(price), Some(direct_print_enabled)) if problems.is_empty() => Ok(Listing {
            id,
            title,
            description,
            creator_name,
            category,
            price,
            direct_print_enabled,
            creator_id,
            thumbnail_url,
            model_url,
            status: optional_text(fields, "status"),
            created_at: optional_text(fields, "createdAt"),
        }),
        _ => Err(problems),
    }
}

fn optional_text(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields.get(name).and_then(Value::as_str).map(str::to_string)
}

fn optional_url(fields: &Map<String, Value>, name: &str, problems: &mut Vec<String>) -> Option<String> {
    match fields.get(name) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if is_valid_url(s) => Some(s.clone()),
        Some(_) => {
            problems.push(format!("{} is not a valid URL", name));
            None
        }
    }
}

/// Absolute http(s) URLs and root-relative paths are accepted.
pub fn is_valid_url(raw: &str) -> bool {
    if raw.starts_with('/') {
        if raw.starts_with("//") || raw.chars().any(char::is_whitespace) {
            return false;
        }
        return Url::parse("http://localhost")
            .and_then(|base| base.join(raw))
            .is_ok();
    }
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Bounded LRU of decode results keyed by the SHA-256 of the body.
#[derive(Clone)]
pub struct ValidationCache {
    entries: Cache<[u8; 32], Arc<DecodeOutcome>>,
}

impl ValidationCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    /// Decode `body`, reusing an earlier result for identical bytes.
    pub async fn decode(&self, body: &[u8]) -> Arc<DecodeOutcome> {
        let key: [u8; 32] = Sha256::digest(body).into();
        self.entries
            .get_with(key, async { Arc::new(decode_listings(body)) })
            .await
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Flush pending maintenance so `entry_count` is exact.
    pub async fn sync(&self) {
        self.entries.run_pending_tasks().await;
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(256)
    }
}
