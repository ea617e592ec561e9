//! Analytics events
//!
//! The analytics log is append-only and is the only record of purchases and
//! print requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of recorded action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ModelCreated,
    ModelPurchased,
    PrintRequested,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::ModelCreated => write!(f, "model_created"),
            EventType::ModelPurchased => write!(f, "model_purchased"),
            EventType::PrintRequested => write!(f, "print_requested"),
        }
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model_created" => Ok(EventType::ModelCreated),
            "model_purchased" => Ok(EventType::ModelPurchased),
            "print_requested" => Ok(EventType::PrintRequested),
            _ => Err(anyhow::anyhow!("Invalid event type: {}", s)),
        }
    }
}

/// One immutable analytics record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub model_id: i64,
    pub user_id: i64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    /// Create an unsaved event
    pub fn new(event_type: EventType, model_id: i64, user_id: i64, metadata: Value) -> Self {
        Self {
            id: 0,
            event_type,
            model_id,
            user_id,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Options for a direct print order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrintOptions {
    pub material: String,
    pub color: String,
    /// Named size or a scale percentage; numbers are kept as their text
    #[serde(deserialize_with = "text_or_number")]
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// Infill percentage, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infill: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports: Option<bool>,
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, found {}",
            other
        ))),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrintRequestBody {
    print_options: Option<PrintOptions>,
}

impl PrintOptions {
    /// Decode `{"printOptions": {...}}` from a raw request body.
    ///
    /// Material, color and size must be present and non-blank.
    pub fn from_request_body(body: &[u8]) -> Result<Self, String> {
        if body.is_empty() {
            return Err("Print options are required".to_string());
        }
        let request: PrintRequestBody = serde_json::from_slice(body)
            .map_err(|e| format!("Invalid print options: {}", e))?;
        let options = request
            .print_options
            .ok_or_else(|| "Print options are required".to_string())?;
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<(), String> {
        let required = [
            ("material", &self.material),
            ("color", &self.color),
            ("size", &self.size),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(format!("Missing print options: {}", missing.join(", ")));
        }
        if matches!(self.infill, Some(infill) if infill > 100) {
            return Err("Infill must be between 0 and 100".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_text() {
        for event_type in [
            EventType::ModelCreated,
            EventType::ModelPurchased,
            EventType::PrintRequested,
        ] {
            assert_eq!(EventType::from_str(&event_type.to_string()).unwrap(), event_type);
        }
        assert!(EventType::from_str("model_viewed").is_err());
    }

    #[test]
    fn test_event_serializes_type_field() {
        let event = AnalyticsEvent::new(EventType::ModelPurchased, 3, 4, json!({"price": 1999}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "model_purchased");
        assert_eq!(value["modelId"], 3);
        assert_eq!(value["metadata"]["price"], 1999);
    }

    #[test]
    fn test_print_options_accepts_complete_payload() {
        let body = json!({
            "printOptions": {"material": "PLA", "color": "red", "size": "medium", "infill": 20}
        })
        .to_string();

        let options = PrintOptions::from_request_body(body.as_bytes()).unwrap();
        assert_eq!(options.material, "PLA");
        assert_eq!(options.infill, Some(20));
        assert_eq!(options.supports, None);
    }

    #[test]
    fn test_print_options_numeric_size() {
        let body = json!({"printOptions": {"material": "PLA", "color": "red", "size": 150}}).to_string();

        let options = PrintOptions::from_request_body(body.as_bytes()).unwrap();
        assert_eq!(options.size, "150");
    }

    #[test]
    fn test_print_options_rejects_missing_fields() {
        let body = json!({"printOptions": {"material": "PLA", "color": " ", "size": "large"}}).to_string();
        let err = PrintOptions::from_request_body(body.as_bytes()).unwrap_err();
        assert!(err.contains("color"));

        let body = json!({"printOptions": {"material": "PLA"}}).to_string();
        assert!(PrintOptions::from_request_body(body.as_bytes()).is_err());

        assert!(PrintOptions::from_request_body(b"{}").is_err());
        assert!(PrintOptions::from_request_body(b"").is_err());
        assert!(PrintOptions::from_request_body(b"not json").is_err());
    }

    #[test]
    fn test_print_options_rejects_infill_over_100() {
        let body = json!({
            "printOptions": {"material": "PETG", "color": "black", "size": "small", "infill": 150}
        })
        .to_string();
        assert!(PrintOptions::from_request_body(body.as_bytes()).is_err());
    }
}
