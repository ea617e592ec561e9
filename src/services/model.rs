//! Model listing service
//!
//! Catalog reads, listing creation, moderation, and the purchase and print
//! actions. Purchases and print requests are recorded as analytics events;
//! there is no order table and no idempotency, so repeated calls append
//! repeated events.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{AnalyticsRepository, ModelRepository};
use crate::models::{
    AnalyticsEvent, CreateModelInput, EventType, Model, ModelStatus, ModelWithCreator,
    ModerationInput, PrintOptions,
};
use anyhow::Context;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const CACHE_KEY_MODEL_LIST: &str = "models:list:";

/// Default and maximum page of analytics events
pub const DEFAULT_EVENT_LIMIT: i64 = 100;
pub const MAX_EVENT_LIMIT: i64 = 500;

/// Error types for model service operations
#[derive(Debug, thiserror::Error)]
pub enum ModelServiceError {
    #[error("Model not found: {0}")]
    NotFound(i64),

    /// The listing exists but its status does not allow the action
    #[error("{0}")]
    NotAvailable(String),

    #[error("Direct printing not available for this model")]
    PrintDisabled,

    #[error("{0}")]
    InvalidPrintOptions(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Model listing service
pub struct ModelService {
    repo: Arc<dyn ModelRepository>,
    analytics: Arc<dyn AnalyticsRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl ModelService {
    pub fn new(
        repo: Arc<dyn ModelRepository>,
        analytics: Arc<dyn AnalyticsRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            analytics,
            cache,
            cache_ttl,
        }
    }

    /// Listings newest first, optionally of one status.
    pub async fn list(
        &self,
        status: Option<ModelStatus>,
    ) -> Result<Vec<ModelWithCreator>, ModelServiceError> {
        let cache_key = format!(
            "{}{}",
            CACHE_KEY_MODEL_LIST,
            status.map(|s| s.to_string()).unwrap_or_else(|| "all".to_string())
        );
        if let Some(models) = self
            .cache
            .get::<Vec<ModelWithCreator>>(&cache_key)
            .await
            .ok()
            .flatten()
        {
            debug!(key = %cache_key, "Model list served from cache");
            return Ok(models);
        }

        let models = self.repo.list(status).await.context("Failed to list models")?;
        let _ = self.cache.set(&cache_key, &models, self.cache_ttl).await;
        Ok(models)
    }

    pub async fn get(&self, id: i64) -> Result<ModelWithCreator, ModelServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get model")?
            .ok_or(ModelServiceError::NotFound(id))
    }

    /// Insert a pending listing and record `model_created`.
    ///
    /// The listing is kept when only the analytics write fails.
    pub async fn create(&self, input: CreateModelInput) -> Result<Model, ModelServiceError> {
        validate_create_input(&input)?;

        let model = self
            .repo
            .create(&input)
            .await
            .context("Failed to create model")?;

        let event = AnalyticsEvent::new(
            EventType::ModelCreated,
            model.id,
            model.creator_id,
            json!({
                "category": model.category,
                "directPrintEnabled": model.direct_print_enabled,
            }),
        );
        if let Err(e) = self.analytics.record(&event).await {
            warn!(model_id = model.id, error = %e, "Failed to record model_created event");
        }

        info!(model_id = model.id, creator_id = model.creator_id, "Model submitted for review");
        self.invalidate_cache().await;
        Ok(model)
    }

    /// Record a purchase of an active listing.
    pub async fn purchase(&self, id: i64, user_id: i64) -> Result<Model, ModelServiceError> {
        let model = self.get(id).await?.model;
        if !model.is_purchasable() {
            return Err(ModelServiceError::NotAvailable(
                "Model is not available for purchase".to_string(),
            ));
        }

        self.analytics
            .record(&AnalyticsEvent::new(
                EventType::ModelPurchased,
                model.id,
                user_id,
                json!({ "price": model.price }),
            ))
            .await
            .context("Failed to record purchase")?;

        info!(model_id = model.id, user_id, "Model purchased");
        Ok(model)
    }

    /// Record a direct print request.
    ///
    /// Checks run in order: existence, direct-print opt-in, status, then the
    /// print options in `body`. A listing without direct print is refused
    /// whatever the payload.
    pub async fn request_print(
        &self,
        id: i64,
        user_id: i64,
        body: &[u8],
    ) -> Result<PrintOptions, ModelServiceError> {
        let model = self.get(id).await?.model;
        if !model.direct_print_enabled {
            return Err(ModelServiceError::PrintDisabled);
        }
        if !model.is_printable() {
            return Err(ModelServiceError::NotAvailable(
                "Model is not available for printing".to_string(),
            ));
        }

        let options =
            PrintOptions::from_request_body(body).map_err(ModelServiceError::InvalidPrintOptions)?;

        self.analytics
            .record(&AnalyticsEvent::new(
                EventType::PrintRequested,
                model.id,
                user_id,
                json!({ "printOptions": options }),
            ))
            .await
            .context("Failed to record print request")?;

        info!(model_id = model.id, user_id, material = %options.material, "Print requested");
        Ok(options)
    }

    /// Apply a moderation decision. Listings cannot be sent back to pending.
    pub async fn moderate(
        &self,
        id: i64,
        input: ModerationInput,
    ) -> Result<ModelWithCreator, ModelServiceError> {
        if !input.status.is_moderation_target() {
            return Err(ModelServiceError::ValidationError(format!(
                "Cannot move a model to '{}'",
                input.status
            )));
        }

        let moderated = self
            .repo
            .moderate(id, &input)
            .await
            .context("Failed to moderate model")?
            .ok_or(ModelServiceError::NotFound(id))?;

        info!(
            model_id = id,
            status = %input.status,
            reviewed_by = input.reviewed_by,
            "Model moderated"
        );
        self.invalidate_cache().await;
        Ok(moderated)
    }

    /// Analytics log, most recent first.
    pub async fn events(
        &self,
        event_type: Option<EventType>,
        limit: Option<i64>,
    ) -> Result<Vec<AnalyticsEvent>, ModelServiceError> {
        let limit = limit.unwrap_or(DEFAULT_EVENT_LIMIT).clamp(1, MAX_EVENT_LIMIT);
        Ok(self
            .analytics
            .list(event_type, limit)
            .await
            .context("Failed to list analytics events")?)
    }

    async fn invalidate_cache(&self) {
        let _ = self.cache.delete_pattern(&format!("{}*", CACHE_KEY_MODEL_LIST)).await;
    }
}

fn validate_create_input(input: &CreateModelInput) -> Result<(), ModelServiceError> {
    let required = [
        ("title", &input.title),
        ("description", &input.description),
        ("category", &input.category),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(ModelServiceError::ValidationError(format!(
            "Missing required field: {}",
            field
        )));
    }
    if input.price < 0 {
        return Err(ModelServiceError::ValidationError(
            "Price cannot be negative".to_string(),
        ));
    }
    Ok(())
}
