//! Model upload endpoint
//!
//! POST /api/models - multipart/form-data with file fields `model` and
//! `thumbnail` plus text fields `title`, `description`, `price`, `category`
//! and `directPrintEnabled`.
//!
//! Files are streamed to disk as their fields arrive. Every rejection after
//! a file was written removes what was stored for the request.

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::warn;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{parse_price_cents, CreateModelInput, Model};
use crate::services::{StoredFile, UploadKind};

pub fn router() -> Router<AppState> {
    Router::new().route("/models", post(create_model))
}

/// Text fields of the upload form
#[derive(Debug, Default)]
struct UploadForm {
    title: Option<String>,
    description: Option<String>,
    price: Option<String>,
    category: Option<String>,
    direct_print_enabled: Option<String>,
}

impl UploadForm {
    /// Unknown text fields are ignored.
    fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "title" => &mut self.title,
            "description" => &mut self.description,
            "price" => &mut self.price,
            "category" => &mut self.category,
            "directPrintEnabled" => &mut self.direct_print_enabled,
            _ => return,
        };
        *slot = Some(value);
    }

    fn required(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Build the listing input from the form and the stored files.
    fn into_input(
        self,
        creator_id: i64,
        model: &StoredFile,
        thumbnail: &StoredFile,
    ) -> Result<CreateModelInput, ApiError> {
        let (Some(title), Some(description), Some(price), Some(category)) = (
            Self::required(&self.title),
            Self::required(&self.description),
            Self::required(&self.price),
            Self::required(&self.category),
        ) else {
            return Err(ApiError::validation_error("Missing required fields"));
        };

        let price = parse_price_cents(&price)
            .map_err(|e| ApiError::validation_error(format!("Invalid price: {}", e)))?;

        Ok(CreateModelInput {
            title,
            description,
            price,
            thumbnail_url: thumbnail.url(),
            model_url: model.url(),
            category,
            direct_print_enabled: self.direct_print_enabled.as_deref().map(str::trim) == Some("true"),
            creator_id,
            file_size: i64::try_from(model.size).ok(),
            file_format: Some(model.extension.clone()),
        })
    }
}

/// POST /api/models
async fn create_model(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Model>), ApiError> {
    let mut stored = Vec::new();

    match intake(&state, user.0.id, &mut multipart, &mut stored).await {
        Ok(model) => Ok((StatusCode::CREATED, Json(model))),
        Err(e) => {
            if !stored.is_empty() {
                warn!(files = stored.len(), code = %e.error.code, "Upload rejected, removing stored files");
                state.upload_store.cleanup(&stored).await;
            }
            Err(e)
        }
    }
}

/// Read the form, pushing each written file into `stored` as soon as it
/// exists so the caller can clean up on any error.
async fn intake(
    state: &AppState,
    creator_id: i64,
    multipart: &mut Multipart,
    stored: &mut Vec<StoredFile>,
) -> Result<Model, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        if field.file_name().is_some() {
            let file = store_file(state, &name, field, stored).await?;
            stored.push(file);
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::validation_error(format!("Failed to read field {}: {}", name, e)))?;
            form.set(&name, value);
        }
    }

    let model_file = stored.iter().find(|f| f.kind == UploadKind::Model);
    let thumbnail_file = stored.iter().find(|f| f.kind == UploadKind::Thumbnail);
    let (Some(model_file), Some(thumbnail_file)) = (model_file, thumbnail_file) else {
        return Err(ApiError::validation_error(
            "Both model and thumbnail files are required",
        ));
    };

    let input = form.into_input(creator_id, model_file, thumbnail_file)?;
    Ok(state.model_service.create(input).await?)
}

async fn store_file(
    state: &AppState,
    name: &str,
    field: Field<'_>,
    stored: &[StoredFile],
) -> Result<StoredFile, ApiError> {
    let kind = UploadKind::from_field(name)
        .ok_or_else(|| ApiError::validation_error(format!("Unexpected file field: {}", name)))?;

    if stored.len() >= state.upload_config.max_files {
        return Err(ApiError::validation_error(format!(
            "Too many files (maximum {})",
            state.upload_config.max_files
        )));
    }
    if stored.iter().any(|f| f.kind == kind) {
        return Err(ApiError::validation_error(format!(
            "Only one {} file is allowed",
            kind
        )));
    }

    let original_name = field.file_name().unwrap_or_default().to_string();
    Ok(state.upload_store.store(kind, &original_name, field).await?)
}
