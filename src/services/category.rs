//! Category service
//!
//! Category CRUD for the admin surface plus the cached public list. Names
//! and slugs are unique; a slug is generated from the name when none is
//! given.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CreateCategoryInput, UpdateCategoryInput};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const CACHE_KEY_CATEGORY_LIST: &str = "categories:list";

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category name already exists: {0}")]
    DuplicateName(String),

    #[error("Category slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Category not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Category service
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            cache,
            cache_ttl,
        }
    }

    /// Create a category.
    ///
    /// # Errors
    /// - `ValidationError` for a blank name or a slug that reduces to nothing
    /// - `DuplicateName` / `DuplicateSlug` on collisions
    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category name cannot be empty".to_string(),
            ));
        }

        if self
            .repo
            .get_by_name(&name)
            .await
            .context("Failed to check name uniqueness")?
            .is_some()
        {
            return Err(CategoryServiceError::DuplicateName(name));
        }

        let slug = resolve_slug(input.slug.as_deref(), &name)?;
        if self
            .repo
            .get_by_slug(&slug)
            .await
            .context("Failed to check slug uniqueness")?
            .is_some()
        {
            return Err(CategoryServiceError::DuplicateSlug(slug));
        }

        let description = input.description.filter(|d| !d.trim().is_empty());
        let created = self
            .repo
            .create(&Category::new(name, slug, description))
            .await
            .context("Failed to create category")?;

        info!(category_id = created.id, slug = %created.slug, "Category created");
        self.invalidate_cache().await;
        Ok(created)
    }

    /// All categories ordered by name.
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        if let Some(categories) = self
            .cache
            .get::<Vec<Category>>(CACHE_KEY_CATEGORY_LIST)
            .await
            .ok()
            .flatten()
        {
            debug!("Category list served from cache");
            return Ok(categories);
        }

        let categories = self.repo.list().await.context("Failed to list categories")?;
        let _ = self
            .cache
            .set(CACHE_KEY_CATEGORY_LIST, &categories, self.cache_ttl)
            .await;
        Ok(categories)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Category>, CategoryServiceError> {
        Ok(self.repo.get_by_id(id).await.context("Failed to get category")?)
    }

    /// Apply a partial update. Changing the name does not regenerate the
    /// slug unless a new slug is supplied.
    pub async fn update(
        &self,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let mut category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or(CategoryServiceError::NotFound(id))?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CategoryServiceError::ValidationError(
                    "Category name cannot be empty".to_string(),
                ));
            }
            if let Some(existing) = self
                .repo
                .get_by_name(&name)
                .await
                .context("Failed to check name uniqueness")?
            {
                if existing.id != id {
                    return Err(CategoryServiceError::DuplicateName(name));
                }
            }
            category.name = name;
        }

        if let Some(slug) = input.slug {
            let slug = resolve_slug(Some(&slug), &category.name)?;
            if let Some(existing) = self
                .repo
                .get_by_slug(&slug)
                .await
                .context("Failed to check slug uniqueness")?
            {
                if existing.id != id {
                    return Err(CategoryServiceError::DuplicateSlug(slug));
                }
            }
            category.slug = slug;
        }

        if let Some(description) = input.description {
            category.description = Some(description).filter(|d| !d.trim().is_empty());
        }

        let updated = self
            .repo
            .update(&category)
            .await
            .context("Failed to update category")?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    /// Delete a category. Models keep their category name.
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let removed = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete category")?;
        if !removed {
            return Err(CategoryServiceError::NotFound(id));
        }

        info!(category_id = id, "Category deleted");
        self.invalidate_cache().await;
        Ok(())
    }

    async fn invalidate_cache(&self) {
        let _ = self.cache.delete(CACHE_KEY_CATEGORY_LIST).await;
    }
}

fn resolve_slug(slug: Option<&str>, name: &str) -> Result<String, CategoryServiceError> {
    let slug = match slug.map(str::trim).filter(|s| !s.is_empty()) {
        Some(given) => generate_slug(given),
        None => generate_slug(name),
    };
    if slug.is_empty() {
        return Err(CategoryServiceError::ValidationError(
            "Category slug cannot be empty".to_string(),
        ));
    }
    Ok(slug)
}

/// Lowercase, hyphen-separated slug.
///
/// ASCII punctuation and whitespace become single hyphens; non-ASCII letters
/// are kept as-is.
pub fn generate_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || !c.is_ascii() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}
