//! Data models
//!
//! Database entities (User, Session, Category, Model, AnalyticsEvent) and the
//! input types services accept.

mod analytics;
mod category;
mod model;
mod session;
mod user;

pub use analytics::{AnalyticsEvent, EventType, PrintOptions};
pub use category::{Category, CreateCategoryInput, UpdateCategoryInput};
pub use model::{
    parse_price_cents, CreateModelInput, Model, ModelStatus, ModelWithCreator, ModerationInput,
    PriceError, UNKNOWN_CREATOR,
};
pub use session::Session;
pub use user::{User, UserRole};
