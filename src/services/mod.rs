//! Services layer - Business logic
//!
//! Services own validation and business rules, coordinating repositories,
//! the read cache and upload storage. Handlers in `api` stay thin.

pub mod category;
pub mod model;
pub mod password;
pub mod storage;
pub mod user;

pub use category::{generate_slug, CategoryService, CategoryServiceError};
pub use model::{ModelService, ModelServiceError};
pub use password::{hash_password, verify_password};
pub use storage::{StorageError, StoredFile, UploadKind, UploadStore};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
