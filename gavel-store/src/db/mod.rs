//! Data-access layer
//!
//! The persistence engine is an opaque delegate behind [`DataDelegate`]:
//! filter objects and data objects are plain JSON maps, and a filter matches
//! rows whose fields equal every filter field. The enforcement and audit
//! layers compose as decorators around the trait:
//!
//! ```text
//! AuditInterceptor → TenantGuard → engine (MemoryStore, SQL adapter, ...)
//! ```

pub mod memory;
pub mod tenancy;

// Re-exports
pub use memory::MemoryStore;
pub use tenancy::{TenantGuard, TenantPolicies, TenantScope};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Field used as the row identifier across all entity types.
pub const ID_FIELD: &str = "id";

/// Field carrying the owning tenant on tenant-scoped rows.
pub const TENANT_FIELD: &str = "tenant_id";

/// Data-access error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A tenant-scoped operation ran with no tenant in the ambient context.
    /// Fail-closed: surfaced to the caller as a hard failure.
    #[error("Missing tenant context for '{0}'")]
    MissingTenantContext(String),

    /// The write attempted to set or change the row's tenant field without
    /// the cross-tenant administrative capability.
    #[error("Tenant field is protected on '{0}'")]
    TenantFieldProtected(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for data-access operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for shared::AppError {
    fn from(err: StoreError) -> Self {
        use shared::ErrorCode;
        match &err {
            StoreError::NotFound(what) => shared::AppError::not_found(what.clone()),
            StoreError::MissingTenantContext(_) => {
                shared::AppError::with_message(ErrorCode::MissingTenantContext, err.to_string())
            }
            StoreError::TenantFieldProtected(_) => {
                shared::AppError::with_message(ErrorCode::TenantFieldProtected, err.to_string())
            }
            StoreError::InvalidArgument(_) => shared::AppError::invalid_request(err.to_string()),
            StoreError::Database(_) | StoreError::Serialization(_) => {
                shared::AppError::database(err.to_string())
            }
        }
    }
}

/// Uniform capability set the interception layers decorate.
///
/// One implementation per persistence engine. `filter` and `data` are JSON
/// objects; implementations must not rely on any richer query representation.
/// Single-row variants (`update`, `delete`) return the post-state and prior
/// state of the affected row respectively, and fail with
/// [`StoreError::NotFound`] when the filter matches nothing.
#[async_trait]
pub trait DataDelegate: Send + Sync {
    /// Insert one row, returning the stored row (id assigned if absent).
    async fn create(&self, entity: &str, data: Value) -> StoreResult<Value>;

    /// Update the first row matching `filter`, returning the updated row.
    async fn update(&self, entity: &str, filter: Value, data: Value) -> StoreResult<Value>;

    /// Update every row matching `filter`, returning the affected count.
    async fn update_many(&self, entity: &str, filter: Value, data: Value) -> StoreResult<u64>;

    /// Delete the first row matching `filter`, returning the deleted row.
    async fn delete(&self, entity: &str, filter: Value) -> StoreResult<Value>;

    /// Delete every row matching `filter`, returning the affected count.
    async fn delete_many(&self, entity: &str, filter: Value) -> StoreResult<u64>;

    /// Fetch the first row matching `filter`, if any.
    async fn find_unique(&self, entity: &str, filter: Value) -> StoreResult<Option<Value>>;

    /// Fetch every row matching `filter`.
    async fn find_many(&self, entity: &str, filter: Value) -> StoreResult<Vec<Value>>;
}

/// Reject non-object filter/data values at the boundary.
pub(crate) fn require_object(value: Value, what: &str) -> StoreResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidArgument(format!(
            "{what} must be a JSON object, got {other}"
        ))),
    }
}
