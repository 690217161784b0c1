//! Shared types for the Gavel platform
//!
//! Common error types and small utilities used by the data-core crates.

pub mod error;
pub mod util;

// Re-exports
pub use error::{AppError, AppResult, ErrorCode};
pub use http;
pub use serde::{Deserialize, Serialize};
