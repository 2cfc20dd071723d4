//! Common Infrastructure Module
//!
//! The crate-wide error taxonomy. Configuration (`crate::config`) and
//! logging (`crate::logging`) live at the crate root alongside this
//! module; `common` holds only the error type since that is the one
//! piece every layer (codec through API) depends on.

pub mod error;

// Re-exports for convenience
pub use error::{CoreError, Result};
