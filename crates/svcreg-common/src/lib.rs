//! # svcreg Common
//!
//! Common types and errors shared across the svcreg crates.
//!
//! This crate provides the foundational pieces that the monitoring and
//! registry crates build upon: the error enum used at every library
//! boundary and the `ServiceName` identifier.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{Error, Result};
pub use types::ServiceName;
