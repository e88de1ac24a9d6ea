//! # Nexfluc Common Library
//!
//! Shared code for the Nexfluc services:
//! - Error and result types
//! - Bootstrap configuration (TOML, root folder resolution)
//! - Event types (NexflucEvent) and the EventBus
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
