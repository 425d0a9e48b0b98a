//! Image Transform Gateway
//!
//! A validating, rate-limited serving gateway that coordinates many
//! concurrent callers against a single exclusive image-to-image inference
//! engine.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod rate_limit;
pub mod resource;
pub mod response;
pub mod validation;

pub use error::{AppError, Result};

use std::sync::Arc;

use coordinator::RequestCoordinator;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub coordinator: Arc<RequestCoordinator>,
}
