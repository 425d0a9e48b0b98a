//! Lifecycle management for the single exclusive model resource

pub mod model;

pub use model::{ModelResource, ResourceState};
