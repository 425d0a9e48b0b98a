//! The inference-engine seam: a narrow contract over an opaque,
//! expensive-to-initialize image-to-image engine

pub mod http;
pub mod mock;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Compute device the engine loads weights onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cuda,
    Cpu,
}

impl Default for Device {
    fn default() -> Self {
        Device::Cpu
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cuda => write!(f, "cuda"),
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// Validated numeric parameters passed through to the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub num_inference_steps: u32,
    pub image_guidance_scale: f32,
}

/// Opaque token for one loaded model instance
#[derive(Debug, Clone)]
pub struct EngineHandle {
    pub checkpoint: String,
    pub device: Device,
    pub session: Uuid,
}

impl EngineHandle {
    pub fn new(checkpoint: &str, device: Device) -> Self {
        Self {
            checkpoint: checkpoint.to_string(),
            device,
            session: Uuid::new_v4(),
        }
    }
}

/// Failures the engine contract can surface
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine rejected input shapes or types
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Device memory was insufficient for the call
    #[error("device memory exhausted: {0}")]
    ResourceExhausted(String),

    /// Any other internal engine failure
    #[error("engine failure: {0}")]
    RuntimeFailure(String),

    /// Loading the checkpoint failed; fatal at startup
    #[error("failed to load checkpoint '{checkpoint}' on {device}: {reason}")]
    LoadFailed {
        checkpoint: String,
        device: Device,
        reason: String,
    },
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Narrow contract consumed from the external inference engine.
///
/// Implementations must tolerate `reclaim_memory` and `release` being called
/// at any point after `load`.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// One-time load of the checkpoint onto the device
    async fn load(&self, checkpoint: &str, device: Device) -> EngineResult<EngineHandle>;

    /// Run one transformation. Scratch memory allocated for the call is
    /// released before returning, on every exit path.
    async fn run(
        &self,
        handle: &EngineHandle,
        image: &RgbImage,
        prompt: &str,
        params: &ModelParams,
    ) -> EngineResult<RgbImage>;

    /// Release weights and device memory held by the handle
    async fn release(&self, handle: EngineHandle);

    /// Free cached device memory after a `ResourceExhausted` failure
    async fn reclaim_memory(&self);
}
