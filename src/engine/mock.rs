//! Deterministic in-process engine for tests and local runs

use async_trait::async_trait;
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::engine::{Device, EngineError, EngineHandle, EngineResult, InferenceEngine, ModelParams};

/// Failure the mock injects on the next calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    None,
    LoadFailed,
    InvalidArgument,
    ResourceExhausted,
    RuntimeFailure,
}

/// In-process engine that inverts pixel values. Deterministic, so tests can
/// assert on the output; latency and failures are injectable.
pub struct MockEngine {
    latency: Duration,
    failure: Mutex<InjectedFailure>,
    run_calls: AtomicU32,
    reclaim_calls: AtomicU32,
    release_calls: AtomicU32,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Engine whose every `run` takes at least `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            failure: Mutex::new(InjectedFailure::None),
            run_calls: AtomicU32::new(0),
            reclaim_calls: AtomicU32::new(0),
            release_calls: AtomicU32::new(0),
        }
    }

    /// Make subsequent calls fail with the given kind
    pub fn fail_with(&self, failure: InjectedFailure) {
        *self.failure.lock() = failure;
    }

    pub fn run_calls(&self) -> u32 {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn reclaim_calls(&self) -> u32 {
        self.reclaim_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> u32 {
        self.release_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceEngine for MockEngine {
    async fn load(&self, checkpoint: &str, device: Device) -> EngineResult<EngineHandle> {
        if *self.failure.lock() == InjectedFailure::LoadFailed {
            return Err(EngineError::LoadFailed {
                checkpoint: checkpoint.to_string(),
                device,
                reason: "injected load failure".to_string(),
            });
        }
        Ok(EngineHandle::new(checkpoint, device))
    }

    async fn run(
        &self,
        _handle: &EngineHandle,
        image: &RgbImage,
        _prompt: &str,
        _params: &ModelParams,
    ) -> EngineResult<RgbImage> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match *self.failure.lock() {
            InjectedFailure::InvalidArgument => {
                return Err(EngineError::InvalidArgument("injected".to_string()))
            }
            InjectedFailure::ResourceExhausted => {
                return Err(EngineError::ResourceExhausted("injected".to_string()))
            }
            InjectedFailure::RuntimeFailure => {
                return Err(EngineError::RuntimeFailure("injected".to_string()))
            }
            _ => {}
        }

        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            pixel.0 = [255 - pixel.0[0], 255 - pixel.0[1], 255 - pixel.0[2]];
        }
        Ok(out)
    }

    async fn release(&self, _handle: EngineHandle) {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn reclaim_memory(&self) {
        self.reclaim_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_inverts_pixels() {
        let engine = MockEngine::new();
        let handle = engine.load("ckpt", Device::Cpu).await.unwrap();

        let image = RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30]));
        let params = ModelParams {
            num_inference_steps: 10,
            image_guidance_scale: 7.0,
        };
        let out = engine.run(&handle, &image, "night", &params).await.unwrap();

        assert_eq!(out.get_pixel(0, 0).0, [245, 235, 225]);
        assert_eq!(engine.run_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_injects_failures() {
        let engine = MockEngine::new();
        let handle = engine.load("ckpt", Device::Cpu).await.unwrap();
        let image = RgbImage::new(1, 1);
        let params = ModelParams {
            num_inference_steps: 1,
            image_guidance_scale: 1.0,
        };

        engine.fail_with(InjectedFailure::ResourceExhausted);
        let err = engine.run(&handle, &image, "p", &params).await.unwrap_err();
        assert!(matches!(err, EngineError::ResourceExhausted(_)));

        engine.fail_with(InjectedFailure::LoadFailed);
        assert!(engine.load("ckpt", Device::Cpu).await.is_err());
    }
}
