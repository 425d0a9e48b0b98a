//! HTTP client for a JSON/base64 inference sidecar

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbImage;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::{Device, EngineError, EngineHandle, EngineResult, InferenceEngine, ModelParams};

/// Inference engine reached over HTTP. The sidecar owns the actual device
/// context; this client only speaks the wire contract.
pub struct HttpEngine {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct LoadRequest<'a> {
    checkpoint: &'a str,
    device: Device,
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    session: &'a str,
    image_b64: String,
    prompt: &'a str,
    num_inference_steps: u32,
    image_guidance_scale: f32,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    image_b64: String,
}

#[derive(Debug, Deserialize)]
struct SidecarError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpEngine {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let base_url = config
            .endpoint
            .clone()
            .ok_or_else(|| EngineError::RuntimeFailure("engine endpoint not configured".into()))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                EngineError::RuntimeFailure(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn map_error_response(response: reqwest::Response) -> EngineError {
        let status = response.status();
        let body: SidecarError = response.json().await.unwrap_or(SidecarError {
            code: None,
            message: None,
        });
        let message = body.message.unwrap_or_else(|| status.to_string());

        match (status, body.code.as_deref()) {
            (_, Some("out_of_memory")) | (StatusCode::INSUFFICIENT_STORAGE, _) => {
                EngineError::ResourceExhausted(message)
            }
            (StatusCode::BAD_REQUEST, _) | (StatusCode::UNPROCESSABLE_ENTITY, _) => {
                EngineError::InvalidArgument(message)
            }
            _ => EngineError::RuntimeFailure(message),
        }
    }
}

#[async_trait]
impl InferenceEngine for HttpEngine {
    async fn load(&self, checkpoint: &str, device: Device) -> EngineResult<EngineHandle> {
        debug!(checkpoint, %device, "loading checkpoint on sidecar");
        let response = self
            .client
            .post(self.url("/v1/models/load"))
            .json(&LoadRequest { checkpoint, device })
            .send()
            .await
            .map_err(|e| EngineError::LoadFailed {
                checkpoint: checkpoint.to_string(),
                device,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let reason = Self::map_error_response(response).await.to_string();
            return Err(EngineError::LoadFailed {
                checkpoint: checkpoint.to_string(),
                device,
                reason,
            });
        }

        Ok(EngineHandle::new(checkpoint, device))
    }

    async fn run(
        &self,
        handle: &EngineHandle,
        image: &RgbImage,
        prompt: &str,
        params: &ModelParams,
    ) -> EngineResult<RgbImage> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| EngineError::InvalidArgument(format!("unencodable input image: {e}")))?;

        let session = handle.session.to_string();
        let request = RunRequest {
            session: &session,
            image_b64: STANDARD.encode(&png),
            prompt,
            num_inference_steps: params.num_inference_steps,
            image_guidance_scale: params.image_guidance_scale,
        };

        let response = self
            .client
            .post(self.url("/v1/transform"))
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::RuntimeFailure(format!("sidecar unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::map_error_response(response).await);
        }

        let body: RunResponse = response
            .json()
            .await
            .map_err(|e| EngineError::RuntimeFailure(format!("malformed sidecar response: {e}")))?;
        let bytes = STANDARD
            .decode(body.image_b64.trim())
            .map_err(|e| EngineError::RuntimeFailure(format!("invalid base64 from sidecar: {e}")))?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| EngineError::RuntimeFailure(format!("undecodable sidecar image: {e}")))?;

        Ok(decoded.to_rgb8())
    }

    async fn release(&self, handle: EngineHandle) {
        let result = self
            .client
            .post(self.url("/v1/models/unload"))
            .json(&serde_json::json!({ "session": handle.session.to_string() }))
            .send()
            .await;
        if let Err(e) = result {
            warn!(session = %handle.session, "failed to unload sidecar model: {e}");
        }
    }

    async fn reclaim_memory(&self) {
        let result = self.client.post(self.url("/v1/memory/reclaim")).send().await;
        if let Err(e) = result {
            warn!("sidecar memory reclaim failed: {e}");
        }
    }
}
