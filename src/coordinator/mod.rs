//! Request coordination: admission, validation, invocation, encoding.
//!
//! The pipeline short-circuits on the first failure and runs its cheapest
//! checks first, so saturated or malformed requests never reach the image
//! decode or the model call.

use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::rate_limit::{Decision, FixedWindowLimiter, Scope, GLOBAL_KEY, UNKNOWN_CLIENT};
use crate::resource::ModelResource;
use crate::response;
use crate::validation::{self, RawUpload, ValidatedInput};

/// Raw request as assembled from the multipart body
#[derive(Debug, Default)]
pub struct RawRequest {
    pub image: Option<RawUpload>,
    pub prompt: Option<RawUpload>,
    pub num_inference_steps: Option<String>,
    pub image_guidance_scale: Option<String>,
    /// Peer address, if the transport exposed one
    pub client: Option<String>,
}

/// Orchestrates the admission -> validation -> invocation -> encoding
/// pipeline against the exclusive model resource
pub struct RequestCoordinator {
    settings: Arc<Settings>,
    global_limiter: FixedWindowLimiter,
    client_limiter: FixedWindowLimiter,
    model: Arc<ModelResource>,
}

impl RequestCoordinator {
    pub fn new(settings: Arc<Settings>, model: Arc<ModelResource>) -> Self {
        let global_limiter =
            FixedWindowLimiter::from_config(Scope::Global, &settings.rate_limit.global);
        let client_limiter =
            FixedWindowLimiter::from_config(Scope::PerClient, &settings.rate_limit.per_client);
        Self {
            settings,
            global_limiter,
            client_limiter,
            model,
        }
    }

    /// Run the whole pipeline for one request, returning PNG bytes
    pub async fn handle(&self, request: RawRequest) -> Result<Vec<u8>> {
        let request_id = Uuid::new_v4();
        let client = request
            .client
            .clone()
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        let span = info_span!("transform", %request_id, client = %client);

        async move {
            // Admission first: a saturated service rejects before any
            // per-request bookkeeping or validation work.
            self.admit(&client)?;

            let input = self.validate(&request)?;
            info!(
                steps = input.params.num_inference_steps,
                guidance = input.params.image_guidance_scale,
                width = input.image.width(),
                height = input.image.height(),
                "transforming image"
            );

            let output = self
                .model
                .invoke(input.image, input.prompt, input.params)
                .await?;

            let bytes = response::encode_png(&output)?;
            info!(bytes = bytes.len(), "image transformed");
            Ok(bytes)
        }
        .instrument(span)
        .await
    }

    /// Global scope is checked before per-client scope
    fn admit(&self, client: &str) -> Result<()> {
        if let Decision::Deny { retry_after_secs } = self.global_limiter.admit(GLOBAL_KEY) {
            return Err(AppError::QuotaExceeded {
                scope: Scope::Global.as_str(),
                retry_after: retry_after_secs,
            });
        }
        if let Decision::Deny { retry_after_secs } = self.client_limiter.admit(client) {
            return Err(AppError::QuotaExceeded {
                scope: Scope::PerClient.as_str(),
                retry_after: retry_after_secs,
            });
        }
        Ok(())
    }

    /// Cheap checks before the image decode
    fn validate(&self, request: &RawRequest) -> Result<ValidatedInput> {
        let prompt_upload = request
            .prompt
            .as_ref()
            .ok_or(AppError::MissingField("prompt"))?;
        let prompt = validation::validate_prompt(prompt_upload, &self.settings.prompt)?;

        let raw_steps = request
            .num_inference_steps
            .as_deref()
            .ok_or(AppError::MissingField("num_inference_steps"))?;
        let raw_guidance = request
            .image_guidance_scale
            .as_deref()
            .ok_or(AppError::MissingField("image_guidance_scale"))?;
        let params = validation::validate_params(raw_steps, raw_guidance, &self.settings.model)?;

        let image_upload = request
            .image
            .as_ref()
            .ok_or(AppError::MissingField("image"))?;
        let image = validation::validate_image(image_upload, &self.settings.image)?;

        Ok(ValidatedInput {
            image,
            prompt,
            params,
        })
    }

    /// Drop lapsed rate-limit windows; driven by a background task
    pub fn purge_expired_windows(&self) {
        self.global_limiter.purge_expired();
        self.client_limiter.purge_expired();
    }

    pub fn model(&self) -> &Arc<ModelResource> {
        &self.model
    }
}
