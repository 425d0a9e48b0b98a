//! Application settings, resolved once at startup and immutable thereafter

use crate::engine::Device;
use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub resource: ResourceConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Constraints on the uploaded image
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageConfig {
    /// Maximum allowed file size in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    /// Allowed declared MIME types, matched exactly
    #[serde(default = "default_image_types")]
    pub allowed_types: HashSet<String>,
    /// Allowed lowercased filename extensions
    #[serde(default = "default_image_extensions")]
    pub allowed_extensions: HashSet<String>,
    /// Width the image is shrunk to fit within if larger
    #[serde(default = "default_max_dimension")]
    pub max_width: u32,
    /// Height the image is shrunk to fit within if larger
    #[serde(default = "default_max_dimension")]
    pub max_height: u32,
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

fn default_image_types() -> HashSet<String> {
    ["image/jpeg", "image/jpg", "image/png", "image/gif", "image/webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_image_extensions() -> HashSet<String> {
    ["jpeg", "jpg", "png", "gif", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_dimension() -> u32 {
    1024
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_types: default_image_types(),
            allowed_extensions: default_image_extensions(),
            max_width: default_max_dimension(),
            max_height: default_max_dimension(),
        }
    }
}

/// Constraints on the uploaded prompt
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromptConfig {
    #[serde(default = "default_prompt_types")]
    pub allowed_types: HashSet<String>,
    #[serde(default = "default_prompt_extensions")]
    pub allowed_extensions: HashSet<String>,
    /// Maximum allowed prompt length in characters
    #[serde(default = "default_max_prompt_length")]
    pub max_length: usize,
}

fn default_prompt_types() -> HashSet<String> {
    std::iter::once("text/plain".to_string()).collect()
}

fn default_prompt_extensions() -> HashSet<String> {
    std::iter::once("txt".to_string()).collect()
}

fn default_max_prompt_length() -> usize {
    256
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            allowed_types: default_prompt_types(),
            allowed_extensions: default_prompt_extensions(),
            max_length: default_max_prompt_length(),
        }
    }
}

/// One fixed-window quota: at most `times` admissions per `window_secs`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitScopeConfig {
    pub times: u32,
    pub window_secs: u64,
}

/// Rate limiting configuration for both scopes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_global_limit")]
    pub global: RateLimitScopeConfig,
    #[serde(default = "default_per_client_limit")]
    pub per_client: RateLimitScopeConfig,
}

fn default_global_limit() -> RateLimitScopeConfig {
    RateLimitScopeConfig {
        times: 10,
        window_secs: 60,
    }
}

fn default_per_client_limit() -> RateLimitScopeConfig {
    RateLimitScopeConfig {
        times: 4,
        window_secs: 60,
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global: default_global_limit(),
            per_client: default_per_client_limit(),
        }
    }
}

/// Model checkpoint and parameter bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default = "default_checkpoint")]
    pub checkpoint: String,
    #[serde(default)]
    pub device: Device,
    #[serde(default = "default_min_steps")]
    pub min_inference_steps: u32,
    #[serde(default = "default_max_steps")]
    pub max_inference_steps: u32,
    #[serde(default = "default_min_guidance")]
    pub min_image_guidance_scale: f32,
    #[serde(default = "default_max_guidance")]
    pub max_image_guidance_scale: f32,
}

fn default_checkpoint() -> String {
    "timbrooks/instruct-pix2pix".to_string()
}

fn default_min_steps() -> u32 {
    1
}

fn default_max_steps() -> u32 {
    10
}

fn default_min_guidance() -> f32 {
    1.0
}

fn default_max_guidance() -> f32 {
    20.0
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            checkpoint: default_checkpoint(),
            device: Device::default(),
            min_inference_steps: default_min_steps(),
            max_inference_steps: default_max_steps(),
            min_image_guidance_scale: default_min_guidance(),
            max_image_guidance_scale: default_max_guidance(),
        }
    }
}

/// Which engine implementation the gateway talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// JSON-over-HTTP inference sidecar
    Http,
    /// Deterministic in-process engine for tests and local runs
    Mock,
}

/// Engine connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_kind")]
    pub kind: EngineKind,
    /// Base URL of the inference sidecar, required for the http kind
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_engine_timeout")]
    pub timeout_ms: u64,
}

fn default_engine_kind() -> EngineKind {
    EngineKind::Http
}

fn default_engine_timeout() -> u64 {
    120_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: default_engine_kind(),
            endpoint: None,
            timeout_ms: default_engine_timeout(),
        }
    }
}

/// Backpressure settings for the exclusive model resource
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceConfig {
    /// Maximum number of invocations queued behind the in-flight one
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// How long a caller waits for its result before giving up
    #[serde(default = "default_invoke_timeout")]
    pub invoke_timeout_ms: u64,
}

fn default_max_pending() -> usize {
    8
}

fn default_invoke_timeout() -> u64 {
    120_000
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_pending: default_max_pending(),
            invoke_timeout_ms: default_invoke_timeout(),
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file and environment
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(
                File::with_name(path.as_ref().to_str().unwrap_or("config/default"))
                    .required(false),
            )
            // Override with environment variables (prefixed with IMG_GATEWAY__)
            .add_source(
                Environment::with_prefix("IMG_GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate configuration-time invariants
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(config_error("Server port cannot be 0"));
        }
        if self.image.max_file_size == 0 {
            return Err(config_error("image.max_file_size cannot be 0"));
        }
        if self.image.allowed_types.is_empty() || self.image.allowed_extensions.is_empty() {
            return Err(config_error("image allow-lists cannot be empty"));
        }
        if self.image.max_width == 0 || self.image.max_height == 0 {
            return Err(config_error("image.max_width and image.max_height must be positive"));
        }
        if self.prompt.allowed_types.is_empty() || self.prompt.allowed_extensions.is_empty() {
            return Err(config_error("prompt allow-lists cannot be empty"));
        }
        if self.prompt.max_length == 0 {
            return Err(config_error("prompt.max_length cannot be 0"));
        }
        for (name, scope) in [
            ("global", &self.rate_limit.global),
            ("per_client", &self.rate_limit.per_client),
        ] {
            if scope.times == 0 {
                return Err(config_error(&format!(
                    "rate_limit.{name}.times must be at least 1"
                )));
            }
            if scope.window_secs == 0 {
                return Err(config_error(&format!(
                    "rate_limit.{name}.window_secs must be at least 1"
                )));
            }
        }
        if self.model.checkpoint.is_empty() {
            return Err(config_error("model.checkpoint cannot be empty"));
        }
        if self.model.min_inference_steps > self.model.max_inference_steps {
            return Err(config_error(
                "model.min_inference_steps must not exceed model.max_inference_steps",
            ));
        }
        if self.model.min_image_guidance_scale > self.model.max_image_guidance_scale {
            return Err(config_error(
                "model.min_image_guidance_scale must not exceed model.max_image_guidance_scale",
            ));
        }
        if self.engine.kind == EngineKind::Http && self.engine.endpoint.is_none() {
            return Err(config_error("engine.endpoint is required for the http engine"));
        }
        if self.resource.max_pending == 0 {
            return Err(config_error("resource.max_pending must be at least 1"));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            image: ImageConfig::default(),
            prompt: PromptConfig::default(),
            rate_limit: RateLimitConfig::default(),
            model: ModelConfig::default(),
            engine: EngineConfig::default(),
            resource: ResourceConfig::default(),
        }
    }
}

fn config_error(message: &str) -> AppError {
    AppError::Config(config::ConfigError::Message(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.image.max_file_size, 10 * 1024 * 1024);
        assert!(settings.image.allowed_types.contains("image/jpeg"));
        assert_eq!(settings.rate_limit.per_client.times, 4);
        assert_eq!(settings.rate_limit.per_client.window_secs, 60);
    }

    #[test]
    fn test_default_settings_are_valid() {
        let mut settings = Settings::default();
        settings.engine.kind = EngineKind::Mock;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_step_bounds() {
        let mut settings = Settings::default();
        settings.engine.kind = EngineKind::Mock;
        settings.model.min_inference_steps = 10;
        settings.model.max_inference_steps = 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_guidance_bounds() {
        let mut settings = Settings::default();
        settings.engine.kind = EngineKind::Mock;
        settings.model.min_image_guidance_scale = 20.0;
        settings.model.max_image_guidance_scale = 1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_quota() {
        let mut settings = Settings::default();
        settings.engine.kind = EngineKind::Mock;
        settings.rate_limit.global.times = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_requires_http_endpoint() {
        let settings = Settings::default();
        assert_eq!(settings.engine.kind, EngineKind::Http);
        assert!(settings.validate().is_err());
    }
}
