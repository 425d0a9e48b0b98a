//! Configuration management

pub mod settings;

pub use settings::{
    EngineConfig, EngineKind, ImageConfig, LoggingConfig, ModelConfig, PromptConfig,
    RateLimitConfig, RateLimitScopeConfig, ResourceConfig, ServerConfig, Settings,
};
