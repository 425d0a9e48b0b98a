//! Numeric model-parameter validation

use tracing::error;

use crate::config::ModelConfig;
use crate::engine::ModelParams;
use crate::error::{AppError, Result};

/// Parse and bound-check the raw form values. `num_inference_steps` must be
/// an integer and `image_guidance_scale` a number; both are checked against
/// their configured inclusive ranges. The ranges themselves are validated at
/// configuration time.
pub fn validate_params(
    raw_steps: &str,
    raw_guidance: &str,
    settings: &ModelConfig,
) -> Result<ModelParams> {
    let num_inference_steps: u32 = raw_steps.trim().parse().map_err(|_| {
        let err = AppError::InvalidParameter {
            name: "num_inference_steps",
            reason: "must be an integer".to_string(),
        };
        error!(stage = "validate_params", %err, "rejected parameters");
        err
    })?;

    let image_guidance_scale: f32 = raw_guidance.trim().parse().map_err(|_| {
        let err = AppError::InvalidParameter {
            name: "image_guidance_scale",
            reason: "must be a number".to_string(),
        };
        error!(stage = "validate_params", %err, "rejected parameters");
        err
    })?;

    if num_inference_steps < settings.min_inference_steps
        || num_inference_steps > settings.max_inference_steps
    {
        let err = AppError::ParameterOutOfRange {
            name: "num_inference_steps",
            min: settings.min_inference_steps as f64,
            max: settings.max_inference_steps as f64,
        };
        error!(stage = "validate_params", %err, "rejected parameters");
        return Err(err);
    }

    if !image_guidance_scale.is_finite()
        || image_guidance_scale < settings.min_image_guidance_scale
        || image_guidance_scale > settings.max_image_guidance_scale
    {
        let err = AppError::ParameterOutOfRange {
            name: "image_guidance_scale",
            min: settings.min_image_guidance_scale as f64,
            max: settings.max_image_guidance_scale as f64,
        };
        error!(stage = "validate_params", %err, "rejected parameters");
        return Err(err);
    }

    Ok(ModelParams {
        num_inference_steps,
        image_guidance_scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_config() -> ModelConfig {
        ModelConfig {
            min_inference_steps: 1,
            max_inference_steps: 10,
            min_image_guidance_scale: 1.0,
            max_image_guidance_scale: 20.0,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_accepts_values_within_bounds() {
        let params = validate_params("10", "7", &model_config()).unwrap();
        assert_eq!(params.num_inference_steps, 10);
        assert_eq!(params.image_guidance_scale, 7.0);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let settings = model_config();
        assert!(validate_params("1", "1.0", &settings).is_ok());
        assert!(validate_params("10", "20.0", &settings).is_ok());
    }

    #[test]
    fn test_rejects_out_of_range() {
        let settings = model_config();
        assert!(matches!(
            validate_params("11", "7", &settings).unwrap_err(),
            AppError::ParameterOutOfRange {
                name: "num_inference_steps",
                ..
            }
        ));
        assert!(matches!(
            validate_params("5", "20.5", &settings).unwrap_err(),
            AppError::ParameterOutOfRange {
                name: "image_guidance_scale",
                ..
            }
        ));
        assert!(matches!(
            validate_params("0", "7", &settings).unwrap_err(),
            AppError::ParameterOutOfRange { .. }
        ));
    }

    #[test]
    fn test_rejects_wrong_types() {
        let settings = model_config();
        assert!(matches!(
            validate_params("ten", "7", &settings).unwrap_err(),
            AppError::InvalidParameter {
                name: "num_inference_steps",
                ..
            }
        ));
        // Steps must be an integer, not merely numeric.
        assert!(matches!(
            validate_params("2.5", "7", &settings).unwrap_err(),
            AppError::InvalidParameter { .. }
        ));
        assert!(matches!(
            validate_params("5", "strong", &settings).unwrap_err(),
            AppError::InvalidParameter {
                name: "image_guidance_scale",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_non_finite_guidance() {
        let settings = model_config();
        assert!(validate_params("5", "NaN", &settings).is_err());
        assert!(validate_params("5", "inf", &settings).is_err());
    }
}
