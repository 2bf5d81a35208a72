//! Configuration validation for pipeline stages.
//!
//! Every stage owns a serde-deserializable parameter struct. Validation
//! runs once at stage start; a failed validation aborts the run before
//! any node is processed.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error indicating that a configuration value is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Error indicating that validation failed.
    #[error("validation failed: {message}")]
    ValidationFailed { message: String },
}

/// A trait for validating stage configuration parameters.
///
/// Implementors provide `validate` plus recommended defaults; the helper
/// methods cover the checks shared by several stage configurations.
pub trait ConfigValidator {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Returns the default configuration.
    fn get_defaults() -> Self
    where
        Self: Sized;

    /// Validates a confidence threshold (must be non-negative).
    ///
    /// Orientation confidences reported by detection engines are not
    /// normalized to [0, 1], so only the sign is checked here.
    fn validate_confidence_threshold(&self, threshold: f32) -> Result<(), ConfigError> {
        if threshold < 0.0 || !threshold.is_finite() {
            Err(ConfigError::InvalidConfig {
                message: format!(
                    "confidence threshold must be a non-negative number, got {}",
                    threshold
                ),
            })
        } else {
            Ok(())
        }
    }

    /// Validates a DPI override: negative means "use image metadata",
    /// otherwise the value must be a sensible positive density.
    fn validate_dpi(&self, dpi: f32) -> Result<(), ConfigError> {
        if !dpi.is_finite() {
            Err(ConfigError::InvalidConfig {
                message: format!("dpi must be finite, got {}", dpi),
            })
        } else if dpi >= 0.0 && dpi < 1.0 {
            Err(ConfigError::InvalidConfig {
                message: format!("dpi override must be >= 1, got {}", dpi),
            })
        } else {
            Ok(())
        }
    }

    /// Validates a padding amount in pixels.
    fn validate_padding(&self, padding: u32) -> Result<(), ConfigError> {
        const MAX_REASONABLE_PADDING: u32 = 10_000;

        if padding > MAX_REASONABLE_PADDING {
            Err(ConfigError::InvalidConfig {
                message: format!(
                    "padding {} exceeds reasonable maximum of {}",
                    padding, MAX_REASONABLE_PADDING
                ),
            })
        } else {
            Ok(())
        }
    }
}

impl From<ConfigError> for String {
    fn from(error: ConfigError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestValidator;
    impl ConfigValidator for TestValidator {
        fn validate(&self) -> Result<(), ConfigError> {
            Ok(())
        }

        fn get_defaults() -> Self {
            TestValidator
        }
    }

    #[test]
    fn test_validate_confidence_threshold() {
        let validator = TestValidator;
        assert!(validator.validate_confidence_threshold(0.0).is_ok());
        assert!(validator.validate_confidence_threshold(1.5).is_ok());
        assert!(validator.validate_confidence_threshold(10.0).is_ok());
        assert!(validator.validate_confidence_threshold(-0.1).is_err());
        assert!(validator.validate_confidence_threshold(f32::NAN).is_err());
    }

    #[test]
    fn test_validate_dpi() {
        let validator = TestValidator;
        assert!(validator.validate_dpi(-1.0).is_ok());
        assert!(validator.validate_dpi(300.0).is_ok());
        assert!(validator.validate_dpi(0.5).is_err());
        assert!(validator.validate_dpi(f32::INFINITY).is_err());
    }

    #[test]
    fn test_validate_padding() {
        let validator = TestValidator;
        assert!(validator.validate_padding(0).is_ok());
        assert!(validator.validate_padding(4).is_ok());
        assert!(validator.validate_padding(100_000).is_err());
    }
}
