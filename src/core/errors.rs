//! Error types for the layout pipeline.
//!
//! This module defines the error kinds shared by every pipeline stage.
//! Two families exist: fatal errors (bad stage parameters, structural
//! violations of the document tree) abort the run before any further
//! mutation is committed, while node-local errors (degenerate geometry,
//! missing resolution, already-segmented nodes, detection failures) cause
//! the affected node to be skipped and recorded in the stage report.

use thiserror::Error;

/// Convenient result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while running layout pipeline stages.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Error occurred while loading an image.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// A stage was configured with an invalid parameter value.
    ///
    /// Fatal: reported before any node of the stage is processed.
    #[error("invalid parameter: {message}")]
    Parameter { message: String },

    /// A geometry is degenerate or lies outside its parent bounds.
    ///
    /// Node-local: the affected node is skipped with a warning.
    #[error("geometry: {context}")]
    Geometry { context: String },

    /// A document tree invariant was violated.
    ///
    /// Fatal for the stage: no further mutation is committed.
    #[error("structural: {message}")]
    Structural { message: String },

    /// Pixel density is required but neither the stage parameters nor the
    /// page metadata provide one. Node-local.
    #[error("missing DPI: {context}")]
    MissingDpi { context: String },

    /// The node already carries structure at the target level and the
    /// stage ran without its overwrite flag. Node-local.
    #[error("already segmented at {level} level: {context}")]
    AlreadySegmented { level: String, context: String },

    /// The external detection/recognition engine failed or timed out.
    /// Node-local.
    #[error("detection failed: {context}")]
    Detection {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage serialization failure.
    #[error("storage")]
    Storage(#[from] serde_json::Error),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Creates a fatal parameter error.
    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter {
            message: message.into(),
        }
    }

    /// Creates a node-local geometry error.
    pub fn geometry(context: impl Into<String>) -> Self {
        Self::Geometry {
            context: context.into(),
        }
    }

    /// Creates a fatal structural error.
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    /// Creates a node-local missing-DPI error.
    pub fn missing_dpi(context: impl Into<String>) -> Self {
        Self::MissingDpi {
            context: context.into(),
        }
    }

    /// Creates a node-local already-segmented error for the given level.
    pub fn already_segmented(level: impl Into<String>, context: impl Into<String>) -> Self {
        Self::AlreadySegmented {
            level: level.into(),
            context: context.into(),
        }
    }

    /// Creates a node-local detection error with an underlying cause.
    pub fn detection(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Detection {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a node-local detection error from a plain message.
    pub fn detection_msg(context: impl Into<String>) -> Self {
        Self::Detection {
            context: context.into(),
            source: None,
        }
    }

    /// Returns true if this error is recovered by skipping the affected
    /// node rather than aborting the stage.
    pub fn is_node_local(&self) -> bool {
        matches!(
            self,
            Self::Geometry { .. }
                | Self::MissingDpi { .. }
                | Self::AlreadySegmented { .. }
                | Self::Detection { .. }
        )
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

impl From<crate::core::config::ConfigError> for PipelineError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::Parameter {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_local_classification() {
        assert!(PipelineError::geometry("zero area").is_node_local());
        assert!(PipelineError::missing_dpi("page p1").is_node_local());
        assert!(PipelineError::already_segmented("line", "region r1").is_node_local());
        assert!(PipelineError::detection_msg("engine timeout").is_node_local());
        assert!(!PipelineError::parameter("bad padding").is_node_local());
        assert!(!PipelineError::structural("orphan node").is_node_local());
    }

    #[test]
    fn test_config_error_conversion() {
        let config_err = crate::core::config::ConfigError::InvalidConfig {
            message: "padding out of range".to_string(),
        };
        let err: PipelineError = config_err.into();
        assert!(matches!(err, PipelineError::Parameter { .. }));
    }
}
