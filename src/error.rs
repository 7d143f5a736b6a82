//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, RemovalError>;

/// Error types for background removal operations
#[derive(Error, Debug)]
pub enum RemovalError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unreadable input image
    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// Input rejected before processing (empty upload, zero-sized image, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model output does not have the expected rank or channel layout
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Model output contains NaN or infinite values
    #[error("Model output contains {count} non-finite value(s)")]
    NonFiniteOutput { count: usize },

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Network failures while fetching a model artifact
    #[error("Network error: {0}")]
    Network(String),

    /// Downloaded or cached artifact failed integrity verification
    #[error("Checksum mismatch for '{file}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RemovalError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a shape mismatch error from anything printable
    pub fn shape_mismatch<E: std::fmt::Display, A: std::fmt::Debug>(expected: E, actual: A) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_string(),
            actual: format!("{actual:?}"),
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create network error with context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {error}", context.into()))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {operation} model '{path_display}': {error}.{suggestion_text}"
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }

    /// Whether the error was caused by the caller's input rather than the service
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = RemovalError::invalid_config("test config error");
        assert!(matches!(err, RemovalError::InvalidConfig(_)));

        let err = RemovalError::invalid_input("empty upload");
        assert!(matches!(err, RemovalError::InvalidInput(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = RemovalError::invalid_config("Invalid model name");
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model name");

        let err = RemovalError::shape_mismatch("rank 4 [N, C, H, W]", [1usize, 1024]);
        assert_eq!(
            err.to_string(),
            "Shape mismatch: expected rank 4 [N, C, H, W], got [1, 1024]"
        );
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = RemovalError::file_io_error("write model", Path::new("/cache/rmbg14.onnx"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write model"));
        assert!(error_string.contains("/cache/rmbg14.onnx"));

        let err = RemovalError::model_error_with_context(
            "load",
            Path::new("/models/invalid.onnx"),
            "file not found",
            &["check file path", "clear the model cache"],
        );
        let error_string = err.to_string();
        assert!(error_string.contains("load"));
        assert!(error_string.contains("Suggestions"));

        let err = RemovalError::config_value_error("intra threads", 9999, "0-1024", Some(0));
        let error_string = err.to_string();
        assert!(error_string.contains("9999"));
        assert!(error_string.contains("Recommended: 0"));

        let err = RemovalError::network_error("GET https://example.invalid", "connection refused");
        assert!(matches!(err, RemovalError::Network(_)));
        assert!(!err.is_client_error());
    }
}
