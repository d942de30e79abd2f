//! Custom error types for the placement predictor.
//!
//! This module provides structured error types so request handlers can tell
//! user mistakes (bad CGPA, incomplete feedback) apart from storage and
//! configuration failures, and render each one as a message.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::Tier;

/// Shown in place of any error the visitor didn't cause.
pub const GENERIC_MESSAGE: &str = "Something went wrong. Please try again.";

/// Main error type for predictor operations
#[derive(Error, Debug)]
pub enum PredictorError {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// CGPA parsed but outside the accepted range
    #[error("CGPA must be between 0 and 10")]
    CgpaOutOfRange { value: f64 },

    /// CGPA could not be parsed as a finite number
    #[error("Please enter a valid CGPA")]
    InvalidCgpa { input: String },

    /// Feedback form failed validation
    #[error("Invalid feedback: {reason}")]
    InvalidFeedback { reason: String },

    // =========================================================================
    // Model Errors
    // =========================================================================
    /// Model could not be fitted or loaded
    #[error("Model error: {message}")]
    Model { message: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// A storage tier failed
    #[error("Storage error ({tier}): {message}")]
    Storage { tier: Tier, message: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

}

impl PredictorError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a feedback validation error
    pub fn invalid_feedback(reason: impl Into<String>) -> Self {
        Self::InvalidFeedback {
            reason: reason.into(),
        }
    }

    /// Create a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }

    /// Create a storage error for the given tier
    pub fn storage(tier: Tier, message: impl Into<String>) -> Self {
        Self::Storage {
            tier,
            message: message.into(),
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error was caused by user input rather than the service
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::CgpaOutOfRange { .. } | Self::InvalidCgpa { .. } | Self::InvalidFeedback { .. }
        )
    }

    /// Check if this error came from a storage tier
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Io(_) | Self::Json(_)
        )
    }

    /// Message shown to the visitor.
    ///
    /// User errors are shown verbatim. Anything else gets a fixed message;
    /// callers log the error itself.
    pub fn user_message(&self) -> String {
        if self.is_user_error() {
            self.to_string()
        } else {
            GENERIC_MESSAGE.to_string()
        }
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CgpaOutOfRange { .. } | Self::InvalidCgpa { .. } => 2,
            Self::InvalidFeedback { .. } => 2,
            Self::Model { .. } => 3,
            Self::Storage { .. } => 4,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for predictor results
pub type Result<T> = std::result::Result<T, PredictorError>;

/// Extension trait for tagging foreign errors with the storage tier they came from
pub trait IntoStorageError<T> {
    fn into_storage(self, tier: Tier) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoStorageError<T> for std::result::Result<T, E> {
    fn into_storage(self, tier: Tier) -> Result<T> {
        self.map_err(|e| PredictorError::storage(tier, e.to_string()))
    }
}
