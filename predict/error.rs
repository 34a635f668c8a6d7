//! Failure taxonomy for the prediction core.
//!
//! Every failure that can happen between reading a model artifact and handing a
//! result to the caller is one of six kinds. Callers are expected to render a
//! generic notice together with [`ErrorKind::code`]; nothing in the core is
//! allowed to take the host process down.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ModelError;
use crate::schema::Disease;

/// Coarse classification of a [`PredictError`], stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    CorruptArtifact,
    UnsupportedArtifactFormat,
    InvalidFieldValue,
    DimensionMismatch,
    PredictionFailed,
}

impl ErrorKind {
    /// Machine-readable code rendered next to user-facing failure notices.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::CorruptArtifact => "corrupt_artifact",
            ErrorKind::UnsupportedArtifactFormat => "unsupported_artifact_format",
            ErrorKind::InvalidFieldValue => "invalid_field_value",
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::PredictionFailed => "prediction_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Model artifact not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("No model artifact is configured for {0}; prediction is unavailable.")]
    ModelUnavailable(Disease),

    #[error("Model artifact '{}' could not be decoded: {reason}", .path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("Model artifact '{}' has an unsupported layout: {reason}", .path.display())]
    UnsupportedArtifactFormat { path: PathBuf, reason: String },

    #[error("Field '{field}' has unrecognized value '{value}'.")]
    InvalidFieldValue { field: String, value: String },

    #[error("{context} expects {expected} features, but {found} were provided.")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Prediction failed: {source}")]
    PredictionFailed {
        #[source]
        source: ModelError,
    },
}

impl PredictError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictError::NotFound { .. } | PredictError::ModelUnavailable(_) => {
                ErrorKind::NotFound
            }
            PredictError::CorruptArtifact { .. } => ErrorKind::CorruptArtifact,
            PredictError::UnsupportedArtifactFormat { .. } => {
                ErrorKind::UnsupportedArtifactFormat
            }
            PredictError::InvalidFieldValue { .. } => ErrorKind::InvalidFieldValue,
            PredictError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            PredictError::PredictionFailed { .. } => ErrorKind::PredictionFailed,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        PredictError::CorruptArtifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        PredictError::UnsupportedArtifactFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<ModelError> for PredictError {
    fn from(source: ModelError) -> Self {
        PredictError::PredictionFailed { source }
    }
}

/// Serializable view of a failure, suitable for structured responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl From<&PredictError> for ErrorReport {
    fn from(error: &PredictError) -> Self {
        ErrorReport {
            kind: error.kind(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}
