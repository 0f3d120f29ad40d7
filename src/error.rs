//! Error types for the pvoc-oracle crate.

use thiserror::Error;

/// Errors that can occur during analysis, resynthesis, comparison, or validation.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Bad window length, FFT size, hop, or tolerance setting.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Malformed or empty buffer or stream.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Reference and candidate lengths differ by more than the allowance.
    #[error(
        "length mismatch: reference has {reference} samples, candidate has {candidate} (allowance {allowance})"
    )]
    LengthMismatch {
        reference: usize,
        candidate: usize,
        allowance: usize,
    },
    /// A reference or candidate implementation failed, crashed, or timed out.
    #[error("{implementation} failed: {reason}")]
    ExternalProcessFailure {
        implementation: String,
        reason: String,
        /// Captured stdout/stderr or panic payload, kept for post-mortem.
        diagnostics: String,
    },
    /// Corrupt or truncated persisted analysis stream.
    #[error("serialization error: {0}")]
    SerializationError(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OracleError>;

/// Fieldless discriminant of [`OracleError`], recorded in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    InvalidParameter,
    InvalidInput,
    LengthMismatch,
    ExternalProcessFailure,
    SerializationError,
    Io,
}

impl OracleError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OracleError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            OracleError::InvalidInput(_) => ErrorKind::InvalidInput,
            OracleError::LengthMismatch { .. } => ErrorKind::LengthMismatch,
            OracleError::ExternalProcessFailure { .. } => ErrorKind::ExternalProcessFailure,
            OracleError::SerializationError(_) => ErrorKind::SerializationError,
            OracleError::Io(_) => ErrorKind::Io,
        }
    }

    /// Captured diagnostic output, if this is an implementation failure.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            OracleError::ExternalProcessFailure { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

impl From<hound::Error> for OracleError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => OracleError::Io(e),
            other => OracleError::InvalidInput(format!("WAV decode failed: {}", other)),
        }
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(err: serde_json::Error) -> Self {
        OracleError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            OracleError::InvalidParameter("x".into()).kind(),
            ErrorKind::InvalidParameter
        );
        let err = OracleError::LengthMismatch {
            reference: 1000,
            candidate: 1002,
            allowance: 1,
        };
        assert_eq!(err.kind(), ErrorKind::LengthMismatch);
        assert!(err.to_string().contains("1002"));
    }

    #[test]
    fn test_diagnostics_only_on_process_failure() {
        let err = OracleError::ExternalProcessFailure {
            implementation: "ref".into(),
            reason: "exit status 3".into(),
            diagnostics: "stderr: boom".into(),
        };
        assert_eq!(err.diagnostics(), Some("stderr: boom"));
        assert!(OracleError::InvalidInput("x".into()).diagnostics().is_none());
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let err: OracleError = serde_json::from_str::<u32>("{").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::SerializationError);
    }
}
