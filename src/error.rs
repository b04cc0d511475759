//! Error types.
//!
//! - `RoiError` is what the library returns. Each variant names a failure kind
//!   callers may want to match on.
//! - `AppError` is what the `roi` binary reports: a message plus a process exit code.
//!
//! Non-fatal conditions (a prediction that fell back to the model intercept, an
//! address that could not be scored) are not errors; they are flags on the
//! returned values.

/// Library error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoiError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("empty dataset: {reason}")]
    EmptyDataset { reason: String },

    #[error("missing column: `{column}`")]
    MissingColumn { column: String },

    #[error("model fit failed: {reason}")]
    ModelFit { reason: String },

    #[error("{collaborator} request failed: {reason}")]
    Collaborator {
        collaborator: &'static str,
        reason: String,
    },

    #[error("i/o failure: {reason}")]
    Io { reason: String },
}

impl RoiError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn empty(reason: impl Into<String>) -> Self {
        Self::EmptyDataset {
            reason: reason.into(),
        }
    }

    pub fn io(reason: impl Into<String>) -> Self {
        Self::Io {
            reason: reason.into(),
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<RoiError> for AppError {
    fn from(err: RoiError) -> Self {
        let exit_code = match &err {
            RoiError::InvalidInput { .. } | RoiError::MissingColumn { .. } => 2,
            RoiError::EmptyDataset { .. } => 3,
            RoiError::ModelFit { .. } | RoiError::Collaborator { .. } | RoiError::Io { .. } => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roi_errors_map_to_exit_codes() {
        let e: AppError = RoiError::invalid("bad").into();
        assert_eq!(e.exit_code(), 2);
        let e: AppError = RoiError::empty("none").into();
        assert_eq!(e.exit_code(), 3);
        let e: AppError = RoiError::ModelFit {
            reason: "singular".to_string(),
        }
        .into();
        assert_eq!(e.exit_code(), 4);
        assert!(e.to_string().contains("singular"));
    }
}
