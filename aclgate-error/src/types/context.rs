use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Misuse of a transactional request field or failure to hand results back
/// to the host.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("transactional field '{field}' is already committed")]
    AlreadyCommitted { field: String },
    #[error("transactional field '{field}' is already delegated")]
    AlreadyDelegated { field: String },
    #[error("cannot write '{field}' back to the request: {reason}")]
    WriteBack { field: String, reason: String },
    #[error("resource not found: {resource}")]
    NotFound { resource: String },
}

impl ErrorExt for ContextError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadyCommitted { .. } => StatusCode::AlreadyCommitted,
            Self::AlreadyDelegated { .. } => StatusCode::AlreadyDelegated,
            Self::WriteBack { .. } => StatusCode::WriteBackFailed,
            Self::NotFound { .. } => StatusCode::NotFound,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::NotFound { resource } => format!("no such index [{resource}]"),
            _ => "Internal server error".to_string(),
        }
    }
}
