use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Failure raised by a single rule while it checks a request.
#[derive(Debug, Clone, Error)]
pub enum RuleError {
    #[error("external service '{service}' failed: {reason}")]
    ExternalService { service: String, reason: String },
    #[error("rule '{rule}' is misconfigured: {reason}")]
    Misconfigured { rule: String, reason: String },
    #[error("rule '{rule}' cannot read the request: {reason}")]
    MissingRequestData { rule: String, reason: String },
    #[error("rule '{rule}' panicked: {reason}")]
    Panicked { rule: String, reason: String },
}

impl ErrorExt for RuleError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ExternalService { .. } => StatusCode::ExternalService,
            Self::Misconfigured { .. } | Self::MissingRequestData { .. } => StatusCode::RuleFailed,
            Self::Panicked { .. } => StatusCode::RulePanicked,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn client_message(&self) -> String {
        "Internal server error".to_string()
    }
}
