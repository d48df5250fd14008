use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Failure escaping block evaluation as a whole.
#[derive(Debug, Clone, Error)]
pub enum AclError {
    #[error("evaluation of block '{block}' panicked: {reason}")]
    BlockPanicked { block: String, reason: String },
}

impl ErrorExt for AclError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BlockPanicked { .. } => StatusCode::RulePanicked,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn client_message(&self) -> String {
        "Internal server error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_panicked() {
        let err = AclError::BlockPanicked {
            block: "b1".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(err.status_code().http_status(), 500);
        assert_eq!(err.client_message(), "Internal server error");
        assert!(err.to_string().contains("'b1'"));
    }
}
