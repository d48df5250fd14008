use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Malformed settings detected while an ACL is being built.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("block '{block}': unknown rule '{rule}'")]
    UnknownRule { block: String, rule: String },
    #[error("rule '{rule}': {reason}")]
    InvalidRuleValue { rule: String, reason: String },
    #[error("block '{block}' contains an authorization rule, but not an authentication rule")]
    MissingAuthentication { block: String },
    #[error("block name '{block}' is declared more than once")]
    DuplicateBlock { block: String },
    #[error("block '{block}': {reason}")]
    InvalidBlock { block: String, reason: String },
    #[error("no {kind} named '{name}' is defined")]
    UnknownDefinition { kind: String, name: String },
    #[error("cannot load settings: {reason}")]
    Source { reason: String },
}

impl ConfigError {
    pub fn invalid_value(
        rule: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRuleValue {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownRule { .. } => StatusCode::UnknownRule,
            Self::InvalidRuleValue { .. } => StatusCode::InvalidRuleValue,
            Self::MissingAuthentication { .. } => StatusCode::MissingAuthentication,
            Self::DuplicateBlock { .. } => StatusCode::DuplicateBlock,
            Self::InvalidBlock { .. } => StatusCode::InvalidConfig,
            Self::UnknownDefinition { .. } => StatusCode::UnknownDefinition,
            Self::Source { .. } => StatusCode::SettingsSource,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
