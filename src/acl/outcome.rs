use std::fmt;

/// Final verdict of the ACL for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclOutcome {
    /// An ALLOW block matched and the request context was committed.
    Allowed { block: String },
    /// A FORBID block matched, or nothing matched.
    Forbidden {
        /// Matching FORBID block, `None` when no block matched.
        block: Option<String>,
        /// Reply with a Basic auth challenge instead of a plain refusal.
        requires_password: bool,
        message: String,
    },
    /// Evaluation failed; the request must be rejected.
    Errored { reason: String },
    /// The request names a resource the host does not have.
    NotFound { resource: String },
}

impl AclOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Status code the host should reply with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Allowed { .. } => 200,
            Self::Forbidden {
                requires_password: true,
                ..
            } => 401,
            Self::Forbidden { .. } => 403,
            Self::Errored { .. } => 500,
            Self::NotFound { .. } => 404,
        }
    }

    /// Name used in logs and audit records.
    pub fn final_state(&self) -> &'static str {
        match self {
            Self::Allowed { .. } => "ALLOWED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Errored { .. } => "ERRORED",
            Self::NotFound { .. } => "NOT_FOUND",
        }
    }

    /// Name of the block that decided, or `default` when none did.
    pub fn matched_block(&self) -> &str {
        match self {
            Self::Allowed { block } => block,
            Self::Forbidden {
                block: Some(block), ..
            } => block,
            _ => "default",
        }
    }
}

impl fmt::Display for AclOutcome {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{} by {}", self.final_state(), self.matched_block())
    }
}
