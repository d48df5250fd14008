use aclgate_error::RuleError;

use super::{first_forwarded_for, AddressPattern, X_FORWARDED_FOR_HEADER};
use crate::{context::RequestContext, rules::SyncRule};

/// Block-level switch making `hosts` trust `X-Forwarded-For`.
pub const ACCEPT_X_FORWARDED_FOR: &str = "accept_x-forwarded-for_header";

/// Matches the caller's address against IPs, networks and host names.
#[derive(Debug, Clone)]
pub struct HostsRule {
    allowed: Vec<AddressPattern>,
    accept_x_forwarded_for: bool,
}

impl HostsRule {
    pub fn new(
        hosts: Vec<String>,
        accept_x_forwarded_for: bool,
    ) -> Self {
        Self {
            allowed: hosts.iter().map(|h| AddressPattern::parse(h)).collect(),
            accept_x_forwarded_for,
        }
    }
}

impl SyncRule for HostsRule {
    fn key(&self) -> &str {
        "hosts"
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        if self.allowed.is_empty() {
            return Ok(true);
        }

        if self.accept_x_forwarded_for {
            if let Some(forwarded) = ctx
                .header(X_FORWARDED_FOR_HEADER)
                .and_then(first_forwarded_for)
            {
                if self.allowed.iter().any(|p| p.matches(forwarded)) {
                    return Ok(true);
                }
            }
        }

        let address = ctx
            .remote_address()
            .ok_or_else(|| RuleError::MissingRequestData {
                rule: "hosts".to_string(),
                reason: "the remote address is unknown".to_string(),
            })?;
        Ok(self.allowed.iter().any(|p| p.matches(&address)))
    }
}
