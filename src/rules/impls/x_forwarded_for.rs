use aclgate_error::RuleError;

use super::{first_forwarded_for, AddressPattern, X_FORWARDED_FOR_HEADER};
use crate::{context::RequestContext, rules::SyncRule};

/// Matches the originating client named by `X-Forwarded-For`.
#[derive(Debug, Clone)]
pub struct XForwardedForRule {
    allowed: Vec<AddressPattern>,
}

impl XForwardedForRule {
    pub fn new(entries: Vec<String>) -> Self {
        Self {
            allowed: entries.iter().map(|e| AddressPattern::parse(e)).collect(),
        }
    }
}

impl SyncRule for XForwardedForRule {
    fn key(&self) -> &str {
        "x_forwarded_for"
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        let Some(client) = ctx
            .header(X_FORWARDED_FOR_HEADER)
            .and_then(first_forwarded_for)
        else {
            return Ok(false);
        };
        Ok(self.allowed.iter().any(|p| p.matches(client)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::StaticRequestInfo;

    fn ctx(xff: Option<&str>) -> RequestContext {
        let mut builder = StaticRequestInfo::builder();
        if let Some(xff) = xff {
            builder = builder.header("x-forwarded-for", xff);
        }
        RequestContext::new(Arc::new(builder.build())).unwrap()
    }

    #[test]
    fn test_first_entry_decides() {
        let rule = XForwardedForRule::new(vec!["172.16.0.0/12".to_string()]);
        assert!(rule.check_sync(&mut ctx(Some("172.16.5.5, 10.0.0.1"))).unwrap());
        assert!(!rule.check_sync(&mut ctx(Some("10.0.0.1, 172.16.5.5"))).unwrap());
    }

    #[test]
    fn test_no_header_no_match() {
        let rule = XForwardedForRule::new(vec!["0.0.0.0/0".to_string()]);
        assert!(!rule.check_sync(&mut ctx(None)).unwrap());
    }
}
