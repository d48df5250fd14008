use aclgate_error::RuleError;

use crate::{context::RequestContext, rules::SyncRule};

#[derive(Debug, Clone, Copy)]
pub struct MaxBodyLengthRule {
    limit: u64,
}

impl MaxBodyLengthRule {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

impl SyncRule for MaxBodyLengthRule {
    fn key(&self) -> &str {
        "maxBodyLength"
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        Ok(ctx.content_length() as u64 <= self.limit)
    }
}
