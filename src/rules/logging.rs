use std::{sync::Arc, time::Instant};

use aclgate_error::RuleError;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Capabilities, Rule, RuleExitResult};
use crate::context::RequestContext;

/// Traces every invocation of the wrapped rule. The verdict passes through
/// untouched.
pub struct LoggingRule {
    inner: Arc<dyn Rule>,
}

impl LoggingRule {
    pub fn wrap(inner: Arc<dyn Rule>) -> Arc<dyn Rule> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl Rule for LoggingRule {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn check(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<RuleExitResult, RuleError> {
        let started = Instant::now();
        debug!(request_id = %ctx.id(), rule = self.key(), "rule invoked");

        let result = self.inner.check(ctx).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(ref exit) => debug!(
                request_id = %ctx.id(),
                rule = self.key(),
                matched = exit.matched,
                elapsed_ms,
                "rule finished"
            ),
            Err(ref err) => warn!(
                request_id = %ctx.id(),
                rule = self.key(),
                error = %err,
                elapsed_ms,
                "rule failed"
            ),
        }
        result
    }
}
