pub mod audit;
pub mod handle;
pub mod outcome;

use std::{collections::HashSet, fmt, panic::AssertUnwindSafe, sync::Arc};

use aclgate_error::{AclError, AclResult, ConfigError, ContextError, ResultExt, StackError};
use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, info, warn, Level};

pub use audit::{AuditRecord, AuditSink, TracingAuditSink};
pub use handle::AclHandle;
pub use outcome::AclOutcome;

use crate::{
    block::{panic_message, Block, BlockExitResult, Policy, Verbosity},
    config::AclSettings,
    context::RequestContext,
    definitions::Definitions,
    sequencer::{fold_until, Step},
};

/// Ordered list of blocks; the first matching block decides.
pub struct Acl {
    blocks: Vec<Block>,
    forbidden_message: String,
    prompt_for_basic_auth: bool,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl Acl {
    /// Builds every block of `settings`, failing on the first invalid one.
    ///
    /// Every service declared in the settings must be registered in
    /// `definitions`.
    pub fn new(
        settings: &AclSettings,
        definitions: &Definitions,
    ) -> Result<Self, ConfigError> {
        for declared in &settings.external_authentication_service_configs {
            definitions.authentication_service(&declared.name)?;
        }
        for declared in &settings.user_groups_providers {
            definitions.groups_provider(&declared.name)?;
        }

        let mut seen = HashSet::new();
        let mut blocks = Vec::with_capacity(settings.access_control_rules.len());
        for block in &settings.access_control_rules {
            if !seen.insert(block.name.as_str()) {
                return Err(ConfigError::DuplicateBlock {
                    block: block.name.clone(),
                });
            }
            blocks.push(Block::from_settings(
                block.name.clone(),
                block.policy,
                block.verbosity,
                &block.rules,
                definitions,
            )?);
        }

        let acl = Self::from_blocks(blocks)
            .forbidden_message(settings.forbidden_message.clone())
            .prompt_for_basic_auth(settings.prompt_for_basic_auth);
        info!(blocks = acl.blocks.len(), "access control list loaded");
        Ok(if settings.audit_collector {
            acl.with_audit_sink(Arc::new(TracingAuditSink))
        } else {
            acl
        })
    }

    /// Wraps already built blocks with default settings.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            forbidden_message: "forbidden".to_string(),
            prompt_for_basic_auth: true,
            audit_sink: None,
        }
    }

    pub fn forbidden_message(
        mut self,
        message: impl Into<String>,
    ) -> Self {
        self.forbidden_message = message.into();
        self
    }

    pub fn prompt_for_basic_auth(
        mut self,
        prompt: bool,
    ) -> Self {
        self.prompt_for_basic_auth = prompt;
        self
    }

    pub fn with_audit_sink(
        mut self,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Whether a refusal should carry a Basic auth challenge.
    pub fn requires_password(&self) -> bool {
        self.prompt_for_basic_auth && self.blocks.iter().any(Block::auth_header_accepted)
    }

    /// Evaluates the blocks in order and returns the verdict.
    ///
    /// The context is reset before each block. Only an ALLOW match commits
    /// it, so a refused request leaves the host's request untouched.
    pub async fn check(
        &self,
        ctx: &mut RequestContext,
    ) -> AclOutcome {
        let stop = |r: &BlockExitResult| r.is_match();
        let evaluation = AssertUnwindSafe(fold_until(self.blocks.iter(), &mut *ctx, stop))
            .catch_unwind()
            .await;
        let folded = match evaluation {
            Ok(folded) => folded,
            Err(payload) => {
                let err = AclError::BlockPanicked {
                    block: self
                        .blocks
                        .get(ctx.history().len())
                        .map(|b| b.name().to_string())
                        .unwrap_or_default(),
                    reason: panic_message(payload.as_ref()),
                };
                error!(request_id = %ctx.id(), error = %err, "acl evaluation panicked");
                ctx.reset();
                let outcome = AclOutcome::Errored {
                    reason: err.to_string(),
                };
                self.audit(ctx, &outcome, None);
                return outcome;
            }
        };

        let decided = folded
            .stopped_at()
            .and(folded.outputs.len().checked_sub(1))
            .and_then(|i| self.blocks.get(i));
        let outcome = match folded.stopped_at() {
            Some(BlockExitResult::Match {
                block,
                policy: Policy::Allow,
            }) => match commit(ctx, block) {
                Ok(()) => AclOutcome::Allowed {
                    block: block.clone(),
                },
                Err(err) => self.commit_failed(ctx, &err),
            },
            Some(BlockExitResult::Match { block, .. }) => AclOutcome::Forbidden {
                block: Some(block.clone()),
                requires_password: self.requires_password(),
                message: self.forbidden_message.clone(),
            },
            _ => {
                // drop what the last block staged, nobody decided on it
                ctx.reset();
                AclOutcome::Forbidden {
                    block: None,
                    requires_password: self.requires_password(),
                    message: self.forbidden_message.clone(),
                }
            }
        };

        self.report(ctx, &outcome, decided);
        self.audit(ctx, &outcome, decided);
        outcome
    }

    /// A missing resource is the host's natural 404, anything else fails
    /// the request.
    fn commit_failed(
        &self,
        ctx: &RequestContext,
        err: &StackError,
    ) -> AclOutcome {
        if let Some(ContextError::NotFound { resource }) = err.downcast_ref::<ContextError>() {
            return AclOutcome::NotFound {
                resource: resource.clone(),
            };
        }
        error!(
            request_id = %ctx.id(),
            status = %err.status_code(),
            error = %err,
            "cannot apply allowed request"
        );
        AclOutcome::Errored {
            reason: err.to_string(),
        }
    }

    fn report(
        &self,
        ctx: &RequestContext,
        outcome: &AclOutcome,
        decided: Option<&Block>,
    ) {
        let quiet = decided.is_some_and(|b| b.verbosity() == Verbosity::Error);
        let id = ctx.id();
        match outcome {
            AclOutcome::Allowed { .. } if quiet => {
                debug!(request_id = %id, verdict = %outcome, "{ctx}")
            }
            AclOutcome::Allowed { .. } => info!(request_id = %id, verdict = %outcome, "{ctx}"),
            AclOutcome::Forbidden { .. } => warn!(request_id = %id, verdict = %outcome, "{ctx}"),
            AclOutcome::NotFound { resource } => {
                info!(request_id = %id, verdict = %outcome, resource = %resource, "{ctx}")
            }
            AclOutcome::Errored { .. } => error!(request_id = %id, verdict = %outcome, "{ctx}"),
        }
    }

    fn audit(
        &self,
        ctx: &RequestContext,
        outcome: &AclOutcome,
        decided: Option<&Block>,
    ) {
        let Some(sink) = &self.audit_sink else {
            return;
        };
        if outcome.is_allowed() && decided.is_some_and(|b| b.verbosity() == Verbosity::Error) {
            return;
        }
        let record = AuditRecord::new(ctx, outcome, tracing::enabled!(Level::DEBUG));
        sink.submit(&record);
    }
}

/// Hands the staged changes of the allowing block to the host.
fn commit(
    ctx: &RequestContext,
    block: &str,
) -> AclResult<()> {
    ctx.commit()
        .with_context(|| format!("cannot commit block '{block}'"))
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Step<RequestContext> for Block {
    type Output = BlockExitResult;

    async fn run(
        &self,
        ctx: &mut RequestContext,
    ) -> BlockExitResult {
        ctx.reset();
        self.check(ctx).await
    }
}

impl fmt::Debug for Acl {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Acl")
            .field("blocks", &self.blocks)
            .field("forbidden_message", &self.forbidden_message)
            .field("prompt_for_basic_auth", &self.prompt_for_basic_auth)
            .field("audit", &self.audit_sink.is_some())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
