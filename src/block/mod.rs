use std::{fmt, panic::AssertUnwindSafe, sync::Arc};

use aclgate_error::{ConfigError, RuleError};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::{
    context::RequestContext,
    definitions::Definitions,
    rules::{factory::build_block_rules, sort_rules, Capabilities, Rule, RuleExitResult},
    sequencer::{fold_until, Step},
};

/// What happens to a request matched by a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    #[default]
    Allow,
    Forbid,
}

/// How loudly a block reports its verdicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Info,
    Error,
}

/// One named policy: an ordered rule chain evaluated with AND semantics.
pub struct Block {
    name: String,
    policy: Policy,
    verbosity: Verbosity,
    rules: Vec<Arc<dyn Rule>>,
    auth_header_accepted: bool,
}

/// Outcome of a block for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockExitResult {
    Match { block: String, policy: Policy },
    NoMatch,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl Block {
    /// Builds a block from already constructed rules, reordering them.
    ///
    /// Fails if the block authorizes without authenticating.
    pub fn new(
        name: impl Into<String>,
        policy: Policy,
        verbosity: Verbosity,
        mut rules: Vec<Arc<dyn Rule>>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let has = |capability: Capabilities| {
            rules
                .iter()
                .any(|r| r.capabilities().contains(capability))
        };
        let authenticates = has(Capabilities::AUTHENTICATION);
        if has(Capabilities::AUTHORIZATION) && !authenticates {
            return Err(ConfigError::MissingAuthentication { block: name });
        }

        sort_rules(&mut rules);
        debug!(
            block = %name,
            rules = ?rules.iter().map(|r| r.key()).collect::<Vec<_>>(),
            "block built"
        );
        Ok(Self {
            name,
            policy,
            verbosity,
            rules,
            auth_header_accepted: authenticates,
        })
    }

    /// Builds a block from its rule settings.
    pub fn from_settings(
        name: impl Into<String>,
        policy: Policy,
        verbosity: Verbosity,
        rules: &Map<String, Value>,
        definitions: &Definitions,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let built = build_block_rules(&name, rules, definitions)?;
        Self::new(name, policy, verbosity, built)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    /// Whether a rule of this block reads credentials from the request.
    pub fn auth_header_accepted(&self) -> bool {
        self.auth_header_accepted
    }

    /// Evaluates the rules in order, stopping at the first non-match.
    ///
    /// Rule errors and panics count as a non-match. The verdicts are
    /// appended to the context history before returning.
    pub async fn check(
        &self,
        ctx: &mut RequestContext,
    ) -> BlockExitResult {
        let stop = |r: &RuleExitResult| !r.matched;
        let rules: Vec<&dyn Rule> = self.rules.iter().map(|r| r.as_ref()).collect();
        let folded = fold_until(rules, ctx, stop).await;
        let matched = !folded.stopped;
        ctx.add_history(self.name.clone(), folded.outputs);

        if matched {
            let id = ctx.id();
            match self.policy {
                Policy::Allow => info!(request_id = %id, block = %self.name, "block matched"),
                Policy::Forbid => {
                    warn!(request_id = %id, block = %self.name, "forbid block matched")
                }
            }
            BlockExitResult::Match {
                block: self.name.clone(),
                policy: self.policy,
            }
        } else {
            debug!(request_id = %ctx.id(), block = %self.name, "block did not match");
            BlockExitResult::NoMatch
        }
    }
}

impl BlockExitResult {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match { .. })
    }
}

/// Unwinds into a readable message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return s.to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".to_string()
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl<'r> Step<RequestContext> for dyn Rule + 'r {
    type Output = RuleExitResult;

    async fn run(
        &self,
        ctx: &mut RequestContext,
    ) -> RuleExitResult {
        let outcome = AssertUnwindSafe(self.check(ctx)).catch_unwind().await;
        let err = match outcome {
            Ok(Ok(result)) => return result,
            Ok(Err(err)) => err,
            Err(payload) => RuleError::Panicked {
                rule: self.key().to_string(),
                reason: panic_message(payload.as_ref()),
            },
        };
        error!(
            request_id = %ctx.id(),
            rule = self.key(),
            error = %err,
            "rule failed, treating as no match"
        );
        RuleExitResult::no_match(self.key())
    }
}

impl fmt::Display for Block {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let policy = match self.policy {
            Policy::Allow => "ALLOW",
            Policy::Forbid => "FORBID",
        };
        write!(f, "{{ name: '{}', policy: {}}}", self.name, policy)
    }
}

impl fmt::Debug for Block {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Block")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("verbosity", &self.verbosity)
            .field("rules", &self.rules.iter().map(|r| r.key()).collect::<Vec<_>>())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::context::StaticRequestInfo;

    struct Fixed {
        key: &'static str,
        verdict: Option<bool>,
        capabilities: Capabilities,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(
            key: &'static str,
            verdict: Option<bool>,
        ) -> Self {
            Self {
                key,
                verdict,
                capabilities: Capabilities::empty(),
                calls: AtomicUsize::new(0),
            }
        }

        fn with(
            mut self,
            capabilities: Capabilities,
        ) -> Self {
            self.capabilities = capabilities;
            self
        }
    }

    #[async_trait]
    impl Rule for Fixed {
        fn key(&self) -> &str {
            self.key
        }

        fn capabilities(&self) -> Capabilities {
            self.capabilities
        }

        async fn check(
            &self,
            _ctx: &mut RequestContext,
        ) -> Result<RuleExitResult, RuleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.verdict {
                Some(v) => Ok(RuleExitResult::new(self.key, v)),
                None => Err(RuleError::Misconfigured {
                    rule: self.key.to_string(),
                    reason: "broken".to_string(),
                }),
            }
        }
    }

    struct Panicking;

    #[async_trait]
    impl Rule for Panicking {
        fn key(&self) -> &str {
            "panicking"
        }

        async fn check(
            &self,
            _ctx: &mut RequestContext,
        ) -> Result<RuleExitResult, RuleError> {
            panic!("rule exploded");
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Arc::new(StaticRequestInfo::builder().build())).unwrap()
    }

    #[tokio::test]
    async fn test_all_rules_match() {
        let block = Block::new(
            "b1",
            Policy::Allow,
            Verbosity::Info,
            vec![Arc::new(Fixed::new("a", Some(true))), Arc::new(Fixed::new("b", Some(true)))],
        )
        .unwrap();
        let mut ctx = ctx();
        let result = block.check(&mut ctx).await;

        assert_eq!(
            result,
            BlockExitResult::Match {
                block: "b1".to_string(),
                policy: Policy::Allow
            }
        );
        assert_eq!(ctx.history().len(), 1);
        assert_eq!(ctx.history()[0].results.len(), 2);
    }

    /// Checks the AND short-circuit and that history is still recorded.
    #[tokio::test]
    async fn test_short_circuit() {
        let third = Arc::new(Fixed::new("c", Some(true)));
        let block = Block::new(
            "b1",
            Policy::Allow,
            Verbosity::Info,
            vec![
                Arc::new(Fixed::new("a", Some(true))),
                Arc::new(Fixed::new("b", Some(false))),
                third.clone(),
            ],
        )
        .unwrap();
        let mut ctx = ctx();

        assert!(!block.check(&mut ctx).await.is_match());
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
        let results = &ctx.history()[0].results;
        assert_eq!(results.len(), 2);
        assert!(results[0].matched);
        assert!(!results[1].matched);
    }

    #[tokio::test]
    async fn test_rule_error_is_no_match() {
        let block = Block::new(
            "b1",
            Policy::Allow,
            Verbosity::Info,
            vec![Arc::new(Fixed::new("broken", None))],
        )
        .unwrap();
        let mut ctx = ctx();
        assert!(!block.check(&mut ctx).await.is_match());
        assert!(!ctx.history()[0].results[0].matched);
    }

    #[tokio::test]
    async fn test_rule_panic_is_no_match() {
        let block =
            Block::new("b1", Policy::Allow, Verbosity::Info, vec![Arc::new(Panicking)]).unwrap();
        let mut ctx = ctx();
        assert!(!block.check(&mut ctx).await.is_match());
        assert_eq!(ctx.history()[0].results[0].rule, "panicking");
    }

    #[test]
    fn test_authorization_requires_authentication() {
        let authz = || {
            Arc::new(Fixed::new("z", Some(true)).with(Capabilities::AUTHORIZATION)) as Arc<dyn Rule>
        };
        let err = Block::new("b1", Policy::Allow, Verbosity::Info, vec![authz()]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingAuthentication { ref block } if block == "b1"));

        let authn = Arc::new(Fixed::new("n", Some(true)).with(Capabilities::AUTHENTICATION));
        let block = Block::new("b2", Policy::Allow, Verbosity::Info, vec![authz(), authn]).unwrap();
        assert!(block.auth_header_accepted());
    }

    #[test]
    fn test_display() {
        let block = Block::new("b1", Policy::Forbid, Verbosity::Error, Vec::new()).unwrap();
        assert_eq!(block.to_string(), "{ name: 'b1', policy: FORBID}");
        assert!(!block.auth_header_accepted());
    }
}
