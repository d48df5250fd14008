pub mod cache;
pub mod factory;
pub mod impls;
pub mod logging;
pub mod ordering;

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use aclgate_error::RuleError;
use async_trait::async_trait;

pub use cache::{wrap_in_cache_if_enabled, CachedRule, TtlCache};
pub use factory::build_rule;
pub use logging::LoggingRule;
pub use ordering::{position_of, sort_rules};

use crate::context::RequestContext;

bitflags::bitflags! {
    /// What a rule establishes about the caller.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Establishes who the caller is.
        const AUTHENTICATION = 1 << 0;
        /// Decides what an already known caller may do.
        const AUTHORIZATION = 1 << 1;
    }
}

/// Verdict of one rule for one request.
///
/// Two results are equal when they come from the same rule, whatever their
/// verdicts.
#[derive(Debug, Clone)]
pub struct RuleExitResult {
    pub rule: String,
    pub matched: bool,
}

/// A single policy check.
///
/// Rules mutate the request only through the context's transactional
/// fields. Returning an error aborts the rule; the block treats it as a
/// non-match.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Settings key identifying the rule.
    fn key(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    async fn check(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<RuleExitResult, RuleError>;
}

/// A rule that never waits.
pub trait SyncRule: Send + Sync {
    fn key(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError>;
}

/// Runs a [`SyncRule`] as a [`Rule`]; the verdict is ready on first poll.
pub struct SyncRuleAdapter<R> {
    inner: R,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl RuleExitResult {
    pub fn new(
        rule: impl Into<String>,
        matched: bool,
    ) -> Self {
        Self {
            rule: rule.into(),
            matched,
        }
    }

    pub fn matched(rule: impl Into<String>) -> Self {
        Self::new(rule, true)
    }

    pub fn no_match(rule: impl Into<String>) -> Self {
        Self::new(rule, false)
    }
}

impl<R> SyncRuleAdapter<R>
where
    R: SyncRule,
{
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations
////////////////////////////////////////////////////////////////////////////////

impl PartialEq for RuleExitResult {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.rule == other.rule
    }
}

impl Eq for RuleExitResult {}

impl Hash for RuleExitResult {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.rule.hash(state);
    }
}

impl fmt::Display for RuleExitResult {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}->{}", self.rule, self.matched)
    }
}

#[async_trait]
impl<R> Rule for SyncRuleAdapter<R>
where
    R: SyncRule,
{
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
        let matched = self.inner.check_sync(ctx)?;
        Ok(RuleExitResult::new(self.inner.key(), matched))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;
    use crate::context::StaticRequestInfo;

    struct Always(bool);

    impl SyncRule for Always {
        fn key(&self) -> &str {
            "always"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::AUTHENTICATION
        }

        fn check_sync(
            &self,
            _ctx: &mut RequestContext,
        ) -> Result<bool, RuleError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn test_sync_adapter() {
        let mut ctx = RequestContext::new(Arc::new(StaticRequestInfo::builder().build())).unwrap();
        let rule = SyncRuleAdapter::new(Always(true));

        let result = rule.check(&mut ctx).await.unwrap();
        assert!(result.matched);
        assert_eq!(result.rule, "always");
        assert!(rule.capabilities().contains(Capabilities::AUTHENTICATION));
        assert!(!rule.capabilities().contains(Capabilities::AUTHORIZATION));
    }

    /// Checks that results are keyed by rule in hashed collections.
    #[test]
    fn test_exit_result_identity() {
        let mut set = HashSet::new();
        set.insert(RuleExitResult::matched("hosts"));
        set.insert(RuleExitResult::no_match("hosts"));
        set.insert(RuleExitResult::matched("indices"));
        assert_eq!(set.len(), 2);
        assert_eq!(RuleExitResult::no_match("hosts").to_string(), "hosts->false");
    }
}
