use std::collections::BTreeSet;

use aclgate_error::{ConfigError, RuleError};
use tracing::trace;

use crate::{
    context::RequestContext,
    matcher::WildcardMatcher,
    rules::SyncRule,
    variables::contains_variables,
};

const KEY: &str = "indices";
/// Pattern letting requests that name no index at all through.
pub const NO_INDEX: &str = "<no-index>";

/// Restricts the indices a request may touch.
///
/// Read requests are narrowed to the allowed part of what they ask for;
/// write requests must name allowed indices only.
#[derive(Debug, Clone)]
pub struct IndicesRule {
    patterns: Vec<String>,
    allows_everything: bool,
    /// Prebuilt when no pattern needs per-request resolution.
    fixed: Option<WildcardMatcher>,
}

impl IndicesRule {
    pub fn new(patterns: Vec<String>) -> Result<Self, ConfigError> {
        if patterns.is_empty() {
            return Err(ConfigError::invalid_value(KEY, "no indices configured"));
        }
        let fixed = if patterns.iter().any(|p| contains_variables(p)) {
            None
        } else {
            Some(WildcardMatcher::with_negations(&patterns)?)
        };
        Ok(Self {
            allows_everything: patterns.iter().any(|p| p == "*"),
            patterns,
            fixed,
        })
    }

    fn matcher(
        &self,
        ctx: &RequestContext,
    ) -> Result<WildcardMatcher, RuleError> {
        if let Some(ref matcher) = self.fixed {
            return Ok(matcher.clone());
        }
        let resolved = ctx.variables().resolve_all(&self.patterns);
        WildcardMatcher::with_negations(&resolved).map_err(|e| RuleError::Misconfigured {
            rule: KEY.to_string(),
            reason: e.to_string(),
        })
    }

    /// Whether a request, or one part of a composite request, stays within
    /// the allowed indices. May narrow the context's index set.
    fn can_pass(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        if !ctx.involves_indices() || self.allows_everything {
            return Ok(true);
        }

        let matcher = self.matcher(ctx)?;
        let mut indices = ctx.indices();

        if indices.is_empty() && matcher.patterns().iter().any(|p| p == NO_INDEX) {
            return Ok(true);
        }

        // nothing or everything requested: hand out the allowed existing ones
        if indices.is_empty() || indices.contains("_all") || indices.contains("*") {
            let allowed = matcher.filter(&ctx.all_indices_and_aliases());
            if allowed.is_empty() {
                return Ok(false);
            }
            ctx.set_indices(allowed);
            return Ok(true);
        }

        if !ctx.is_read_request() {
            return Ok(indices.iter().all(|i| matcher.is_match(i)));
        }

        if indices.len() == 1 && indices.iter().all(|i| matcher.is_match(i)) {
            trace!(request_id = %ctx.id(), "single allowed index");
            return Ok(true);
        }

        if matcher.filter(&indices).len() == indices.len() {
            return Ok(true);
        }

        // concrete names that do not exist end in a natural not-found
        let existing = ctx.all_indices_and_aliases();
        let missing: BTreeSet<String> = indices
            .iter()
            .filter(|i| !i.contains('*') && !existing.contains(*i))
            .cloned()
            .collect();
        if !missing.is_empty() {
            if !ctx.is_composite_request() {
                return Ok(true);
            }
            indices.retain(|i| !missing.contains(i));
            if indices.is_empty() {
                return Ok(true);
            }
        }

        let expansion = ctx.expand_indices(&indices);
        if expansion.is_empty() {
            return Ok(true);
        }

        let allowed = matcher.filter(&expansion);
        if allowed.is_empty() {
            return Ok(false);
        }
        ctx.set_indices(allowed);
        Ok(true)
    }
}

impl SyncRule for IndicesRule {
    fn key(&self) -> &str {
        KEY
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        if !ctx.has_sub_requests() {
            return self.can_pass(ctx);
        }
        // every part is narrowed, even after one has failed
        let mut all_pass = true;
        for sub in ctx.sub_contexts_mut() {
            all_pass &= self.can_pass(sub)?;
        }
        Ok(all_pass)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::{LoggedUser, StaticRequestInfo};

    const CLUSTER: [&str; 5] = ["logs-1", "logs-2", "metrics", "secret", "alias-logs"];

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn rule(patterns: &[&str]) -> IndicesRule {
        IndicesRule::new(patterns.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn read(indices: &[&str]) -> RequestContext {
        let info = StaticRequestInfo::builder()
            .indices(indices.iter().copied())
            .all_indices(CLUSTER)
            .build();
        RequestContext::new(Arc::new(info)).unwrap()
    }

    fn write(indices: &[&str]) -> RequestContext {
        let info = StaticRequestInfo::builder()
            .indices(indices.iter().copied())
            .all_indices(CLUSTER)
            .read_request(false)
            .build();
        RequestContext::new(Arc::new(info)).unwrap()
    }

    #[test]
    fn test_star_allows_everything() {
        let mut ctx = read(&["secret"]);
        assert!(rule(&["*"]).check_sync(&mut ctx).unwrap());
        assert_eq!(ctx.indices(), set(&["secret"]));
    }

    #[test]
    fn test_no_indices_involved() {
        let info = StaticRequestInfo::builder().involves_indices(false).build();
        let mut ctx = RequestContext::new(Arc::new(info)).unwrap();
        assert!(rule(&["logs-*"]).check_sync(&mut ctx).unwrap());
    }

    /// Checks that `_all` is replaced by the allowed existing indices.
    #[test]
    fn test_all_is_narrowed() {
        let mut ctx = read(&["_all"]);
        assert!(rule(&["logs-*"]).check_sync(&mut ctx).unwrap());
        assert_eq!(ctx.indices(), set(&["logs-1", "logs-2"]));

        let mut none = read(&["*"]);
        assert!(!rule(&["nothing-*"]).check_sync(&mut none).unwrap());
    }

    #[test]
    fn test_read_all_requested_allowed() {
        let mut ctx = read(&["logs-1", "logs-2"]);
        assert!(rule(&["logs-*"]).check_sync(&mut ctx).unwrap());
        assert_eq!(ctx.indices(), set(&["logs-1", "logs-2"]));
    }

    /// Checks that a wildcard request is narrowed to what is allowed.
    #[test]
    fn test_read_wildcard_is_narrowed() {
        let mut ctx = read(&["*s*"]);
        assert!(rule(&["logs-*", "~logs-2"]).check_sync(&mut ctx).unwrap());
        assert_eq!(ctx.indices(), set(&["logs-1"]));
    }

    #[test]
    fn test_read_forbidden_index() {
        let mut ctx = read(&["secret"]);
        assert!(!rule(&["logs-*"]).check_sync(&mut ctx).unwrap());
    }

    #[test]
    fn test_read_missing_index_passes_through() {
        let mut ctx = read(&["does-not-exist", "secret"]);
        assert!(rule(&["logs-*"]).check_sync(&mut ctx).unwrap());
        assert_eq!(ctx.indices(), set(&["does-not-exist", "secret"]));
    }

    #[test]
    fn test_composite_missing_index_is_dropped() {
        let info = StaticRequestInfo::builder()
            .indices(["does-not-exist", "secret"])
            .all_indices(CLUSTER)
            .composite(true)
            .build();
        let mut ctx = RequestContext::new(Arc::new(info)).unwrap();
        assert!(!rule(&["logs-*"]).check_sync(&mut ctx).unwrap());
    }

    #[test]
    fn test_write_requires_every_index() {
        assert!(rule(&["logs-*"]).check_sync(&mut write(&["logs-1"])).unwrap());
        assert!(!rule(&["logs-*"])
            .check_sync(&mut write(&["logs-1", "secret"]))
            .unwrap());
    }

    #[test]
    fn test_no_index_marker() {
        let mut ctx = write(&[]);
        assert!(rule(&[NO_INDEX]).check_sync(&mut ctx).unwrap());
    }

    #[test]
    fn test_user_variable() {
        let info = StaticRequestInfo::builder()
            .indices(["alice-logs"])
            .all_indices(["alice-logs", "bob-logs"])
            .build();
        let mut ctx = RequestContext::new(Arc::new(info)).unwrap();
        let rule = rule(&["@{user}-*"]);

        assert!(!rule.check_sync(&mut ctx).unwrap());
        ctx.set_logged_user(LoggedUser::new("alice"));
        assert!(rule.check_sync(&mut ctx).unwrap());
    }

    /// Checks that every part of a composite request is checked and narrowed.
    #[test]
    fn test_sub_requests() {
        let part = |indices: &[&str]| {
            StaticRequestInfo::builder()
                .indices(indices.iter().copied())
                .all_indices(CLUSTER)
                .build()
        };
        let info = StaticRequestInfo::builder()
            .sub_request(part(&["logs-*"]))
            .sub_request(part(&["metrics"]))
            .build();
        let mut ctx = RequestContext::new(Arc::new(info)).unwrap();

        assert!(!rule(&["logs-1"]).check_sync(&mut ctx).unwrap());
        assert_eq!(ctx.sub_contexts_mut()[0].indices(), set(&["logs-1"]));

        ctx.reset();
        assert!(rule(&["logs-*", "metrics"]).check_sync(&mut ctx).unwrap());
    }
}
