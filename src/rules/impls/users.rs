use aclgate_error::{ConfigError, RuleError};

use crate::{
    context::RequestContext,
    matcher::WildcardMatcher,
    rules::SyncRule,
    variables::contains_variables,
};

const KEY: &str = "users";

/// Matches the logged user against wildcard patterns, which may contain
/// variables.
#[derive(Debug, Clone)]
pub struct UsersRule {
    patterns: Vec<String>,
    /// Prebuilt when no pattern needs per-request resolution.
    fixed: Option<WildcardMatcher>,
}

impl UsersRule {
    pub fn new(patterns: Vec<String>) -> Result<Self, ConfigError> {
        if patterns.is_empty() {
            return Err(ConfigError::invalid_value(KEY, "no users configured"));
        }
        let fixed = if patterns.iter().any(|p| contains_variables(p)) {
            None
        } else {
            Some(WildcardMatcher::new(&patterns)?)
        };
        Ok(Self { patterns, fixed })
    }
}

impl SyncRule for UsersRule {
    fn key(&self) -> &str {
        KEY
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        let Some(user) = ctx.logged_user() else {
            return Ok(false);
        };
        if let Some(ref matcher) = self.fixed {
            return Ok(matcher.is_match(&user.id));
        }
        let resolved = ctx.variables().resolve_all(&self.patterns);
        let matcher = WildcardMatcher::new(&resolved).map_err(|e| RuleError::Misconfigured {
            rule: KEY.to_string(),
            reason: e.to_string(),
        })?;
        Ok(matcher.is_match(&user.id))
    }
}
