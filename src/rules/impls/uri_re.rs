use aclgate_error::{ConfigError, RuleError};
use regex::Regex;

use crate::{context::RequestContext, rules::SyncRule, variables::contains_variables};

const KEY: &str = "uri_re";

#[derive(Debug, Clone)]
enum UriPattern {
    Compiled(Regex),
    /// Compiled per request once its variables are resolved.
    Template(String),
}

/// Matches the request URI against regular expressions.
#[derive(Debug, Clone)]
pub struct UriReRule {
    patterns: Vec<UriPattern>,
}

impl UriReRule {
    pub fn new(patterns: Vec<String>) -> Result<Self, ConfigError> {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                if contains_variables(&p) {
                    return Ok(UriPattern::Template(p));
                }
                Regex::new(&p)
                    .map(UriPattern::Compiled)
                    .map_err(|e| ConfigError::invalid_value(KEY, e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }
}

impl SyncRule for UriReRule {
    fn key(&self) -> &str {
        KEY
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        let uri = ctx.uri();
        let variables = ctx.variables();
        for pattern in &self.patterns {
            let matched = match pattern {
                UriPattern::Compiled(re) => re.is_match(&uri),
                UriPattern::Template(template) => {
                    let Some(resolved) = variables.resolve(template) else {
                        continue;
                    };
                    Regex::new(&resolved)
                        .map_err(|e| RuleError::Misconfigured {
                            rule: KEY.to_string(),
                            reason: format!("'{resolved}': {e}"),
                        })?
                        .is_match(&uri)
                }
            };
            if matched {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
