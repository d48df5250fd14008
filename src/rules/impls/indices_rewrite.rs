use std::collections::BTreeSet;

use aclgate_error::{ConfigError, RuleError};
use regex::Regex;

use crate::{context::RequestContext, rules::SyncRule};

const KEY: &str = "indices_rewrite";

/// Renames requested indices.
///
/// Settings are regular expressions followed by one replacement, which may
/// use capture groups (`$1`) and variables (`@{user}`). Each pattern
/// rewrites the first occurrence in every index name it matches.
#[derive(Debug, Clone)]
pub struct IndicesRewriteRule {
    targets: Vec<Regex>,
    replacement: String,
}

impl IndicesRewriteRule {
    pub fn new(mut settings: Vec<String>) -> Result<Self, ConfigError> {
        if settings.len() < 2 {
            return Err(ConfigError::invalid_value(
                KEY,
                "expected at least one pattern followed by a replacement",
            ));
        }
        let replacement = settings.pop().unwrap_or_default();
        let targets = settings
            .iter()
            .map(|p| Regex::new(p).map_err(|e| ConfigError::invalid_value(KEY, e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            targets,
            replacement,
        })
    }

    fn rewrite(
        &self,
        ctx: &mut RequestContext,
        replacement: &str,
    ) {
        let requested = ctx.indices();
        let mut old: BTreeSet<String> = if ctx.is_read_request() {
            let available = ctx.all_indices_and_aliases();
            let mut expanded = ctx.expand_indices(&requested);
            // non-existent names are shown to the rewriter as they are
            expanded.extend(requested.iter().filter(|i| !available.contains(*i)).cloned());
            expanded
        } else {
            requested
        };

        let mut renamed = BTreeSet::new();
        for target in &self.targets {
            old.retain(|index| {
                let changed = target.replacen(index, 1, replacement);
                if changed == *index {
                    return true;
                }
                renamed.insert(changed.into_owned());
                false
            });
        }
        old.extend(renamed);

        if old.is_empty() {
            old.insert("*".to_string());
        }
        ctx.set_indices(old);
    }
}

impl SyncRule for IndicesRewriteRule {
    fn key(&self) -> &str {
        KEY
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        if !ctx.involves_indices() && !ctx.has_sub_requests() {
            return Ok(true);
        }
        let Some(replacement) = ctx.variables().resolve(&self.replacement) else {
            return Ok(false);
        };

        if ctx.has_sub_requests() {
            for sub in ctx.sub_contexts_mut() {
                self.rewrite(sub, &replacement);
            }
        } else {
            self.rewrite(ctx, &replacement);
        }
        Ok(true)
    }
}
