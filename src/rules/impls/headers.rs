use std::collections::HashSet;

use aclgate_error::{ConfigError, RuleError};

use crate::{context::RequestContext, matcher::WildcardMatcher, rules::SyncRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadersMode {
    /// Every configured header must be present with a matching value.
    All,
    /// One matching header is enough.
    Any,
}

#[derive(Debug, Clone)]
struct HeaderRequirement {
    name: String,
    value: WildcardMatcher,
}

/// Requires request headers given as `name:value` pairs. Names are
/// case-insensitive, values are wildcard patterns.
#[derive(Debug, Clone)]
pub struct HeadersRule {
    key: String,
    mode: HeadersMode,
    required: Vec<HeaderRequirement>,
}

impl HeadersRule {
    pub fn new(
        key: &str,
        mode: HeadersMode,
        entries: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut required = Vec::with_capacity(entries.len());
        for entry in &entries {
            let (name, value) = entry.split_once(':').ok_or_else(|| {
                ConfigError::invalid_value(key, format!("'{entry}' is not a 'name:value' pair"))
            })?;
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                let reason = format!("'{entry}' has no header name");
                return Err(ConfigError::invalid_value(key, reason));
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::invalid_value(
                    key,
                    format!("header '{name}' is configured more than once"),
                ));
            }
            required.push(HeaderRequirement {
                name,
                value: WildcardMatcher::new([value.trim()])?,
            });
        }
        if required.is_empty() {
            return Err(ConfigError::invalid_value(key, "no headers configured"));
        }
        Ok(Self {
            key: key.to_string(),
            mode,
            required,
        })
    }
}

impl SyncRule for HeadersRule {
    fn key(&self) -> &str {
        &self.key
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        let satisfied = |req: &HeaderRequirement| {
            ctx.header(&req.name)
                .is_some_and(|value| req.value.is_match(value))
        };
        Ok(match self.mode {
            HeadersMode::All => self.required.iter().all(satisfied),
            HeadersMode::Any => self.required.iter().any(satisfied),
        })
    }
}
