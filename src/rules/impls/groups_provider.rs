use std::{collections::BTreeSet, sync::Arc, time::Duration};

use aclgate_error::{ConfigError, RuleError};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{
    context::{RequestContext, CURRENT_GROUP_HEADER},
    definitions::{Definitions, GroupsProvider},
    rules::{
        factory::{cache_ttl, string, string_list},
        Capabilities, Rule, RuleExitResult,
    },
};

const KEY: &str = "groups_provider_authorization";

/// Lets the logged user in when a groups provider puts it in one of the
/// configured groups.
pub struct GroupsProviderAuthorizationRule {
    provider: Arc<dyn GroupsProvider>,
    groups: BTreeSet<String>,
}

impl GroupsProviderAuthorizationRule {
    pub fn new(
        provider: Arc<dyn GroupsProvider>,
        groups: BTreeSet<String>,
    ) -> Self {
        Self { provider, groups }
    }

    /// Reads `{user_groups_provider, groups, cache_ttl_in_sec}`.
    pub fn from_settings(
        value: &Value,
        definitions: &Definitions,
    ) -> Result<(Self, Duration), ConfigError> {
        let provider = value
            .get("user_groups_provider")
            .ok_or_else(|| ConfigError::invalid_value(KEY, "missing 'user_groups_provider'"))?;
        let groups = value
            .get("groups")
            .ok_or_else(|| ConfigError::invalid_value(KEY, "missing 'groups'"))?;
        let groups: BTreeSet<String> = string_list(KEY, groups)?.into_iter().collect();
        if groups.is_empty() {
            return Err(ConfigError::invalid_value(KEY, "'groups' must not be empty"));
        }
        let provider = definitions.groups_provider(&string(KEY, provider)?)?;
        Ok((Self::new(provider, groups), cache_ttl(KEY, value)?))
    }
}

#[async_trait]
impl Rule for GroupsProviderAuthorizationRule {
    fn key(&self) -> &str {
        KEY
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::AUTHORIZATION
    }

    async fn check(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<RuleExitResult, RuleError> {
        let Some(mut user) = ctx.logged_user() else {
            return Ok(RuleExitResult::no_match(KEY));
        };

        let fetched = self.provider.groups_of(&user).await?;
        let granted: BTreeSet<String> = fetched.intersection(&self.groups).cloned().collect();
        debug!(user = %user.id, provider = self.provider.name(), ?granted, "groups resolved");
        if granted.is_empty() {
            return Ok(RuleExitResult::no_match(KEY));
        }

        let requested = ctx.header(CURRENT_GROUP_HEADER).map(str::to_string);
        user.current_group = match requested {
            Some(group) if granted.contains(&group) => Some(group),
            Some(_) => return Ok(RuleExitResult::no_match(KEY)),
            None => granted.iter().next().cloned(),
        };
        user.available_groups = granted;
        ctx.set_logged_user(user);
        Ok(RuleExitResult::matched(KEY))
    }
}
