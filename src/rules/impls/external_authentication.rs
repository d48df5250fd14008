use std::{sync::Arc, time::Duration};

use aclgate_error::{ConfigError, RuleError};
use async_trait::async_trait;
use serde_json::Value;

use crate::{
    context::{LoggedUser, RequestContext},
    definitions::{Definitions, ExternalAuthenticationService},
    rules::{
        factory::{cache_ttl, string},
        Capabilities, Rule, RuleExitResult,
    },
};

const KEY: &str = "external_authentication";

/// Hands Basic credentials to a named external authentication service.
pub struct ExternalAuthenticationRule {
    service: Arc<dyn ExternalAuthenticationService>,
}

impl ExternalAuthenticationRule {
    pub fn new(service: Arc<dyn ExternalAuthenticationService>) -> Self {
        Self { service }
    }

    /// Accepts a service name, or `{service, cache_ttl_in_sec}`. Returns the
    /// rule with its cache TTL.
    pub fn from_settings(
        value: &Value,
        definitions: &Definitions,
    ) -> Result<(Self, Duration), ConfigError> {
        let (name, ttl) = match value {
            Value::Object(map) => {
                let name = map
                    .get("service")
                    .ok_or_else(|| ConfigError::invalid_value(KEY, "missing 'service'"))?;
                (string(KEY, name)?, cache_ttl(KEY, value)?)
            }
            other => (string(KEY, other)?, Duration::ZERO),
        };
        let service = definitions.authentication_service(&name)?;
        Ok((Self::new(service), ttl))
    }
}

#[async_trait]
impl Rule for ExternalAuthenticationRule {
    fn key(&self) -> &str {
        KEY
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::AUTHENTICATION
    }

    async fn check(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<RuleExitResult, RuleError> {
        let Some(auth) = ctx.basic_auth() else {
            return Ok(RuleExitResult::no_match(KEY));
        };
        if !self.service.authenticate(&auth).await? {
            return Ok(RuleExitResult::no_match(KEY));
        }
        ctx.set_logged_user(LoggedUser::new(auth.user));
        Ok(RuleExitResult::matched(KEY))
    }
}
