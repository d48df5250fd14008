use std::{sync::Arc, time::Duration};

use aclgate_error::ConfigError;
use serde_json::{Map, Value};

use super::{
    impls::{
        actions::ActionsRule,
        auth_key::AuthKeyRule,
        external_authentication::ExternalAuthenticationRule,
        groups_provider::GroupsProviderAuthorizationRule,
        headers::{HeadersMode, HeadersRule},
        hosts::{HostsRule, ACCEPT_X_FORWARDED_FOR},
        indices::IndicesRule,
        indices_rewrite::IndicesRewriteRule,
        max_body_length::MaxBodyLengthRule,
        methods::MethodsRule,
        proxy_auth::ProxyAuthRule,
        uri_re::UriReRule,
        users::UsersRule,
        x_forwarded_for::XForwardedForRule,
    },
    sort_rules, wrap_in_cache_if_enabled, LoggingRule, Rule, SyncRuleAdapter,
};
use crate::definitions::Definitions;

/// Keys that tune another rule instead of defining one.
const MODIFIER_KEYS: &[&str] = &[ACCEPT_X_FORWARDED_FOR];

/// Builds one rule from its settings key and value.
///
/// `siblings` holds the other rule settings of the same block, for rules
/// tuned by modifier keys.
pub fn build_rule(
    key: &str,
    value: &Value,
    siblings: &Map<String, Value>,
    definitions: &Definitions,
) -> Result<Arc<dyn Rule>, ConfigError> {
    let rule: Arc<dyn Rule> = match key {
        "auth_key" => Arc::new(SyncRuleAdapter::new(AuthKeyRule::plain(string(key, value)?)?)),
        "auth_key_sha256" => {
            Arc::new(SyncRuleAdapter::new(AuthKeyRule::sha256(string(key, value)?)?))
        }
        "proxy_auth" => Arc::new(SyncRuleAdapter::new(ProxyAuthRule::from_settings(value)?)),
        "external_authentication" => {
            let (rule, ttl) = ExternalAuthenticationRule::from_settings(value, definitions)?;
            wrap_in_cache_if_enabled(LoggingRule::wrap(Arc::new(rule)), ttl)
        }
        "groups_provider_authorization" => {
            let (rule, ttl) = GroupsProviderAuthorizationRule::from_settings(value, definitions)?;
            wrap_in_cache_if_enabled(LoggingRule::wrap(Arc::new(rule)), ttl)
        }
        "hosts" => {
            let accept_xff = match siblings.get(ACCEPT_X_FORWARDED_FOR) {
                Some(v) => boolean(ACCEPT_X_FORWARDED_FOR, v)?,
                None => false,
            };
            Arc::new(SyncRuleAdapter::new(HostsRule::new(
                string_list(key, value)?,
                accept_xff,
            )))
        }
        "x_forwarded_for" => Arc::new(SyncRuleAdapter::new(XForwardedForRule::new(
            string_list(key, value)?,
        ))),
        "methods" => Arc::new(SyncRuleAdapter::new(MethodsRule::new(string_list(key, value)?))),
        "headers" | "headers_and" => Arc::new(SyncRuleAdapter::new(HeadersRule::new(
            key,
            HeadersMode::All,
            string_list(key, value)?,
        )?)),
        "headers_or" => Arc::new(SyncRuleAdapter::new(HeadersRule::new(
            key,
            HeadersMode::Any,
            string_list(key, value)?,
        )?)),
        "uri_re" => Arc::new(SyncRuleAdapter::new(UriReRule::new(string_list(key, value)?)?)),
        // some settings sources lowercase keys
        "maxBodyLength" | "maxbodylength" => Arc::new(SyncRuleAdapter::new(
            MaxBodyLengthRule::new(unsigned(key, value)?),
        )),
        "indices" => Arc::new(SyncRuleAdapter::new(IndicesRule::new(string_list(key, value)?)?)),
        "indices_rewrite" => Arc::new(SyncRuleAdapter::new(IndicesRewriteRule::new(
            string_list(key, value)?,
        )?)),
        "actions" => Arc::new(SyncRuleAdapter::new(ActionsRule::new(string_list(key, value)?)?)),
        "users" => Arc::new(SyncRuleAdapter::new(UsersRule::new(string_list(key, value)?)?)),
        other => {
            return Err(ConfigError::UnknownRule {
                block: String::new(),
                rule: other.to_string(),
            })
        }
    };
    Ok(rule)
}

/// Builds and orders every rule of a block.
pub fn build_block_rules(
    block: &str,
    rules: &Map<String, Value>,
    definitions: &Definitions,
) -> Result<Vec<Arc<dyn Rule>>, ConfigError> {
    let mut built = Vec::with_capacity(rules.len());
    for (key, value) in rules {
        if MODIFIER_KEYS.contains(&key.as_str()) {
            continue;
        }
        let rule = build_rule(key, value, rules, definitions).map_err(|e| match e {
            ConfigError::UnknownRule { rule, .. } => ConfigError::UnknownRule {
                block: block.to_string(),
                rule,
            },
            other => ConfigError::InvalidBlock {
                block: block.to_string(),
                reason: other.to_string(),
            },
        })?;
        built.push(rule);
    }
    sort_rules(&mut built);
    Ok(built)
}

////////////////////////////////////////////////////////////////////////////////
// Settings value helpers
////////////////////////////////////////////////////////////////////////////////

pub(crate) fn string(
    rule: &str,
    value: &Value,
) -> Result<String, ConfigError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ConfigError::invalid_value(
            rule,
            format!("expected a string, got {other}"),
        )),
    }
}

/// Accepts a single string or a list of strings.
pub(crate) fn string_list(
    rule: &str,
    value: &Value,
) -> Result<Vec<String>, ConfigError> {
    match value {
        Value::Array(items) => items.iter().map(|item| string(rule, item)).collect(),
        single => Ok(vec![string(rule, single)?]),
    }
}

pub(crate) fn boolean(
    rule: &str,
    value: &Value,
) -> Result<bool, ConfigError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(ConfigError::invalid_value(
            rule,
            format!("expected a boolean, got {other}"),
        )),
    }
}

pub(crate) fn unsigned(
    rule: &str,
    value: &Value,
) -> Result<u64, ConfigError> {
    let invalid = |got: String| {
        ConfigError::invalid_value(rule, format!("expected a non-negative integer, got {got}"))
    };
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| invalid(n.to_string())),
        Value::String(s) => s.trim().parse().map_err(|_| invalid(format!("'{s}'"))),
        other => Err(invalid(other.to_string())),
    }
}

/// Reads `cache_ttl_in_sec` from an object value; zero when absent.
pub(crate) fn cache_ttl(
    rule: &str,
    value: &Value,
) -> Result<Duration, ConfigError> {
    match value.get("cache_ttl_in_sec") {
        Some(v) => Ok(Duration::from_secs(unsigned(rule, v)?)),
        None => Ok(Duration::ZERO),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
