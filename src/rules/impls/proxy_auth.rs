use aclgate_error::{ConfigError, RuleError};
use serde_json::Value;

use crate::{
    context::{LoggedUser, RequestContext},
    matcher::WildcardMatcher,
    rules::{factory::string_list, Capabilities, SyncRule},
};

pub const DEFAULT_USER_HEADER: &str = "X-Forwarded-User";

/// Trusts the user name an authenticating proxy put in a header.
#[derive(Debug, Clone)]
pub struct ProxyAuthRule {
    header: String,
    users: WildcardMatcher,
}

impl ProxyAuthRule {
    pub fn new(
        header: impl Into<String>,
        users: Vec<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            header: header.into(),
            users: WildcardMatcher::new(users)?,
        })
    }

    /// Accepts a user list, or `{users, user_id_header}`.
    pub fn from_settings(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(map) => {
                let users = map
                    .get("users")
                    .ok_or_else(|| ConfigError::invalid_value("proxy_auth", "missing 'users'"))?;
                let header = match map.get("user_id_header") {
                    Some(Value::String(h)) => h.clone(),
                    Some(_) => {
                        return Err(ConfigError::invalid_value(
                            "proxy_auth",
                            "'user_id_header' must be a string",
                        ))
                    }
                    None => DEFAULT_USER_HEADER.to_string(),
                };
                Self::new(header, string_list("proxy_auth", users)?)
            }
            other => Self::new(DEFAULT_USER_HEADER, string_list("proxy_auth", other)?),
        }
    }
}

impl SyncRule for ProxyAuthRule {
    fn key(&self) -> &str {
        "proxy_auth"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::AUTHENTICATION
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        let Some(user) = ctx.header(&self.header).map(str::to_string) else {
            return Ok(false);
        };
        if user.is_empty() || !self.users.is_match(&user) {
            return Ok(false);
        }
        ctx.set_logged_user(LoggedUser::new(user));
        Ok(true)
    }
}
