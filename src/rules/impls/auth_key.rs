use aclgate_error::{ConfigError, RuleError};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    context::{LoggedUser, RequestContext},
    rules::{Capabilities, SyncRule},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Plain,
    Sha256,
}

/// Compares Basic credentials against a configured `user:password`, either
/// in clear or as a hex sha256 digest.
#[derive(Debug, Clone)]
pub struct AuthKeyRule {
    key: &'static str,
    encoding: Encoding,
    expected: String,
}

impl AuthKeyRule {
    pub fn plain(credentials: String) -> Result<Self, ConfigError> {
        if !credentials.contains(':') {
            return Err(ConfigError::invalid_value(
                "auth_key",
                "expected 'user:password'",
            ));
        }
        Ok(Self {
            key: "auth_key",
            encoding: Encoding::Plain,
            expected: credentials,
        })
    }

    pub fn sha256(digest: String) -> Result<Self, ConfigError> {
        let digest = digest.trim().to_ascii_lowercase();
        if digest.len() != 64 || hex::decode(&digest).is_err() {
            return Err(ConfigError::invalid_value(
                "auth_key_sha256",
                "expected a hex encoded sha256 digest",
            ));
        }
        Ok(Self {
            key: "auth_key_sha256",
            encoding: Encoding::Sha256,
            expected: digest,
        })
    }

    fn presented(
        &self,
        credentials: &str,
    ) -> String {
        match self.encoding {
            Encoding::Plain => credentials.to_string(),
            Encoding::Sha256 => hex::encode(Sha256::digest(credentials.as_bytes())),
        }
    }
}

impl SyncRule for AuthKeyRule {
    fn key(&self) -> &str {
        self.key
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::AUTHENTICATION
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        let Some(auth) = ctx.basic_auth() else {
            return Ok(false);
        };
        if self.presented(&auth.colon_separated()) != self.expected {
            debug!(rule = self.key, user = %auth.user, "credentials rejected");
            return Ok(false);
        }
        ctx.set_logged_user(LoggedUser::new(auth.user));
        Ok(true)
    }
}
