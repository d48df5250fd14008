use std::path::Path;

use aclgate_error::{AclResult, ConfigError, ResultExt};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::block::{Policy, Verbosity};

/// Key under which the settings may be nested in a shared file.
pub const ROOT_KEY: &str = "readonlyrest";
/// Prefix of environment variables overriding file settings, e.g.
/// `ACLGATE__FORBIDDEN_MESSAGE`.
pub const ENV_PREFIX: &str = "ACLGATE";

/// Everything needed to build an ACL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclSettings {
    /// Blocks in evaluation order.
    #[serde(default)]
    pub access_control_rules: Vec<BlockSettings>,
    #[serde(default = "default_forbidden_message")]
    pub forbidden_message: String,
    #[serde(default)]
    pub audit_collector: bool,
    #[serde(default = "default_prompt_for_basic_auth")]
    pub prompt_for_basic_auth: bool,
    /// Services the host must register before the ACL is built.
    #[serde(default)]
    pub external_authentication_service_configs: Vec<DefinitionSettings>,
    #[serde(default)]
    pub user_groups_providers: Vec<DefinitionSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSettings {
    pub name: String,
    #[serde(rename = "type", default)]
    pub policy: Policy,
    #[serde(default)]
    pub verbosity: Verbosity,
    /// Rule key to rule settings.
    #[serde(flatten)]
    pub rules: Map<String, Value>,
}

/// A named external client. Keys other than `name` are left to the host
/// building the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSettings {
    pub name: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl AclSettings {
    /// Reads a YAML, JSON or TOML file, then applies `ACLGATE__*`
    /// environment overrides.
    pub fn load(path: impl AsRef<Path>) -> AclResult<Self> {
        let path = path.as_ref();
        Self::load_file(path)
            .with_context(|| format!("cannot load acl settings from {}", path.display()))
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(source_error)?;
        let value: Value = cfg.try_deserialize().map_err(source_error)?;
        Self::from_value(value)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json).map_err(source_error)?;
        Self::from_value(value)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .map_err(source_error)?;
        let value: Value = cfg.try_deserialize().map_err(source_error)?;
        Self::from_value(value)
    }

    /// Accepts the settings at the top level or nested under
    /// `readonlyrest`. Top-level keys override nested ones.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let value = match value {
            Value::Object(mut root) => match root.remove(ROOT_KEY) {
                Some(Value::Object(mut nested)) => {
                    nested.extend(root);
                    Value::Object(nested)
                }
                Some(_) => {
                    return Err(ConfigError::Source {
                        reason: format!("'{ROOT_KEY}' must be a map"),
                    })
                }
                None => Value::Object(root),
            },
            other => other,
        };
        serde_json::from_value(value).map_err(source_error)
    }
}

impl BlockSettings {
    pub fn new(
        name: impl Into<String>,
        policy: Policy,
    ) -> Self {
        Self {
            name: name.into(),
            policy,
            verbosity: Verbosity::default(),
            rules: Map::new(),
        }
    }

    pub fn verbosity(
        mut self,
        verbosity: Verbosity,
    ) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn rule(
        mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        self.rules.insert(key.into(), value);
        self
    }
}

fn default_forbidden_message() -> String {
    "forbidden".to_string()
}

fn default_prompt_for_basic_auth() -> bool {
    true
}

fn source_error(err: impl std::fmt::Display) -> ConfigError {
    ConfigError::Source {
        reason: err.to_string(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations for AclSettings
////////////////////////////////////////////////////////////////////////////////

impl Default for AclSettings {
    fn default() -> Self {
        Self {
            access_control_rules: Vec::new(),
            forbidden_message: default_forbidden_message(),
            audit_collector: false,
            prompt_for_basic_auth: default_prompt_for_basic_auth(),
            external_authentication_service_configs: Vec::new(),
            user_groups_providers: Vec::new(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
