use std::{env, fs, path::PathBuf, str::FromStr};

use aclgate_error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

/// Environment variables read by [`LoggingConfig::apply_env_overrides`].
pub const ENV_LOG_LEVEL: &str = "ACLGATE_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "ACLGATE_LOG_FORMAT";
pub const ENV_LOG_DIR: &str = "ACLGATE_LOG_DIR";
pub const ENV_LOG_FILE: &str = "ACLGATE_LOG_FILE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

/// Logging setup for hosts embedding the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Extra `target=level` directives appended to the filter.
    pub directives: Vec<String>,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

/// Daily rotated log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub filename: String,
    pub format: LogFormat,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl LoggingConfig {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            self.level = level.to_lowercase();
        }
        if let Some(format) = env::var(ENV_LOG_FORMAT).ok().and_then(|f| f.parse().ok()) {
            self.console.format = format;
        }
        if let Ok(dir) = env::var(ENV_LOG_DIR) {
            self.file.dir = PathBuf::from(dir);
            self.file.enabled = true;
        }
        if let Ok(flag) = env::var(ENV_LOG_FILE) {
            self.file.enabled = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.level_filter()?;
        if self.file.enabled && self.file.filename.trim().is_empty() {
            return Err(ConfigError::Source {
                reason: "log file name is empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn ensure_log_dir(&self) -> Result<(), ConfigError> {
        if !self.file.enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.file.dir).map_err(|e| ConfigError::Source {
            reason: format!("cannot create log dir {}: {e}", self.file.dir.display()),
        })
    }

    /// `level` as a filter: `off`, `error` through `trace`, or `0`..`5`.
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.level.trim().parse().map_err(|e| ConfigError::Source {
            reason: format!("unknown log level '{}': {e}", self.level),
        })
    }

    /// The level (`info` when it does not parse) followed by the extra
    /// directives.
    pub fn build_filter_directive(&self) -> String {
        let level = self.level_filter().unwrap_or(LevelFilter::INFO);
        let mut directive = level.to_string();
        for extra in &self.directives {
            directive.push(',');
            directive.push_str(extra);
        }
        directive
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(ConfigError::Source {
                reason: format!("unknown log format '{other}'"),
            }),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations for defaults
////////////////////////////////////////////////////////////////////////////////

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Compact,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("logs"),
            filename: "aclgate.log".to_string(),
            format: LogFormat::Json,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
