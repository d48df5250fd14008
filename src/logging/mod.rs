pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

use aclgate_error::ConfigError;
pub use config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig};
pub use handle::{LoggingHandle, LoggingStats};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber.
///
/// `ACLGATE_LOG_*` variables override `config`, and `RUST_LOG` overrides
/// the level filter. Fails if a global subscriber is already set.
pub fn init_logging(mut config: LoggingConfig) -> Result<LoggingHandle, ConfigError> {
    config.apply_env_overrides();
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(&config);
    let mut layers = Vec::new();

    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(&config));
    }

    let file_guard = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(&config);
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| ConfigError::Source {
            reason: format!("cannot install log subscriber: {e}"),
        })?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        console = config.console.enabled,
        file = config.file.enabled,
        "logging initialized"
    );
    Ok(LoggingHandle::new(file_guard))
}
