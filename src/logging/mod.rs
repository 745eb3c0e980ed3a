pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig, LoggingError};
pub use handle::{LoggingHandle, LoggingStats};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Устанавливает глобальный подписчик `tracing` по конфигурации.
///
/// `RUST_LOG`, если задана, важнее `config.level`. Повторный вызов в одном
/// процессе возвращает [`LoggingError::Init`].
pub fn init_logging(config: LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    config.validate()?;

    let env_filter = filters::build_filter_from_config(&config);
    let mut layers = Vec::new();

    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(&config));
    }

    let file_guard = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(&config)?;
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        console = config.console.enabled,
        console_format = %config.console.format,
        file = config.file.enabled,
        "logging initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
