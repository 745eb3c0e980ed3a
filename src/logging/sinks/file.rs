use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, registry::LookupSpan, Layer};

use crate::logging::config::{LoggingConfig, LoggingError};

/// Файловый слой с ежедневной ротацией.
///
/// Запись идёт через неблокирующий writer; возвращённый guard должен жить
/// столько же, сколько подписчик, иначе хвост буфера теряется.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> Result<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard), LoggingError>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    config.ensure_log_dir()?;
    let appender = rolling::daily(&config.file.dir, &config.file.file_name);
    let (writer, guard) = non_blocking(appender);

    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(config.console.with_target)
        .with_writer(writer);

    Ok((Box::new(layer), guard))
}
