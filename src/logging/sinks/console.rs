use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{config::LoggingConfig, formatter};

/// Консольный слой по конфигурации.
pub fn layer_with_config<S>(config: &LoggingConfig) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    formatter::build_formatter_from_config(&config.console)
}

#[cfg(test)]
mod tests {
    use tracing::info;
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;
    use crate::logging::config::LogFormat;

    /// Тест проверяет, что слой строится и регистрируется для всех форматов.
    #[test]
    fn test_layer_for_every_format() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            let mut cfg = LoggingConfig::default();
            cfg.console.format = format;
            cfg.console.with_ansi = false;

            let subscriber = Registry::default().with(layer_with_config::<Registry>(&cfg));
            tracing::subscriber::with_default(subscriber, || {
                info!(%format, "console layer smoke test");
            });
        }
    }
}
