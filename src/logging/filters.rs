use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

/// Строит фильтр: `RUST_LOG`, если задана, иначе директива из конфигурации.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::try_new(config.build_filter_directive())
            .unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        sync::{Arc, Mutex},
    };

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    // Мини-буферный writer для тестов
    #[derive(Clone)]
    struct VecMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for VecMakeWriter {
        type Writer = VecWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            VecWriterGuard(self.0.clone())
        }
    }

    struct VecWriterGuard(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriterGuard {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture(filter: EnvFilter) -> String {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(VecMakeWriter(buffer.clone()))
            .with_filter(filter);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("info message");
            tracing::warn!("warn message");
        });
        let out = buffer.lock().unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Тест проверяет, что без RUST_LOG используется уровень из конфигурации.
    #[test]
    #[serial]
    fn test_config_level_without_env() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "warn".into(),
            ..Default::default()
        };
        let out = capture(build_filter_from_config(&cfg));
        assert!(out.contains("warn message"));
        assert!(!out.contains("info message"));
    }

    /// Тест проверяет, что RUST_LOG важнее конфигурации.
    #[test]
    #[serial]
    fn test_env_overrides_config() {
        env::set_var("RUST_LOG", "info");
        let cfg = LoggingConfig {
            level: "error".into(),
            ..Default::default()
        };
        let out = capture(build_filter_from_config(&cfg));
        env::remove_var("RUST_LOG");
        assert!(out.contains("info message"));
    }

    #[test]
    #[serial]
    fn test_invalid_directive_falls_back_to_info() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            directive: Some("this_is_invalid_directive!!=".into()),
            ..Default::default()
        };
        let out = capture(build_filter_from_config(&cfg));
        assert!(out.contains("info message"));
    }
}
