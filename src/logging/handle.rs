use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tracing_appender::non_blocking::WorkerGuard;

/// Счётчики жизненного цикла логирования.
#[derive(Debug, Default)]
pub struct LoggingMetrics {
    pub flush_count: AtomicU64,
    pub shutdown_in_progress: AtomicBool,
}

/// Снимок [`LoggingMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingStats {
    pub flush_count: u64,
    pub shutdown_in_progress: bool,
    pub file_sink: bool,
}

/// Handle, удерживающий guard файлового слоя.
///
/// Пока handle жив, фоновый writer `tracing-appender` продолжает сбрасывать
/// буфер. [`LoggingHandle::shutdown`] отпускает guard и дожидается сброса.
#[derive(Debug)]
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    pub metrics: Arc<LoggingMetrics>,
    flush_timeout: Duration,
}

impl LoggingMetrics {
    pub fn record_flush(&self) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count.load(Ordering::Relaxed)
    }

    pub fn is_shutdown_in_progress(&self) -> bool {
        self.shutdown_in_progress.load(Ordering::Acquire)
    }

    fn start_shutdown(&self) {
        self.shutdown_in_progress.store(true, Ordering::Release);
    }
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            metrics: Arc::new(LoggingMetrics::default()),
            flush_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_flush_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Отмечает запрос на сброс; сам сброс выполняет фоновый writer.
    pub fn flush(&self) {
        self.metrics.record_flush();
        tracing::debug!(flush_count = self.metrics.flush_count(), "logging flush requested");
    }

    /// Отпускает guard файлового слоя, дожидаясь записи буфера.
    pub fn shutdown(mut self) -> Duration {
        self.metrics.start_shutdown();
        tracing::info!(
            total_flushes = self.metrics.flush_count(),
            file_sink = self.has_file_sink(),
            "logging shutdown"
        );

        let start = Instant::now();
        drop(self.file_guard.take());
        let elapsed = start.elapsed();

        if elapsed > self.flush_timeout {
            eprintln!(
                "WARNING: logging shutdown took {}ms (timeout: {}ms)",
                elapsed.as_millis(),
                self.flush_timeout.as_millis()
            );
        }
        elapsed
    }

    pub fn stats(&self) -> LoggingStats {
        LoggingStats {
            flush_count: self.metrics.flush_count(),
            shutdown_in_progress: self.metrics.is_shutdown_in_progress(),
            file_sink: self.has_file_sink(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_counts() {
        let handle = LoggingHandle::new(None);
        handle.flush();
        handle.flush();
        assert_eq!(
            handle.stats(),
            LoggingStats {
                flush_count: 2,
                shutdown_in_progress: false,
                file_sink: false,
            }
        );
    }

    #[test]
    fn test_shutdown_marks_metrics() {
        let handle = LoggingHandle::new(None).with_flush_timeout(Duration::from_millis(10));
        let metrics = handle.metrics.clone();
        handle.shutdown();
        assert!(metrics.is_shutdown_in_progress());
    }
}
