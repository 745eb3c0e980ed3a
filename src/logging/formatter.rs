use std::io::{self, Stdout};

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::Layer as LayerTrait,
    registry::LookupSpan,
};

use crate::logging::config::{ConsoleConfig, LogFormat};

/// Консольный fmt-слой нужного формата.
///
/// Слой возвращается упакованным, чтобы стереть конкретный тип формата.
pub fn build_formatter_from_config<S>(
    console: &ConsoleConfig
) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let writer: fn() -> Stdout = io::stdout;
    let base = fmt::layer()
        .with_writer(writer)
        .with_ansi(console.with_ansi)
        .with_target(console.with_target)
        .with_thread_ids(console.with_thread_ids)
        .with_line_number(console.with_line_numbers);

    match console.format {
        LogFormat::Json => Box::new(base.json().with_current_span(true)),
        LogFormat::Pretty => Box::new(base.pretty().with_span_events(FmtSpan::CLOSE)),
        LogFormat::Compact => Box::new(base.compact()),
    }
}
