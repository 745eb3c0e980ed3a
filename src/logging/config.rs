use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Уровни, которые принимает `LoggingConfig::level`.
pub const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Формат консольного вывода.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

/// Ошибки настройки логирования.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unknown log level '{0}', expected one of trace/debug/info/warn/error")]
    InvalidLevel(String),
    #[error("invalid filter directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },
    #[error("file sink requires a non-empty file name")]
    EmptyFileName,
    #[error("cannot create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("global subscriber already installed: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Настройки консольного слоя.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

/// Настройки файлового слоя (ежедневная ротация).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub file_name: String,
}

/// Конфигурация логирования движка.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень: trace, debug, info, warn или error
    pub level: String,
    /// Дополнительные директивы `EnvFilter`, например `zkv::engine=trace`
    pub directive: Option<String>,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::default(),
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
            file_name: "zkv.log".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directive: None,
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), LoggingError> {
        let level = self.level.to_ascii_lowercase();
        if !LEVELS.contains(&level.as_str()) {
            return Err(LoggingError::InvalidLevel(self.level.clone()));
        }
        if self.file.enabled && self.file.file_name.trim().is_empty() {
            return Err(LoggingError::EmptyFileName);
        }
        let directive = self.build_filter_directive();
        EnvFilter::try_new(&directive).map_err(|e| LoggingError::InvalidDirective {
            directive,
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Директива фильтра: уровень и, через запятую, дополнительные правила.
    pub fn build_filter_directive(&self) -> String {
        let level = self.level.to_ascii_lowercase();
        match self.directive.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => format!("{level},{extra}"),
            _ => level,
        }
    }

    /// Создаёт каталог файлового слоя, если он включён.
    pub fn ensure_log_dir(&self) -> Result<(), LoggingError> {
        if !self.file.enabled {
            return Ok(());
        }
        std::fs::create_dir_all(&self.file.dir).map_err(|source| LoggingError::CreateDir {
            path: self.file.dir.clone(),
            source,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для LogFormat
////////////////////////////////////////////////////////////////////////////////

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
