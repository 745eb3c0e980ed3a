use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    database::{
        BloomOptions, CuckooOptions, DEFAULT_MIN_NODE_SIZE, MAX_MIN_NODE_SIZE,
    },
    logging::LoggingConfig,
};

/// Префикс переменных окружения: `ZKV_BLOOM__CAPACITY=5000`.
pub const ENV_PREFIX: &str = "ZKV";
/// Разделитель вложенных ключей в переменных окружения.
pub const ENV_SEPARATOR: &str = "__";

/// Ошибки загрузки настроек.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DequeSettings {
    /// Минимальная ёмкость узла сегментированной очереди в байтах
    pub min_node_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CmsSettings {
    pub error_rate: f64,
    /// Вероятность превысить оценку ошибки
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpirySettings {
    /// Сколько ключей со сроком проверяет один проход активной чистки
    pub sweep_limit: usize,
}

/// Настройки движка: параметры структур по умолчанию и логирование.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub deque: DequeSettings,
    pub bloom: BloomOptions,
    pub cuckoo: CuckooOptions,
    pub cms: CmsSettings,
    pub expiry: ExpirySettings,
    pub logging: LoggingConfig,
}

impl Default for DequeSettings {
    fn default() -> Self {
        Self {
            min_node_size: DEFAULT_MIN_NODE_SIZE,
        }
    }
}

impl Default for CmsSettings {
    fn default() -> Self {
        Self {
            error_rate: 0.01,
            probability: 0.01,
        }
    }
}

impl Default for ExpirySettings {
    fn default() -> Self {
        Self { sweep_limit: 20 }
    }
}

impl EngineSettings {
    /// Значения по умолчанию, поверх них переменные окружения `ZKV_*`.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(None)
    }

    /// Как [`EngineSettings::load`], но с файлом между умолчаниями и
    /// окружением. Формат файла определяется по расширению.
    pub fn load_from(file: Option<&Path>) -> Result<Self, SettingsError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("deque.min_node_size", defaults.deque.min_node_size as u64)?
            .set_default("bloom.error_rate", defaults.bloom.error_rate)?
            .set_default("bloom.capacity", defaults.bloom.capacity)?
            .set_default("cuckoo.capacity", defaults.cuckoo.capacity)?
            .set_default("cuckoo.bucket_size", u64::from(defaults.cuckoo.bucket_size))?
            .set_default("cuckoo.max_iterations", u64::from(defaults.cuckoo.max_iterations))?
            .set_default("cuckoo.expansion", u64::from(defaults.cuckoo.expansion))?
            .set_default("cms.error_rate", defaults.cms.error_rate)?
            .set_default("cms.probability", defaults.cms.probability)?
            .set_default("expiry.sweep_limit", defaults.expiry.sweep_limit as u64)?
            .set_default("logging.level", defaults.logging.level.as_str())?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Отвергает значения, с которыми структуры не создадутся.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |key, reason: String| SettingsError::Invalid { key, reason };

        if self.deque.min_node_size == 0 || self.deque.min_node_size > MAX_MIN_NODE_SIZE {
            return Err(invalid(
                "deque.min_node_size",
                format!("must be in 1..={MAX_MIN_NODE_SIZE}"),
            ));
        }
        self.bloom
            .validate()
            .map_err(|e| invalid("bloom", e.to_string()))?;
        self.cuckoo
            .validate()
            .map_err(|e| invalid("cuckoo", e.to_string()))?;
        for (key, rate) in [
            ("cms.error_rate", self.cms.error_rate),
            ("cms.probability", self.cms.probability),
        ] {
            if !(rate > 0.0 && rate < 1.0) {
                return Err(invalid(key, format!("must be in (0, 1), got {rate}")));
            }
        }
        if self.expiry.sweep_limit == 0 {
            return Err(invalid("expiry.sweep_limit", "must be positive".into()));
        }
        self.logging
            .validate()
            .map_err(|e| invalid("logging", e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{env, io::Write};

    use serial_test::serial;

    use super::*;

    /// Тест проверяет, что значения по умолчанию проходят проверку.
    #[test]
    fn test_defaults_are_valid() {
        let s = EngineSettings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.deque.min_node_size, 256);
        assert_eq!(s.cuckoo.bucket_size, 2);
        assert_eq!(s.expiry.sweep_limit, 20);
    }

    #[test]
    fn test_validate_rejects() {
        let mut s = EngineSettings::default();
        s.deque.min_node_size = 0;
        assert!(matches!(
            s.validate(),
            Err(SettingsError::Invalid {
                key: "deque.min_node_size",
                ..
            })
        ));

        let mut s = EngineSettings::default();
        s.cms.probability = 1.0;
        assert!(s.validate().is_err());

        let mut s = EngineSettings::default();
        s.bloom.capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        let s = EngineSettings::load().unwrap();
        assert_eq!(s, EngineSettings::default());
    }

    /// Тест проверяет переопределение через переменные окружения.
    #[test]
    #[serial]
    fn test_load_env_override() {
        env::set_var("ZKV_BLOOM__CAPACITY", "5000");
        env::set_var("ZKV_DEQUE__MIN_NODE_SIZE", "64");
        let loaded = EngineSettings::load();
        env::remove_var("ZKV_BLOOM__CAPACITY");
        env::remove_var("ZKV_DEQUE__MIN_NODE_SIZE");

        let s = loaded.unwrap();
        assert_eq!(s.bloom.capacity, 5000);
        assert_eq!(s.deque.min_node_size, 64);
        assert_eq!(s.bloom.error_rate, 0.01);
    }

    #[test]
    #[serial]
    fn test_load_invalid_env_is_rejected() {
        env::set_var("ZKV_CMS__ERROR_RATE", "2.5");
        let loaded = EngineSettings::load();
        env::remove_var("ZKV_CMS__ERROR_RATE");
        assert!(matches!(loaded, Err(SettingsError::Invalid { .. })));
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[cuckoo]\ncapacity = 4096\nbucket_size = 4\n[expiry]\nsweep_limit = 50").unwrap();

        let s = EngineSettings::load_from(Some(file.path())).unwrap();
        assert_eq!(s.cuckoo.capacity, 4096);
        assert_eq!(s.cuckoo.bucket_size, 4);
        assert_eq!(s.cuckoo.max_iterations, 20);
        assert_eq!(s.expiry.sweep_limit, 50);
    }
}
