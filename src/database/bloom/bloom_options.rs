use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_ERROR_RATE: f64 = 0.01;
pub const BLOOM_DEFAULT_CAPACITY: u64 = 1024;

/// Параметры создания Bloom-фильтра (`BF.RESERVE`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomOptions {
    /// Допустимая доля ложноположительных ответов, строго между 0 и 1
    pub error_rate: f64,
    /// Ожидаемое число элементов
    pub capacity: u64,
}

/// Сводка `BF.INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BloomInfo {
    pub capacity: u64,
    /// Размер битового массива в битах
    pub size: u64,
    /// Количество хеш-функций
    pub hash_functions: usize,
    pub items_inserted: u64,
    pub expansion_rate: u32,
}

impl BloomOptions {
    pub fn new(
        error_rate: f64,
        capacity: u64,
    ) -> EngineResult<Self> {
        let opts = Self {
            error_rate,
            capacity,
        };
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.error_rate > 0.0 && self.error_rate < 1.0) {
            return Err(EngineError::invalid(format!(
                "bloom error rate must be in (0, 1), got {}",
                self.error_rate
            )));
        }
        if self.capacity == 0 {
            return Err(EngineError::invalid("bloom capacity must be positive"));
        }
        Ok(())
    }
}

impl Default for BloomOptions {
    fn default() -> Self {
        Self {
            error_rate: DEFAULT_ERROR_RATE,
            capacity: BLOOM_DEFAULT_CAPACITY,
        }
    }
}
