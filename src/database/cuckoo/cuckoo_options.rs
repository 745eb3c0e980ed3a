use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const CUCKOO_DEFAULT_CAPACITY: u64 = 1000;
pub const DEFAULT_BUCKET_SIZE: u8 = 2;
pub const DEFAULT_MAX_ITERATIONS: u16 = 20;
pub const DEFAULT_EXPANSION: u16 = 1;

/// Наибольший допустимый коэффициент расширения.
pub const MAX_EXPANSION: u64 = 32_768;

/// Параметры `CF.RESERVE`.
///
/// `max_iterations` и `expansion` хранятся и возвращаются в `CF.INFO`;
/// предел случайного блуждания при вытеснении фиксирован.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuckooOptions {
    pub capacity: u64,
    pub bucket_size: u8,
    pub max_iterations: u16,
    pub expansion: u16,
}

/// Сводка `CF.INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CuckooInfo {
    /// Размер таблицы отпечатков в байтах
    pub size: u64,
    pub number_of_buckets: u64,
    pub number_of_filters: u32,
    pub items_inserted: u64,
    pub items_deleted: u64,
    pub bucket_size: u8,
    pub expansion_rate: u16,
    pub max_iterations: u16,
}

impl CuckooOptions {
    /// Проверяет параметры, пришедшие из команды или конфигурации.
    pub fn new(
        capacity: u64,
        bucket_size: u64,
        max_iterations: u64,
        expansion: u64,
    ) -> EngineResult<Self> {
        if capacity == 0 {
            return Err(EngineError::invalid("cuckoo capacity must be positive"));
        }
        let bucket_size = u8::try_from(bucket_size)
            .ok()
            .filter(|&b| b >= 1)
            .ok_or_else(|| {
                EngineError::invalid(format!("cuckoo bucket size must be in 1..=255, got {bucket_size}"))
            })?;
        let max_iterations = u16::try_from(max_iterations)
            .ok()
            .filter(|&m| m >= 1)
            .ok_or_else(|| {
                EngineError::invalid(format!(
                    "cuckoo max iterations must be in 1..=65535, got {max_iterations}"
                ))
            })?;
        if expansion > MAX_EXPANSION {
            return Err(EngineError::invalid(format!(
                "cuckoo expansion must not exceed {MAX_EXPANSION}, got {expansion}"
            )));
        }
        Ok(Self {
            capacity,
            bucket_size,
            max_iterations,
            expansion: expansion as u16,
        })
    }

    pub fn with_capacity(capacity: u64) -> EngineResult<Self> {
        Self::new(
            capacity,
            DEFAULT_BUCKET_SIZE as u64,
            DEFAULT_MAX_ITERATIONS as u64,
            DEFAULT_EXPANSION as u64,
        )
    }

    pub fn validate(&self) -> EngineResult<()> {
        Self::new(
            self.capacity,
            self.bucket_size as u64,
            self.max_iterations as u64,
            self.expansion as u64,
        )
        .map(|_| ())
    }
}

impl Default for CuckooOptions {
    fn default() -> Self {
        Self {
            capacity: CUCKOO_DEFAULT_CAPACITY,
            bucket_size: DEFAULT_BUCKET_SIZE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            expansion: DEFAULT_EXPANSION,
        }
    }
}
