use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// Источник времени в миллисекундах Unix-эпохи.
///
/// Хранилище и карты полей спрашивают время только через этот трейт, что
/// позволяет тестам управлять истечением TTL вручную.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> u64;
}

/// Системные часы.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

/// Часы, которые двигаются только по команде.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(
        &self,
        ms: u64,
    ) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(
        &self,
        ms: u64,
    ) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Текущее системное время в миллисекундах.
pub fn now_ms() -> u64 {
    SystemClock.now_ms()
}
