use std::fmt;

use num_enum::TryFromPrimitive;

/// Коды статуса для категоризации ошибок движка.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных и типов
/// - 5xxx: Кодеки и сериализация
/// - 6xxx: IO
/// - 8xxx: Кодирование на уровне байтов
///
/// `num_enum::TryFromPrimitive` даёт `TryFrom<u32>`, что удобно, когда код
/// передаётся наружу как число.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,

    // === 2xxx: Ошибки данных ===
    WrongType = 2007,
    InvalidData = 2009,
    EmptyCollection = 2010,

    // === 5xxx: Кодеки ===
    CorruptedData = 5002,
    ChecksumMismatch = 5008,
    HashFailed = 5009,

    // === 6xxx: IO ===
    Io = 6000,
    UnexpectedEof = 6007,

    // === 8xxx: Байтовые форматы ===
    UnsupportedVersion = 8002,
    InvalidUtf8 = 8004,
    DecodingError = 8011,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить `StatusCode` из `u32`; `None`, если такого варианта
    /// нет.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка вызывающей стороны: неверные аргументы или неверный тип ключа.
    pub fn is_client_error(&self) -> bool {
        (2000..=2999).contains(&self.code()) || matches!(self, Self::InvalidArgs)
    }

    /// Внутренняя ошибка движка или повреждённые данные.
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error() && !matches!(self, Self::Success)
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Internal | Self::CorruptedData | Self::ChecksumMismatch
        )
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::EmptyCollection => LogLevel::Debug,
            Self::InvalidArgs | Self::InvalidData | Self::WrongType => LogLevel::Info,
            Self::Internal | Self::CorruptedData | Self::ChecksumMismatch => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
