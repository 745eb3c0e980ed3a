use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки байтовых форматов: varint-потоки и DUMP/RESTORE-конверт.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Varint длиннее 10 байт
    #[error("varint is too long for a 64-bit value")]
    VarintOverflow,
    /// Поток закончился раньше, чем ожидалось
    #[error("unexpected end of input: {needed} more bytes needed")]
    UnexpectedEof { needed: usize },
    /// Неизвестная версия формата
    #[error("unsupported dump version {0:#04x}")]
    UnsupportedVersion(u8),
    /// Неизвестный байт тип|кодировка
    #[error("unknown type/encoding tag {0:#04x}")]
    UnknownTag(u8),
    /// Отсутствует маркер конца полезной нагрузки
    #[error("dump end marker is missing")]
    MissingEndMarker,
    /// Контрольная сумма не совпала
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl ErrorExt for CodecError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::VarintOverflow => StatusCode::DecodingError,
            Self::UnexpectedEof { .. } => StatusCode::UnexpectedEof,
            Self::UnsupportedVersion(_) => StatusCode::UnsupportedVersion,
            Self::UnknownTag(_) | Self::MissingEndMarker => StatusCode::CorruptedData,
            Self::ChecksumMismatch { .. } => StatusCode::ChecksumMismatch,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_status_codes() {
        assert_eq!(
            CodecError::VarintOverflow.status_code(),
            StatusCode::DecodingError
        );
        assert_eq!(
            CodecError::ChecksumMismatch {
                expected: 1,
                actual: 2
            }
            .status_code(),
            StatusCode::ChecksumMismatch
        );
        assert_eq!(
            CodecError::UnknownTag(0xAB).to_string(),
            "unknown type/encoding tag 0xab"
        );
    }
}
