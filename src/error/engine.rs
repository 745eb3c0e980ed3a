use std::any::Any;

use thiserror::Error;
use zkv_error::{ErrorExt, StatusCode};

use crate::database::TypeTag;

pub type EngineResult<T> = Result<T, EngineError>;

/// Ошибки операций над структурами движка.
///
/// Обработчики команд переводят их в протокольные ошибки; внутри движка
/// повторных попыток нет.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value (expected {expected}, got {actual})")]
    WrongTypeOperation { expected: TypeTag, actual: TypeTag },

    #[error("deque is empty")]
    DequeEmpty,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("corrupted object: {0}")]
    CorruptedObject(String),

    #[error("hash function failed: {0}")]
    HashError(String),
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn corrupted(msg: impl Into<String>) -> Self {
        Self::CorruptedObject(msg.into())
    }
}

impl ErrorExt for EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::WrongTypeOperation { .. } => StatusCode::WrongType,
            Self::DequeEmpty => StatusCode::EmptyCollection,
            Self::InvalidArgument(_) => StatusCode::InvalidArgs,
            Self::CorruptedObject(_) => StatusCode::CorruptedData,
            Self::HashError(_) => StatusCode::HashFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
