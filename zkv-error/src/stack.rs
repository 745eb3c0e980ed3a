use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка с цепочкой контекстов.
///
/// Каждый вызов [`StackError::context`] запоминает сообщение и место вызова,
/// так что по Display видно, через какие слои прошла ошибка.
#[derive(Clone)]
pub struct StackError {
    inner: Arc<dyn ErrorExt>,
    contexts: Vec<ErrorContext>,
}

/// Один уровень контекста.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: Option<&'static Location<'static>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    #[track_caller]
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            inner: Arc::new(err),
            contexts: Vec::new(),
        }
    }

    /// Добавляет контекст к ошибке.
    #[track_caller]
    pub fn context(
        mut self,
        msg: impl Into<String>,
    ) -> Self {
        self.contexts.push(ErrorContext {
            message: msg.into(),
            location: Some(Location::caller()),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.inner.status_code()
    }

    pub fn client_message(&self) -> String {
        self.inner.client_message()
    }

    /// Корневая ошибка, без контекстов.
    pub fn root(&self) -> &dyn ErrorExt {
        self.inner.as_ref()
    }

    pub fn contexts(&self) -> &[ErrorContext] {
        &self.contexts
    }

    /// Попытка downcast к конкретному типу ошибки.
    pub fn downcast_ref<T: ErrorExt + 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    pub fn is_critical(&self) -> bool {
        self.status_code().is_critical()
    }

    fn format_contexts(&self) -> Vec<String> {
        self.contexts
            .iter()
            .map(|ctx| match ctx.location {
                Some(loc) => format!("{} ({}:{})", ctx.message, loc.file(), loc.line()),
                None => ctx.message.clone(),
            })
            .collect()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut debug = f.debug_struct("StackError");
        debug.field("inner", &self.inner.to_string());
        debug.field("status_code", &self.status_code());
        if !self.contexts.is_empty() {
            debug.field("contexts", &self.format_contexts());
        }
        debug.finish()
    }
}

impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.contexts.is_empty() {
            return write!(f, "{}", self.inner);
        }
        // Внешний контекст первым.
        let contexts: Vec<&str> = self
            .contexts
            .iter()
            .rev()
            .map(|c| c.message.as_str())
            .collect();
        write!(f, "{}: {}", contexts.join(": "), self.inner)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    #[track_caller]
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CodecError;

    #[test]
    fn test_context_chain() {
        let stack = StackError::new(CodecError::UnexpectedEof { needed: 4 })
            .context("reading bloom header")
            .context("restoring key");

        assert_eq!(stack.contexts().len(), 2);
        assert_eq!(stack.contexts()[0].message, "reading bloom header");
        assert!(stack.contexts()[0].location.is_some());
        assert_eq!(stack.status_code(), StatusCode::UnexpectedEof);
    }

    #[test]
    fn test_downcast() {
        let stack = StackError::new(CodecError::VarintOverflow);
        assert!(stack.downcast_ref::<CodecError>().is_some());
    }

    #[test]
    fn test_display_outer_context_first() {
        let stack = StackError::new(CodecError::MissingEndMarker)
            .context("inner")
            .context("outer");
        let display = stack.to_string();
        assert!(display.starts_with("outer: inner: "));
        assert!(display.contains("end marker"));
    }
}
