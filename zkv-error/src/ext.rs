use std::{any::Any, error::Error};

use crate::StatusCode;

/// Расширение для ошибок движка (object-safe).
///
/// Любая ошибка, реализующая этот трейт, автоматически конвертируется в
/// [`StackError`](crate::StackError) через `?`.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Статус-код ошибки. По умолчанию [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Возвращает ошибку как [`Any`] для downcast к конкретному типу.
    fn as_any(&self) -> &dyn Any;

    /// Сообщение, которое обработчик команды может отдать клиенту.
    ///
    /// Для внутренних ошибок детали скрываются.
    fn client_message(&self) -> String {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal | StatusCode::Unexpected => {
                "Internal error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Детализированное сообщение для логов.
    fn log_message(&self) -> String {
        format!("{self:?}")
    }

    /// Короткое имя типа ошибки, без пути модулей.
    fn type_name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("Unknown")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{any::Any, error::Error, fmt};

    use super::*;

    #[derive(Debug)]
    struct DefaultError(pub &'static str);

    impl fmt::Display for DefaultError {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "DefaultError: {}", self.0)
        }
    }

    impl Error for DefaultError {}

    impl ErrorExt for DefaultError {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct WrongTypeError(pub &'static str);

    impl fmt::Display for WrongTypeError {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "wrong type: {}", self.0)
        }
    }

    impl Error for WrongTypeError {}

    impl ErrorExt for WrongTypeError {
        fn status_code(&self) -> StatusCode {
            StatusCode::WrongType
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Тест проверяет, что по умолчанию статус ошибки `Internal`, а клиенту
    /// уходит обезличенное сообщение.
    #[test]
    fn test_default_status_is_hidden_from_client() {
        let e = DefaultError("secret");
        assert_eq!(e.status_code(), StatusCode::Internal);
        assert_eq!(e.client_message(), "Internal error");
    }

    /// Тест проверяет, что для клиентских кодов отдаётся `Display`.
    #[test]
    fn test_client_message_non_internal() {
        let e = WrongTypeError("deque");
        assert_eq!(e.client_message(), "wrong type: deque");
    }

    #[test]
    fn test_as_any_downcast() {
        let e = WrongTypeError("x");
        let down = e.as_any().downcast_ref::<WrongTypeError>();
        assert_eq!(down.map(|d| d.0), Some("x"));
    }

    #[test]
    fn test_log_message_and_type_name() {
        let e = WrongTypeError("dbg");
        assert_eq!(e.log_message(), format!("{e:?}"));
        assert_eq!(e.type_name(), "WrongTypeError");
    }
}
