pub mod ext;
pub mod macros;
pub mod stack;
pub mod status_code;
pub mod types;

// Публичный реэкспорт, чтобы внешний код мог писать `zkv_error::StackError`
// без указания подмодуля.
pub use ext::*;
pub use macros::*;
pub use stack::*;
pub use status_code::*;
pub use types::*;

pub type ZkvResult<T> = Result<T, StackError>;
