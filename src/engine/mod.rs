//! Хранилище ключей, источник времени и бинарная форма объектов.
//!
//! - `clock`: источник миллисекундного времени, системный или ручной.
//! - `dump`: `DUMP`/`RESTORE` одиночного объекта с CRC32.
//! - `store`: [`ObjectStore`], ключи с TTL и ленивым удалением.

pub mod clock;
pub mod dump;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dump::{dump, restore, DUMP_VERSION, END_MARKER};
pub use store::*;
