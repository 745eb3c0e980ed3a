pub(crate) mod binary;
pub mod bloom;
pub mod cms;
pub mod cuckoo;
pub mod deque;
pub mod field_map;
pub mod hashing;
pub mod list_entry;
pub mod object;
pub mod varint;

pub use bloom::*;
pub use cms::*;
pub use cuckoo::*;
pub use deque::*;
pub use field_map::*;
pub use hashing::*;
pub use list_entry::{ListEntry, PreparedEntry};
pub use object::*;
