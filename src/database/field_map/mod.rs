pub mod field_map_expiring;
pub mod field_map_ops;
pub mod field_map_simple;

pub use field_map_expiring::*;
pub use field_map_ops::*;
pub use field_map_simple::*;
