pub mod bloom_base;
pub mod bloom_options;

pub use bloom_base::*;
pub use bloom_options::*;
