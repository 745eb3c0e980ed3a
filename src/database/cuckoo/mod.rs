pub mod cuckoo_base;
pub mod cuckoo_options;

pub use cuckoo_base::*;
pub use cuckoo_options::*;
