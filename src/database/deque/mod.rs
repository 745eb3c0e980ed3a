pub mod deque_basic;
pub mod deque_ops;
pub mod deque_segmented;

pub use deque_basic::*;
pub use deque_ops::*;
pub use deque_segmented::*;
