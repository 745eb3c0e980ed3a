pub mod engine;

pub use engine::{EngineError, EngineResult};
