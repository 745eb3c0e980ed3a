/// Engine settings loaded from defaults, files and `ZKV_*` environment.
pub mod config;
/// Codecs and data structures: varint, list entries, deques, filters, sketches.
pub mod database;
/// Object store with TTLs, clock, and DUMP/RESTORE.
pub mod engine;
/// Engine error taxonomy.
pub mod error;
/// Logging setup (filters, console and file sinks).
pub mod logging;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use config::{EngineSettings, SettingsError};
/// Data structures and the object model.
pub use database::{
    BasicDeque, BloomFilter, BloomOptions, CountMinSketch, CuckooFilter, CuckooOptions, DequeOps,
    ExpiringFieldMap, FieldMap, InsertOutcome, InsertPosition, Object, ObjectEncoding, ObjectType,
    SegmentedDeque, SimpleFieldMap, TypeTag, Value,
};
/// Object store and byte form.
pub use engine::{dump, restore, Clock, ExpiryFlags, ManualClock, ObjectStore, PutOptions, SystemClock};
pub use error::{EngineError, EngineResult};
pub use logging::{init_logging, LoggingConfig, LoggingError, LoggingHandle};
pub use zkv_error::{StackError, StatusCode, ZkvResult};
