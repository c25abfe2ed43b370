//! Persistent store: trait seam, in-memory implementation and snapshot dumper.

pub mod dumper;
pub mod memory;
pub mod store;

// Re-export main types
pub use dumper::{Dumper, JsonDumper, SnapshotLoop};
pub use memory::MemoryStore;
pub use store::Store;
