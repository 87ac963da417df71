pub mod engine;
pub mod memory;
pub mod persistence;

pub use engine::StoreConnection;
pub use memory::{MemoryConnection, MemoryManager, MemoryStore};
pub use persistence::StateFile;
