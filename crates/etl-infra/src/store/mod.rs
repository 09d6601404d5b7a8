pub mod memory;
pub mod redis;

pub use self::memory::MemoryDocumentStore;
pub use self::redis::{RedisDocumentStore, RedisStoreConfig};
