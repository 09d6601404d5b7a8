pub mod fs;
pub mod memory;

pub use self::fs::FsArchiveStore;
pub use self::memory::MemoryArchiveStore;
