pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::*;
pub use error::{StoreError, StoreResult};
pub use store::{archive_key, compare_values, ArchiveStore, DocumentStore, Filter, Sort, SortOrder};
pub use types::*;
