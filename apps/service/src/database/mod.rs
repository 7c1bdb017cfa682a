/// Record persistence
///
/// The engine only ever talks to [`RecordStore`]; [`FileStore`] keeps one JSON
/// document per record on disk.
pub mod file_store;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod repository;

pub use file_store::FileStore;
pub use models::{CheckRecord, TokenRecord, UserRecord};
pub use repository::{Collection, RecordStore, RecordStoreExt, StoreError, Versioned};
