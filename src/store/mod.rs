pub mod base;
pub mod file_store;
pub mod memory_store;

// Re-export the primary Store items so code outside can do
// "use crate::store::{TokenStore, create_store};"
pub use base::{create_store, KvStorage, TokenStore, PRINCIPAL_KEY};
pub use file_store::FileStorage;
pub use memory_store::MemoryStorage;
