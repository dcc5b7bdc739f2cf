mod error;
mod memory;
mod traits;

pub use error::StoreError;
pub use memory::{MemoryStore, MemoryTxn};
pub use traits::CaseStore;
