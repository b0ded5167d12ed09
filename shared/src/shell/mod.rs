//! Native executors for the key-value capability.
//!
//! The core only describes storage operations; a host answers them. These
//! backends let native hosts and integration tests answer
//! `KeyValueOperation`s without a platform bridge.

mod memory;
mod sqlite;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

use tracing::trace;

use crate::capabilities::{KeyValueOperation, KvError, KvResult, StorageErrorCode};

/// Each call is atomic. `set` and `delete` return the previous value.
pub trait KvBackend {
    fn get(&self, key: &str) -> KvResult;

    fn set(&self, key: &str, value: Vec<u8>) -> KvResult;

    fn delete(&self, key: &str) -> KvResult;

    /// Answers one request from the core.
    fn execute(&self, operation: &KeyValueOperation) -> KvResult {
        match operation {
            KeyValueOperation::Get { key } => {
                trace!(key = %key, "kv get");
                self.get(key)
            }
            KeyValueOperation::Set { key, value } => {
                trace!(key = %key, bytes = value.len(), "kv set");
                self.set(key, value.clone())
            }
            KeyValueOperation::Delete { key } => {
                trace!(key = %key, "kv delete");
                self.delete(key)
            }
            #[allow(unreachable_patterns)]
            _ => Err(KvError::storage(
                StorageErrorCode::Unknown,
                "operation not supported by this backend",
            )),
        }
    }
}
