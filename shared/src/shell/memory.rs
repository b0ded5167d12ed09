use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::KvBackend;
use crate::capabilities::{KvError, KvResult, StorageErrorCode, MAX_VALUE_SIZE};

/// In-process store. Clones share the same entries, which is how tests model
/// an app restart against surviving device storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>, KvError> {
        self.entries
            .lock()
            .map_err(|_| KvError::storage(StorageErrorCode::Locked, "store mutex poisoned"))
    }
}

impl KvBackend for MemoryKvStore {
    fn get(&self, key: &str) -> KvResult {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> KvResult {
        if value.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        Ok(self.lock()?.insert(key.to_string(), value))
    }

    fn delete(&self, key: &str) -> KvResult {
        Ok(self.lock()?.remove(key))
    }
}
