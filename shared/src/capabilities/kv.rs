use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

pub const MAX_KEY_LENGTH: usize = 512;
/// Largest record the core will hand to `KeyValue::set`.
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

const DRAFT_PREFIX: &str = "draft:";

/// Result of a `KeyValue` get, set or delete. Set and delete carry the
/// previous value.
pub type KvResult = Result<Option<Vec<u8>>, KvError>;

/// Maps whatever `KeyValue` reports into the domain error type.
pub fn storage_result<E: Debug>(result: Result<Option<Vec<u8>>, E>) -> KvResult {
    result.map_err(|e| KvError::storage(StorageErrorCode::Unknown, format!("{e:?}")))
}

/// A storage key under the `draft:` prefix. Ids are limited to ASCII
/// letters, digits, `_` and `-`, so a key never contains a path separator,
/// a dot or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey(String);

impl KvKey {
    pub fn draft(id: &str) -> Result<Self, KvError> {
        if id.is_empty() || id.len() > MAX_KEY_LENGTH {
            return Err(KvError::InvalidKey(preview(id)));
        }
        let allowed = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
        if !id.chars().all(allowed) {
            return Err(KvError::InvalidKey(preview(id)));
        }
        Ok(Self(format!("{DRAFT_PREFIX}{id}")))
    }

    /// The key as `KeyValue` receives it.
    #[must_use]
    pub fn raw(&self) -> String {
        self.0.clone()
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.0[DRAFT_PREFIX.len()..]
    }
}

fn preview(id: &str) -> String {
    id.chars()
        .take(32)
        .map(|c| if c.is_control() { '?' } else { c })
        .collect()
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("storage key id {0:?} must be 1-512 characters of [A-Za-z0-9_-]")]
    InvalidKey(String),

    #[error("record of {size} bytes is over the {max} byte limit")]
    ValueTooLarge { size: usize, max: usize },

    #[error("{code:?} from storage: {message}")]
    Storage {
        code: StorageErrorCode,
        message: String,
    },
}

impl KvError {
    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        KvError::Storage {
            code,
            message: message.into(),
        }
    }
}

/// Coarse cause reported by a native store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Unknown,
    Corrupted,
    DiskFull,
    PermissionDenied,
    Busy,
    Locked,
    IoError,
}
