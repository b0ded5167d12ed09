//! Durable copy of the in-progress report.
//!
//! The whole draft is one JSON record under one owner-scoped key, so a save
//! replaces description and image together or not at all. Records that are
//! missing, unreadable or written by a newer schema load as an empty draft.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::capabilities::{KvError, KvKey, KvResult, MAX_VALUE_SIZE};
use crate::model::{ImageRef, ReportDraft};
use crate::{AppError, ErrorKind, Stage, CURRENT_DRAFT_SCHEMA_VERSION};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftStore {
    key: KvKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDraft {
    schema_version: u32,
    description: String,
    image: Option<StoredImage>,
    saved_at_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredImage {
    local_uri: String,
    #[serde(default)]
    remote_ref: Option<String>,
}

impl DraftStore {
    pub fn for_owner(owner_id: &str) -> Result<Self, DraftStoreError> {
        if owner_id.is_empty() {
            return Err(DraftStoreError::NoOwner);
        }
        let key = KvKey::draft(&Self::key_for_owner(owner_id))?;
        Ok(Self { key })
    }

    /// `report_v{schema}_{first 16 hex chars of blake3(owner)}`.
    #[must_use]
    pub fn key_for_owner(owner_id: &str) -> String {
        let hash = blake3::hash(owner_id.as_bytes());
        format!(
            "report_v{}_{}",
            CURRENT_DRAFT_SCHEMA_VERSION,
            &hash.to_hex()[..16]
        )
    }

    #[must_use]
    pub fn key(&self) -> &KvKey {
        &self.key
    }

    pub fn encode(draft: &ReportDraft, now_ms: u64) -> Result<Vec<u8>, DraftStoreError> {
        let record = StoredDraft {
            schema_version: CURRENT_DRAFT_SCHEMA_VERSION,
            description: draft.description.clone(),
            image: draft.image.as_ref().map(|image| StoredImage {
                local_uri: image.local_uri.clone(),
                remote_ref: image.remote_ref.clone(),
            }),
            saved_at_ms: now_ms,
        };
        let bytes =
            serde_json::to_vec(&record).map_err(|e| DraftStoreError::Encode(e.to_string()))?;
        if bytes.len() > MAX_VALUE_SIZE {
            return Err(DraftStoreError::TooLarge {
                size: bytes.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Never fails: anything that cannot be trusted becomes an empty draft.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> ReportDraft {
        let record = match serde_json::from_slice::<StoredDraft>(bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "stored draft is unreadable, starting empty");
                return ReportDraft::default();
            }
        };

        if record.schema_version > CURRENT_DRAFT_SCHEMA_VERSION {
            warn!(
                found = record.schema_version,
                supported = CURRENT_DRAFT_SCHEMA_VERSION,
                "stored draft has a newer schema, starting empty"
            );
            return ReportDraft::default();
        }

        let image = record
            .image
            .filter(|image| !image.local_uri.trim().is_empty())
            .map(|image| ImageRef {
                local_uri: image.local_uri,
                remote_ref: image.remote_ref,
            });

        ReportDraft {
            description: record.description,
            image,
        }
    }

    pub fn interpret_load(result: KvResult) -> Result<ReportDraft, DraftStoreError> {
        match result {
            Ok(Some(bytes)) => Ok(Self::decode(&bytes)),
            Ok(None) => {
                debug!("no stored draft");
                Ok(ReportDraft::default())
            }
            Err(e) => Err(DraftStoreError::Read(e)),
        }
    }

    pub fn interpret_save(result: KvResult) -> Result<(), DraftStoreError> {
        result.map(|_| ()).map_err(DraftStoreError::Write)
    }

    /// Whether a record was there to remove.
    pub fn interpret_clear(result: KvResult) -> Result<bool, DraftStoreError> {
        result
            .map(|previous| previous.is_some())
            .map_err(DraftStoreError::Clear)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftStoreError {
    #[error("no owner id available for the draft key")]
    NoOwner,
    #[error("invalid draft key: {0}")]
    Key(#[from] KvError),
    #[error("draft record is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("failed to encode draft: {0}")]
    Encode(String),
    #[error("failed to read draft: {0}")]
    Read(KvError),
    #[error("failed to write draft: {0}")]
    Write(KvError),
    #[error("failed to clear draft: {0}")]
    Clear(KvError),
}

impl From<DraftStoreError> for AppError {
    fn from(e: DraftStoreError) -> Self {
        let kind = match &e {
            DraftStoreError::NoOwner | DraftStoreError::Key(_) => ErrorKind::Configuration,
            DraftStoreError::Encode(_) => ErrorKind::Internal,
            DraftStoreError::TooLarge { .. }
            | DraftStoreError::Read(_)
            | DraftStoreError::Write(_)
            | DraftStoreError::Clear(_) => ErrorKind::Persistence,
        };
        AppError::new(kind, "draft storage failure")
            .with_stage(Stage::Draft)
            .with_internal(e.to_string())
    }
}
