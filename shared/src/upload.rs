//! Photo upload to the object store.
//!
//! One upload is one multipart POST with a single `file` part to
//! `{upload_url}/{owner_id}/{uuid}.{ext}`. The object name is chosen here, so
//! it doubles as the remote reference once the store answers 2xx.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{Delivery, ImageFormat, MediaError, UrlError, ValidatedUrl};
use crate::config::{ConfigError, FormConfig};
use crate::{AppError, ErrorKind, Outcome, Stage};

pub const FILE_FIELD_NAME: &str = "file";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub outcome: Outcome,
    pub remote_ref: Option<String>,
    pub error: Option<ErrorKind>,
    /// Diagnostic detail for logs; not shown to users.
    pub detail: Option<String>,
}

impl UploadResult {
    #[must_use]
    pub fn success(remote_ref: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Success,
            remote_ref: Some(remote_ref.into()),
            error: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn failure(error: &UploadError) -> Self {
        Self {
            outcome: Outcome::Failure,
            remote_ref: None,
            error: Some(error.kind()),
            detail: Some(error.to_string()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// The user-facing error for a failed upload.
    #[must_use]
    pub fn app_error(&self) -> Option<AppError> {
        let kind = self.error?;
        let mut error = AppError::new(kind, "photo upload failed").with_stage(Stage::Upload);
        if let Some(detail) = &self.detail {
            error = error.with_internal(detail.clone());
        }
        Some(error)
    }
}

/// Everything the POST needs. The bearer token is attached when sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUpload {
    pub object_name: String,
    pub url: ValidatedUrl,
    /// `multipart/form-data` with this upload's boundary.
    pub content_type: String,
    pub body: Vec<u8>,
}

/// `{owner_id}/{uuid}.{ext}`; a fresh v4 uuid per upload keeps names unique per owner.
#[must_use]
pub fn object_name(owner_id: &str, format: ImageFormat) -> String {
    format!(
        "{}/{}.{}",
        owner_id,
        uuid::Uuid::new_v4(),
        format.extension()
    )
}

/// Builds the upload for `bytes` read from the draft's local file.
pub fn prepare(config: &FormConfig, bytes: &[u8]) -> Result<PreparedUpload, UploadError> {
    if bytes.is_empty() {
        return Err(UploadError::EmptyFile);
    }
    if bytes.len() > config.max_image_bytes {
        return Err(UploadError::FileTooLarge {
            size: bytes.len(),
            max: config.max_image_bytes,
        });
    }

    let format = ImageFormat::from_magic_bytes(bytes).unwrap_or_default();
    let object_name = object_name(&config.owner_id, format);
    let url = object_url(&config.upload_endpoint()?, &object_name)?;

    let file_name = object_name
        .rsplit('/')
        .next()
        .unwrap_or(object_name.as_str())
        .to_string();
    let boundary = format!("----incident-{}", uuid::Uuid::new_v4().simple());
    let body = multipart_body(
        &boundary,
        FILE_FIELD_NAME,
        &file_name,
        format.mime_type(),
        bytes,
    );

    Ok(PreparedUpload {
        object_name,
        url,
        content_type: format!("multipart/form-data; boundary={boundary}"),
        body,
    })
}

fn object_url(base: &ValidatedUrl, object_name: &str) -> Result<ValidatedUrl, UploadError> {
    Ok(base.join_segments(object_name.split('/'))?)
}

/// A `multipart/form-data` body with exactly one file part.
#[must_use]
pub fn multipart_body(
    boundary: &str,
    field: &str,
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> Vec<u8> {
    let head = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    );
    let tail = format!("\r\n--{boundary}--\r\n");

    let mut body = Vec::with_capacity(head.len() + bytes.len() + tail.len());
    body.extend_from_slice(head.as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(tail.as_bytes());
    body
}

/// Maps the store's answer for `object_name`. Only 2xx counts as uploaded.
#[must_use]
pub fn interpret(object_name: &str, delivery: Delivery) -> UploadResult {
    match delivery {
        Delivery::Accepted { .. } => UploadResult::success(object_name),
        Delivery::Rejected { status, message } => {
            UploadResult::failure(&UploadError::Rejected { status, message })
        }
        Delivery::Unreachable { reason } => {
            UploadResult::failure(&UploadError::NetworkUnavailable { reason })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("image file is empty")]
    EmptyFile,
    #[error("image is {size} bytes, limit is {max}")]
    FileTooLarge { size: usize, max: usize },
    #[error("could not read image file: {0}")]
    FileUnreadable(#[from] MediaError),
    #[error("upload endpoint misconfigured: {0}")]
    Config(#[from] ConfigError),
    #[error("could not build upload URL: {0}")]
    Url(#[from] UrlError),
    #[error("object store rejected upload with status {status}")]
    Rejected {
        status: u16,
        message: Option<String>,
    },
    #[error("network unavailable: {reason}")]
    NetworkUnavailable { reason: String },
}

impl UploadError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::NetworkUnavailable { .. } => ErrorKind::NetworkUnavailable,
            _ => ErrorKind::UploadFailed,
        }
    }
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        AppError::new(e.kind(), "photo upload failed")
            .with_stage(Stage::Upload)
            .with_internal(e.to_string())
    }
}
