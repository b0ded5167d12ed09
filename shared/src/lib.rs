#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod draft;
pub mod event;
pub mod model;
#[cfg(not(target_arch = "wasm32"))]
pub mod shell;
pub mod submission;
pub mod upload;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use app::App;
pub use capabilities::{Capabilities, Effect, MediaSource};
pub use config::FormConfig;
pub use crux_core::{render::Render, App as CruxApp};
pub use event::Event;
pub use model::{FormStatus, ImageRef, Model, PermissionState, ReportDraft, ToastKind};

pub const CURRENT_DRAFT_SCHEMA_VERSION: u32 = 1;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    Persistence,
    UploadFailed,
    Validation,
    SubmissionFailed,
    /// Transport-level failure of an upload or a submission.
    NetworkUnavailable,
    MediaUnavailable,
    Configuration,
    InvalidState,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Persistence => "PERSISTENCE_ERROR",
            Self::UploadFailed => "UPLOAD_FAILED",
            Self::Validation => "VALIDATION_ERROR",
            Self::SubmissionFailed => "SUBMISSION_FAILED",
            Self::NetworkUnavailable => "NETWORK_UNAVAILABLE",
            Self::MediaUnavailable => "MEDIA_UNAVAILABLE",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Persistence
            | Self::UploadFailed
            | Self::SubmissionFailed
            | Self::NetworkUnavailable
            | Self::MediaUnavailable => ErrorSeverity::Transient,

            Self::PermissionDenied | Self::Validation | Self::InvalidState => {
                ErrorSeverity::Permanent
            }

            Self::Configuration | Self::Internal => ErrorSeverity::Fatal,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Persistence
                | Self::UploadFailed
                | Self::SubmissionFailed
                | Self::NetworkUnavailable
                | Self::MediaUnavailable
        )
    }
}

/// Which pipeline stage produced an error. Carried in `AppError::context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Draft,
    Acquisition,
    Upload,
    Submission,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Acquisition => "acquisition",
            Self::Upload => "upload",
            Self::Submission => "submission",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_stage(self, stage: Stage) -> Self {
        self.with_context("stage", stage.as_str())
    }

    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        self.context.get("stage").map(String::as_str)
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::PermissionDenied | ErrorKind::Validation | ErrorKind::InvalidState => {
                self.message.clone()
            }
            ErrorKind::Persistence => {
                "Your draft could not be saved on this device. Your changes are kept while the app stays open."
                    .into()
            }
            ErrorKind::UploadFailed => {
                "The photo could not be uploaded. You can retry, or submit the report anyway."
                    .into()
            }
            ErrorKind::SubmissionFailed => {
                "The report could not be submitted. Your draft is saved, please try again.".into()
            }
            ErrorKind::NetworkUnavailable => match self.stage() {
                Some("upload") => {
                    "No connection. The photo was not uploaded, you can retry when you are back online."
                        .into()
                }
                _ => "No connection. Your report was not sent, please try again when you are back online."
                    .into(),
            },
            ErrorKind::MediaUnavailable => {
                "Unable to open the camera or photo library. Please try again.".into()
            }
            ErrorKind::Configuration => {
                "The report form is not configured correctly. Please contact support.".into()
            }
            ErrorKind::Internal => {
                "An unexpected error occurred. Please try again or contact support.".into()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<capabilities::MediaError> for AppError {
    fn from(e: capabilities::MediaError) -> Self {
        use capabilities::MediaError;

        let err = match &e {
            MediaError::PermissionDenied { media, .. } => {
                let message = match media {
                    MediaSource::Camera => {
                        "Camera access is needed to take a photo. You can allow it in Settings."
                    }
                    MediaSource::Library => {
                        "Photo library access is needed to choose a photo. You can allow it in Settings."
                    }
                };
                AppError::new(ErrorKind::PermissionDenied, message)
                    .with_context("source", media.as_str())
            }
            MediaError::InvalidImage { .. } | MediaError::FileTooLarge { .. } => {
                AppError::new(ErrorKind::Validation, "This photo cannot be used. Please choose another one.")
            }
            _ => AppError::new(ErrorKind::MediaUnavailable, "media operation failed"),
        };
        err.with_stage(Stage::Acquisition).with_internal(e.to_string())
    }
}

/// Whether a remote call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// Wall-clock milliseconds. On wasm32 the browser clock is read through
/// `js_sys::Date`, so this never touches `std::time::SystemTime`.
#[must_use]
pub fn get_current_time_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_transient: e.severity == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&model::ToastMessage> for ToastView {
    fn from(t: &model::ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.duration_ms,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatusView {
    NotUploaded,
    Uploading,
    Uploaded,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageView {
    pub local_uri: String,
    pub remote_ref: Option<String>,
    pub upload: UploadStatusView,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub status: FormStatus,
    pub is_ready: bool,
    pub description: String,
    pub image: Option<ImageView>,
    pub can_submit: bool,
    pub is_acquiring: bool,
    pub is_submitting: bool,
    pub camera_permission: PermissionState,
    pub library_permission: PermissionState,
    pub error: Option<UserFacingError>,
    pub toast: Option<ToastView>,
}
