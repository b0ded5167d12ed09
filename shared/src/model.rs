use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::capabilities::{MediaSource, PermissionStatus};
use crate::config::FormConfig;
use crate::draft::DraftStore;
use crate::{get_current_time_ms, AppError, ErrorKind};

/// The in-progress report. Both fields are persisted together.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub description: String,
    pub image: Option<ImageRef>,
}

impl ReportDraft {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.description.is_empty() && self.image.is_none()
    }

    /// A report can be sent once it has a description; the photo is optional.
    #[must_use]
    pub fn is_submittable(&self) -> bool {
        !self.description.trim().is_empty()
    }
}

// User text and file paths stay out of logs.
impl fmt::Debug for ReportDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportDraft")
            .field("description_len", &self.description.chars().count())
            .field("image", &self.image)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub local_uri: String,
    /// Set once the object store accepted the file.
    pub remote_ref: Option<String>,
}

impl ImageRef {
    #[must_use]
    pub fn local(uri: impl Into<String>) -> Self {
        Self {
            local_uri: uri.into(),
            remote_ref: None,
        }
    }

    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        self.remote_ref.is_some()
    }

    /// The reference sent with the report: remote when uploaded, local otherwise.
    #[must_use]
    pub fn submission_ref(&self) -> &str {
        self.remote_ref.as_deref().unwrap_or(&self.local_uri)
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRef")
            .field("local_uri", &"[REDACTED]")
            .field("remote_ref", &self.remote_ref)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    #[default]
    Empty,
    Editing,
    Submitting,
    Submitted,
    Failed,
}

impl FormStatus {
    #[must_use]
    pub fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Empty => &[Self::Editing],
            Self::Editing => &[Self::Editing, Self::Submitting],
            Self::Submitting => &[Self::Submitted, Self::Failed],
            Self::Submitted => &[Self::Empty],
            Self::Failed => &[Self::Editing],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn validate_transition(self, to: Self) -> Result<(), TransitionError> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(TransitionError { from: self, to })
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Editing => "editing",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid form transition from {from} to {to}")]
pub struct TransitionError {
    pub from: FormStatus,
    pub to: FormStatus,
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        AppError::new(ErrorKind::InvalidState, "This action is not available right now.")
            .with_internal(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    #[default]
    Undetermined,
}

impl From<PermissionStatus> for PermissionState {
    fn from(status: PermissionStatus) -> Self {
        match status {
            PermissionStatus::Granted | PermissionStatus::Limited => Self::Granted,
            PermissionStatus::Denied
            | PermissionStatus::DeniedPermanently
            | PermissionStatus::Restricted => Self::Denied,
            PermissionStatus::NotDetermined => Self::Undetermined,
        }
    }
}

/// Identifies one upload run. Results carrying any other ticket are stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTicket {
    pub id: String,
    pub local_uri: String,
}

impl UploadTicket {
    #[must_use]
    pub fn new(local_uri: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            local_uri: local_uri.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadState {
    #[default]
    Idle,
    InFlight(UploadTicket),
    Failed {
        error: ErrorKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionAttempt {
    pub id: String,
    pub started_at_ms: u64,
}

impl SubmissionAttempt {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at_ms: get_current_time_ms(),
        }
    }
}

impl Default for SubmissionAttempt {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
    pub created_at_ms: u64,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn new(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
            created_at_ms: get_current_time_ms(),
            duration_ms: kind.default_duration_ms(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.duration_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Warning,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
        }
    }
}

/// Config and store handle for the signed-in owner.
#[derive(Debug, Clone)]
pub struct Session {
    pub config: FormConfig,
    pub store: DraftStore,
}

#[derive(Debug, Default)]
pub struct Model {
    pub session: Option<Session>,
    pub hydrated: bool,
    pub status: FormStatus,
    pub draft: ReportDraft,
    pub acquiring: Option<MediaSource>,
    pub upload: UploadState,
    pub submission: Option<SubmissionAttempt>,
    pub camera_permission: PermissionState,
    pub library_permission: PermissionState,
    pub active_error: Option<AppError>,
    pub active_toast: Option<ToastMessage>,
}

impl Model {
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    pub fn session(&self) -> Result<&Session, AppError> {
        self.session.as_ref().ok_or_else(|| {
            AppError::new(ErrorKind::InvalidState, "The report form is still loading.")
        })
    }

    pub fn transition_to(&mut self, to: FormStatus) -> Result<(), TransitionError> {
        self.status.validate_transition(to)?;
        self.status = to;
        Ok(())
    }

    /// Moves the form into `Editing` before a user change is applied.
    ///
    /// A submitted form passes through `Empty` first, so the change starts a
    /// new report instead of editing the one already sent.
    pub fn begin_edit(&mut self) -> Result<(), AppError> {
        self.session()?;
        match self.status {
            FormStatus::Editing => Ok(()),
            FormStatus::Submitting => Err(AppError::new(
                ErrorKind::InvalidState,
                "Please wait until the report has been sent.",
            )),
            FormStatus::Submitted => {
                self.reset_report()?;
                Ok(self.transition_to(FormStatus::Editing)?)
            }
            FormStatus::Empty | FormStatus::Failed => Ok(self.transition_to(FormStatus::Editing)?),
        }
    }

    /// `Submitted -> Empty`, dropping the report that was sent.
    pub fn reset_report(&mut self) -> Result<(), TransitionError> {
        self.transition_to(FormStatus::Empty)?;
        self.draft = ReportDraft::default();
        self.upload = UploadState::Idle;
        Ok(())
    }

    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.session.is_some()
            && matches!(self.status, FormStatus::Editing | FormStatus::Failed)
            && self.draft.is_submittable()
    }

    #[must_use]
    pub fn is_current_upload(&self, ticket: &UploadTicket) -> bool {
        let current = matches!(&self.upload, UploadState::InFlight(t) if t.id == ticket.id);
        let same_image = self
            .draft
            .image
            .as_ref()
            .is_some_and(|image| image.local_uri == ticket.local_uri);
        current && same_image
    }

    pub fn permission_mut(&mut self, source: MediaSource) -> &mut PermissionState {
        match source {
            MediaSource::Camera => &mut self.camera_permission,
            MediaSource::Library => &mut self.library_permission,
        }
    }

    pub fn set_error(&mut self, error: AppError) {
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    /// Clears the active error only if it is of one of `kinds`.
    pub fn clear_error_of(&mut self, kinds: &[ErrorKind]) {
        if self
            .active_error
            .as_ref()
            .is_some_and(|e| kinds.contains(&e.kind))
        {
            self.active_error = None;
        }
    }

    pub fn show_toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.active_toast = Some(ToastMessage::new(message, kind));
    }
}
