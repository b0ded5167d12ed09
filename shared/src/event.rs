use serde::{Deserialize, Serialize};

use crate::capabilities::{
    AcquireOutcome, HttpResult, KvResult, MediaError, MediaSource, PermissionStatus,
};
use crate::config::FormConfig;
use crate::model::UploadTicket;

// --- Event enum: shell-facing variants first, capability responses boxed ---

#[derive(Serialize, Deserialize, Debug)]
pub enum Event {
    // Lifecycle
    Start {
        config: FormConfig,
    },

    // Editing
    DescriptionChanged {
        text: String,
    },
    PickImage {
        source: MediaSource,
    },
    DeleteImage,
    RetryUpload,

    // Submission
    Submit,
    NewReport,

    // Chrome
    RefreshPermissions,
    DismissError,
    DismissToast,

    // Capability responses, never sent by the shell
    #[serde(skip)]
    DraftLoaded(Box<KvResult>),
    #[serde(skip)]
    DraftSaved(Box<KvResult>),
    #[serde(skip)]
    DraftCleared(Box<KvResult>),
    #[serde(skip)]
    LocalImageChecked {
        uri: String,
        result: Result<bool, MediaError>,
    },
    #[serde(skip)]
    ImageAcquired {
        source: MediaSource,
        outcome: Box<AcquireOutcome>,
    },
    #[serde(skip)]
    PermissionChecked {
        source: MediaSource,
        result: Result<PermissionStatus, MediaError>,
    },
    #[serde(skip)]
    UploadFileRead {
        ticket: UploadTicket,
        result: Result<Vec<u8>, MediaError>,
    },
    #[serde(skip)]
    UploadResponse {
        ticket: UploadTicket,
        object_name: String,
        result: Box<HttpResult>,
    },
    #[serde(skip)]
    SubmissionResponse {
        attempt_id: String,
        result: Box<HttpResult>,
    },
}

impl Event {
    /// Stable name for log fields. Never includes payload content.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::DescriptionChanged { .. } => "description_changed",
            Event::PickImage { .. } => "pick_image",
            Event::DeleteImage => "delete_image",
            Event::RetryUpload => "retry_upload",
            Event::Submit => "submit",
            Event::NewReport => "new_report",
            Event::RefreshPermissions => "refresh_permissions",
            Event::DismissError => "dismiss_error",
            Event::DismissToast => "dismiss_toast",
            Event::DraftLoaded(_) => "draft_loaded",
            Event::DraftSaved(_) => "draft_saved",
            Event::DraftCleared(_) => "draft_cleared",
            Event::LocalImageChecked { .. } => "local_image_checked",
            Event::ImageAcquired { .. } => "image_acquired",
            Event::PermissionChecked { .. } => "permission_checked",
            Event::UploadFileRead { .. } => "upload_file_read",
            Event::UploadResponse { .. } => "upload_response",
            Event::SubmissionResponse { .. } => "submission_response",
        }
    }

    #[must_use]
    pub fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Event::Start { .. }
                | Event::DescriptionChanged { .. }
                | Event::PickImage { .. }
                | Event::DeleteImage
                | Event::RetryUpload
                | Event::Submit
                | Event::NewReport
                | Event::RefreshPermissions
                | Event::DismissError
                | Event::DismissToast
        )
    }
}
