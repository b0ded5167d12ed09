use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_IMAGE_SIZE_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_QUALITY: u8 = 100;
pub const MAX_URI_LENGTH: usize = 4096;

/// OS media access: permission prompts, the camera and library pickers, and
/// reads of files the pickers handed back.
pub struct Media<Ev> {
    context: CapabilityContext<MediaOperation, Ev>,
}

impl<Ev> Clone for Media<Ev> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
        }
    }
}

impl<Ev> Capability<Ev> for Media<Ev> {
    type Operation = MediaOperation;
    type MappedSelf<MappedEv> = Media<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Media::new(self.context.map_event(f))
    }
}

impl<Ev> Media<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<MediaOperation, Ev>) -> Self {
        Self { context }
    }

    /// Queries the permission status without prompting.
    pub fn check_permission<F>(&self, source: MediaSource, make_event: F)
    where
        F: FnOnce(Result<PermissionStatus, MediaError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx
                .request_from_shell(MediaOperation::CheckPermission { source })
                .await;
            ctx.update_app(make_event(expect_permission(output)));
        });
    }

    /// Prompts for permission if needed, then opens the picker for `source`.
    ///
    /// The picker is never opened unless the shell reports the permission as
    /// granted. Cancellation comes back as `Acquisition::Cancelled`.
    pub fn acquire<F>(&self, source: MediaSource, config: PickConfig, make_event: F)
    where
        F: FnOnce(AcquireOutcome) -> Ev + Send + 'static,
    {
        let config = config.validated();
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let permission = expect_permission(
                ctx.request_from_shell(MediaOperation::RequestPermission { source })
                    .await,
            );

            let outcome = match permission_gate(source, permission) {
                Err(outcome) => outcome,
                Ok(status) => {
                    let picked = ctx
                        .request_from_shell(MediaOperation::Pick { source, config })
                        .await;
                    AcquireOutcome {
                        permission: Some(status),
                        result: interpret_pick(picked),
                    }
                }
            };

            ctx.update_app(make_event(outcome));
        });
    }

    pub fn read_file<F>(&self, uri: String, max_bytes: usize, make_event: F)
    where
        F: FnOnce(Result<Vec<u8>, MediaError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx
                .request_from_shell(MediaOperation::ReadFile {
                    uri,
                    max_bytes: max_bytes.min(MAX_IMAGE_SIZE_BYTES),
                })
                .await;
            let result = match output {
                Ok(MediaOutput::FileBytes(bytes)) if bytes.len() > max_bytes => {
                    Err(MediaError::FileTooLarge {
                        size: bytes.len(),
                        max: max_bytes,
                    })
                }
                Ok(MediaOutput::FileBytes(bytes)) => Ok(bytes),
                Ok(other) => Err(MediaError::unexpected("read_file", &other)),
                Err(e) => Err(e),
            };
            ctx.update_app(make_event(result));
        });
    }

    pub fn file_exists<F>(&self, uri: String, make_event: F)
    where
        F: FnOnce(Result<bool, MediaError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx
                .request_from_shell(MediaOperation::FileExists { uri })
                .await;
            let result = match output {
                Ok(MediaOutput::Exists(exists)) => Ok(exists),
                Ok(other) => Err(MediaError::unexpected("file_exists", &other)),
                Err(e) => Err(e),
            };
            ctx.update_app(make_event(result));
        });
    }
}

fn expect_permission(output: MediaResult) -> Result<PermissionStatus, MediaError> {
    match output {
        Ok(MediaOutput::Permission(status)) => Ok(status),
        Ok(other) => Err(MediaError::unexpected("permission", &other)),
        Err(e) => Err(e),
    }
}

/// Decides whether the picker may be opened after a permission request.
pub(crate) fn permission_gate(
    source: MediaSource,
    permission: Result<PermissionStatus, MediaError>,
) -> Result<PermissionStatus, AcquireOutcome> {
    match permission {
        Ok(status) if status.is_granted() => Ok(status),
        Ok(status) => Err(AcquireOutcome {
            permission: Some(status),
            result: Err(MediaError::PermissionDenied {
                media: source,
                permanently: status.should_show_settings_prompt(),
            }),
        }),
        Err(e) => Err(AcquireOutcome {
            permission: None,
            result: Err(e),
        }),
    }
}

pub(crate) fn interpret_pick(output: MediaResult) -> Result<Acquisition, MediaError> {
    match output {
        Ok(MediaOutput::Picked(image)) => {
            image.validate()?;
            Ok(Acquisition::Selected(image))
        }
        Ok(MediaOutput::Cancelled) | Err(MediaError::Cancelled) => Ok(Acquisition::Cancelled),
        Ok(other) => Err(MediaError::unexpected("pick", &other)),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaOperation {
    CheckPermission { source: MediaSource },
    RequestPermission { source: MediaSource },
    Pick { source: MediaSource, config: PickConfig },
    ReadFile { uri: String, max_bytes: usize },
    FileExists { uri: String },
}

impl Operation for MediaOperation {
    type Output = MediaResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    Camera,
    Library,
}

impl MediaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSource::Camera => "camera",
            MediaSource::Library => "library",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Heic,
    WebP,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Heic => "image/heic",
            ImageFormat::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Heic => "heic",
            ImageFormat::WebP => "webp",
        }
    }

    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }

        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(ImageFormat::Png);
        }

        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        // ISO-BMFF: size(4) "ftyp" brand(4)
        if &data[4..8] == b"ftyp" && matches!(&data[8..12], b"heic" | b"heix" | b"mif1") {
            return Some(ImageFormat::Heic);
        }

        None
    }
}

impl Default for ImageFormat {
    fn default() -> Self {
        ImageFormat::Jpeg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    Square,
    Ratio4x3,
    Ratio16x9,
    Free,
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio::Ratio4x3
    }
}

/// Picker presentation options. The shell maps these onto the platform
/// picker (crop UI, compression quality).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickConfig {
    pub allows_editing: bool,
    pub aspect_ratio: AspectRatio,
    pub quality: u8,
    pub images_only: bool,
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            allows_editing: true,
            aspect_ratio: AspectRatio::Ratio4x3,
            quality: DEFAULT_QUALITY,
            images_only: true,
        }
    }
}

impl PickConfig {
    pub fn with_editing(mut self, allows_editing: bool) -> Self {
        self.allows_editing = allows_editing;
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }

    pub fn validated(mut self) -> Self {
        self.quality = self.quality.clamp(1, 100);
        self.images_only = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Limited,
    Denied,
    DeniedPermanently,
    Restricted,
    NotDetermined,
}

impl PermissionStatus {
    /// Limited library access still lets the user pick a photo.
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted | PermissionStatus::Limited)
    }

    pub fn can_request(&self) -> bool {
        matches!(self, PermissionStatus::NotDetermined | PermissionStatus::Denied)
    }

    pub fn should_show_settings_prompt(&self) -> bool {
        matches!(
            self,
            PermissionStatus::DeniedPermanently | PermissionStatus::Restricted
        )
    }
}

/// A picked image that lives on the device. Bytes stay in the shell until
/// the upload path reads them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalImage {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
}

impl LocalImage {
    pub fn new(uri: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            uri: uri.into(),
            width,
            height,
            file_size: None,
            mime_type: None,
        }
    }

    pub fn validate(&self) -> Result<(), MediaError> {
        if self.uri.trim().is_empty() {
            return Err(MediaError::InvalidImage {
                reason: "picker returned an empty file reference".to_string(),
            });
        }
        if self.uri.len() > MAX_URI_LENGTH {
            return Err(MediaError::InvalidImage {
                reason: format!("file reference exceeds {MAX_URI_LENGTH} bytes"),
            });
        }
        if let Some(size) = self.file_size {
            if size > MAX_IMAGE_SIZE_BYTES as u64 {
                return Err(MediaError::FileTooLarge {
                    size: usize::try_from(size).unwrap_or(usize::MAX),
                    max: MAX_IMAGE_SIZE_BYTES,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaOutput {
    Permission(PermissionStatus),
    Picked(LocalImage),
    Cancelled,
    FileBytes(Vec<u8>),
    Exists(bool),
}

impl MediaOutput {
    fn kind(&self) -> &'static str {
        match self {
            MediaOutput::Permission(_) => "permission",
            MediaOutput::Picked(_) => "picked",
            MediaOutput::Cancelled => "cancelled",
            MediaOutput::FileBytes(_) => "file_bytes",
            MediaOutput::Exists(_) => "exists",
        }
    }
}

pub type MediaResult = Result<MediaOutput, MediaError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Acquisition {
    Selected(LocalImage),
    Cancelled,
}

/// Result of a full acquire sequence, with the permission status observed on
/// the way so the core can keep its permission view current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireOutcome {
    pub permission: Option<PermissionStatus>,
    pub result: Result<Acquisition, MediaError>,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaError {
    #[error("{} permission denied", media.as_str())]
    PermissionDenied { media: MediaSource, permanently: bool },

    #[error("{} unavailable: {reason}", media.as_str())]
    Unavailable { media: MediaSource, reason: String },

    #[error("picker cancelled by user")]
    Cancelled,

    #[error("another picker is already open")]
    Busy,

    #[error("file not found: {uri}")]
    FileNotFound { uri: String },

    #[error("file too large: {size} bytes exceeds maximum of {max} bytes")]
    FileTooLarge { size: usize, max: usize },

    #[error("failed to read file: {reason}")]
    ReadFailed { reason: String },

    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    #[error("unexpected media output for {operation}: {output}")]
    UnexpectedOutput { operation: String, output: String },
}

impl MediaError {
    fn unexpected(operation: &str, output: &MediaOutput) -> Self {
        MediaError::UnexpectedOutput {
            operation: operation.to_string(),
            output: output.kind().to_string(),
        }
    }

    pub fn is_permission_error(&self) -> bool {
        matches!(self, MediaError::PermissionDenied { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::Busy | MediaError::Unavailable { .. } | MediaError::ReadFailed { .. }
        )
    }
}
