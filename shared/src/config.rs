use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::capabilities::{PickConfig, UrlError, ValidatedUrl, MAX_IMAGE_SIZE_BYTES};
use crate::{AppError, ErrorKind, MAX_IMAGE_BYTES};

pub const MAX_OWNER_ID_LENGTH: usize = 128;

/// Everything the form needs from its host. Supplied by the shell with
/// `Event::Start` once the signed-in owner is known. Request timeouts are
/// left to the shell's HTTP client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormConfig {
    pub owner_id: String,
    /// Object-store base; the object name is appended as path segments.
    pub upload_url: String,
    pub intake_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    #[serde(default)]
    pub pick: PickConfig,
}

fn default_max_image_bytes() -> usize {
    MAX_IMAGE_BYTES
}

impl fmt::Debug for FormConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormConfig")
            .field("owner_id", &self.owner_id)
            .field("upload_url", &self.upload_url)
            .field("intake_url", &self.intake_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("max_image_bytes", &self.max_image_bytes)
            .field("pick", &self.pick)
            .finish()
    }
}

impl FormConfig {
    pub fn new(
        owner_id: impl Into<String>,
        upload_url: impl Into<String>,
        intake_url: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            upload_url: upload_url.into(),
            intake_url: intake_url.into(),
            auth_token: None,
            max_image_bytes: MAX_IMAGE_BYTES,
            pick: PickConfig::default(),
        }
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_max_image_bytes(mut self, max: usize) -> Self {
        self.max_image_bytes = max;
        self
    }

    #[must_use]
    pub fn with_pick(mut self, pick: PickConfig) -> Self {
        self.pick = pick;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_owner_id(&self.owner_id)?;
        self.upload_endpoint()?;
        self.intake_endpoint()?;

        if self.max_image_bytes == 0 || self.max_image_bytes > MAX_IMAGE_SIZE_BYTES {
            return Err(ConfigError::ImageLimitOutOfRange {
                value: self.max_image_bytes,
                max: MAX_IMAGE_SIZE_BYTES,
            });
        }

        if matches!(&self.auth_token, Some(token) if token.trim().is_empty()) {
            return Err(ConfigError::EmptyAuthToken);
        }

        Ok(())
    }

    pub fn upload_endpoint(&self) -> Result<ValidatedUrl, ConfigError> {
        ValidatedUrl::new(self.upload_url.as_str()).map_err(|error| ConfigError::InvalidEndpoint {
            field: "upload_url",
            error,
        })
    }

    pub fn intake_endpoint(&self) -> Result<ValidatedUrl, ConfigError> {
        ValidatedUrl::new(self.intake_url.as_str()).map_err(|error| ConfigError::InvalidEndpoint {
            field: "intake_url",
            error,
        })
    }
}

/// Owner ids become the first path segment of every uploaded object.
fn validate_owner_id(owner_id: &str) -> Result<(), ConfigError> {
    if owner_id.trim().is_empty() {
        return Err(ConfigError::MissingOwner);
    }
    if owner_id.len() > MAX_OWNER_ID_LENGTH {
        return Err(ConfigError::InvalidOwner {
            reason: format!("longer than {MAX_OWNER_ID_LENGTH} bytes"),
        });
    }
    if owner_id == "." || owner_id == ".." {
        return Err(ConfigError::InvalidOwner {
            reason: "reserved path segment".to_string(),
        });
    }
    if let Some(c) = owner_id
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.' | '@'))
    {
        return Err(ConfigError::InvalidOwner {
            reason: format!("invalid character {c:?}"),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("owner id is missing")]
    MissingOwner,
    #[error("owner id is invalid: {reason}")]
    InvalidOwner { reason: String },
    #[error("{field} is invalid: {error}")]
    InvalidEndpoint {
        field: &'static str,
        #[source]
        error: UrlError,
    },
    #[error("max_image_bytes must be within 1..={max}, got {value}")]
    ImageLimitOutOfRange { value: usize, max: usize },
    #[error("auth token is empty")]
    EmptyAuthToken,
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Configuration, "invalid form configuration")
            .with_internal(e.to_string())
    }
}
