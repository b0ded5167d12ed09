use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{Delivery, ValidatedUrl};
use crate::config::{ConfigError, FormConfig};
use crate::model::ReportDraft;
use crate::{AppError, ErrorKind, Outcome, Stage};

pub const EMPTY_DESCRIPTION_MESSAGE: &str = "Please describe the incident.";

/// Body of the intake request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub description: String,
    pub image: Option<String>,
}

impl ReportPayload {
    /// The description is trimmed; the image is the remote reference when the
    /// upload succeeded, otherwise the device-local URI.
    pub fn from_draft(draft: &ReportDraft) -> Result<Self, SubmissionError> {
        let description = draft.description.trim();
        if description.is_empty() {
            return Err(SubmissionError::EmptyDescription);
        }
        Ok(Self {
            description: description.to_string(),
            image: draft
                .image
                .as_ref()
                .map(|image| image.submission_ref().to_string()),
        })
    }
}

/// A JSON POST to the intake endpoint. The bearer token is attached when sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSubmission {
    pub url: ValidatedUrl,
    pub body: Vec<u8>,
}

/// Validates the draft and builds the intake POST. Nothing is sent here.
pub fn prepare(
    config: &FormConfig,
    draft: &ReportDraft,
) -> Result<PreparedSubmission, SubmissionError> {
    let payload = ReportPayload::from_draft(draft)?;
    let url = config.intake_endpoint()?;
    let body =
        serde_json::to_vec(&payload).map_err(|e| SubmissionError::Encode(e.to_string()))?;
    Ok(PreparedSubmission { url, body })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub outcome: Outcome,
    pub error_kind: Option<ErrorKind>,
    pub status: Option<u16>,
    pub detail: Option<String>,
}

impl SubmissionResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    #[must_use]
    pub fn app_error(&self) -> Option<AppError> {
        let kind = self.error_kind?;
        let mut error = AppError::new(kind, "report submission failed").with_stage(Stage::Submission);
        if let Some(status) = self.status {
            error = error.with_context("status", status.to_string());
        }
        if let Some(detail) = &self.detail {
            error = error.with_internal(detail.clone());
        }
        Some(error)
    }
}

/// Only 2xx is a successful submission.
#[must_use]
pub fn interpret(delivery: Delivery) -> SubmissionResult {
    match delivery {
        Delivery::Accepted { status } => SubmissionResult {
            outcome: Outcome::Success,
            error_kind: None,
            status: Some(status),
            detail: None,
        },
        Delivery::Rejected { status, message } => SubmissionResult {
            outcome: Outcome::Failure,
            error_kind: Some(ErrorKind::SubmissionFailed),
            status: Some(status),
            detail: message,
        },
        Delivery::Unreachable { reason } => SubmissionResult {
            outcome: Outcome::Failure,
            error_kind: Some(ErrorKind::NetworkUnavailable),
            status: None,
            detail: Some(reason),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("description is empty")]
    EmptyDescription,
    #[error("intake endpoint misconfigured: {0}")]
    Config(#[from] ConfigError),
    #[error("could not encode report: {0}")]
    Encode(String),
}

impl From<SubmissionError> for AppError {
    fn from(e: SubmissionError) -> Self {
        match e {
            SubmissionError::EmptyDescription => {
                AppError::new(ErrorKind::Validation, EMPTY_DESCRIPTION_MESSAGE)
                    .with_stage(Stage::Submission)
            }
            SubmissionError::Config(config) => AppError::from(config).with_stage(Stage::Submission),
            SubmissionError::Encode(detail) => {
                AppError::new(ErrorKind::Internal, "could not encode report")
                    .with_stage(Stage::Submission)
                    .with_internal(detail)
            }
        }
    }
}
