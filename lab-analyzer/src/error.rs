use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;

/// Every failure the lab pipeline and its HTTP surface can report.
#[derive(Debug, Error)]
pub enum LabError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("unsupported upload type '{declared}' for '{filename}'; accepted: jpg, jpeg, png, webp, pdf")]
    UnsupportedUploadType { filename: String, declared: String },

    #[error("could not read image: {0}")]
    UnreadableImage(String),

    #[error("lab report analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("recommendation generation failed: {0}")]
    RecommendationFailed(String),

    #[error("report composition failed: {0}")]
    CompositionFailed(String),

    #[error("could not stage upload: {0}")]
    Storage(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("upload a lab report before running this step")]
    MissingUpload,

    #[error("no analysis available yet; run an analysis first")]
    NoAnalysis,

    #[error("{0}")]
    BadRequest(String),

    #[error("upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LabError {
    /// Stable machine-readable kind used in JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::UnsupportedUploadType { .. } => "unsupported_upload_type",
            Self::UnreadableImage(_) => "unreadable_image",
            Self::AnalysisFailed(_) => "analysis_failed",
            Self::RecommendationFailed(_) => "recommendation_failed",
            Self::CompositionFailed(_) => "composition_failed",
            Self::Storage(_) => "storage_error",
            Self::SessionNotFound(_) => "session_not_found",
            Self::MissingUpload => "missing_upload",
            Self::NoAnalysis => "no_analysis",
            Self::BadRequest(_) => "bad_request",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedUploadType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::UnreadableImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::MissingUpload | Self::NoAnalysis => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::AnalysisFailed(_) | Self::RecommendationFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_)
            | Self::CompositionFailed(_)
            | Self::Storage(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<lab_flow::GraphError> for LabError {
    fn from(e: lab_flow::GraphError) -> Self {
        match e {
            lab_flow::GraphError::SessionNotFound(id) => Self::SessionNotFound(id),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for LabError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(e.body_text())
        } else {
            Self::BadRequest(format!("invalid multipart body: {e}"))
        }
    }
}

impl From<tokio::task::JoinError> for LabError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for LabError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(kind = self.kind(), "{}", self);
        }
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type LabResult<T> = Result<T, LabError>;
