use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::{ActivityLevel, Gender};

/// Media types accepted at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Jpeg,
    Png,
    Webp,
    Pdf,
}

impl MediaType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            "application/pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Pdf => "pdf",
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(self, Self::Pdf)
    }
}

/// An accepted upload. Bytes travel base64-encoded when the session context
/// serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedDocument {
    pub filename: String,
    pub media_type: MediaType,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadedDocument {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadMetadata {
    pub filename: String,
    pub media_type: MediaType,
    pub mime: String,
    pub size_bytes: usize,
    /// Size in kilobytes, one decimal place
    pub size_kb: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

/// Failures recorded during the latest analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailures {
    pub storage: Option<String>,
    pub analysis: Option<String>,
    pub recommendation: Option<String>,
}

impl RunFailures {
    pub fn is_empty(&self) -> bool {
        self.storage.is_none() && self.analysis.is_none() && self.recommendation.is_none()
    }
}

/// Profile form as submitted by the page. Out-of-range ages are clamped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileForm {
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub activity_level: Option<String>,
    #[serde(default)]
    pub conditions: String,
    #[serde(default)]
    pub medications: String,
    #[serde(default)]
    pub dietary_preferences: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub with_recommendations: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub session_id: String,
    pub status: String,
    pub message: Option<String>,
    pub analysis: Option<String>,
    pub recommendation: Option<String>,
    pub failures: RunFailures,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub upload: Option<UploadMetadata>,
    pub profile: Option<String>,
    pub analysis: Option<String>,
    pub recommendation: Option<String>,
    pub failures: RunFailures,
    pub status_message: Option<String>,
    pub report_available: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub gender: Option<Gender>,
    pub activity_level: Option<ActivityLevel>,
    pub age: Option<u8>,
    pub profile: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub parameter: String,
    pub value: String,
    pub reference_range: String,
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}
