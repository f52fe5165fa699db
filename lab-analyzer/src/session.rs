//! Per-session state, kept in the session's `lab_flow::Context`.
//!
//! Each HTTP request loads its own session from storage and wraps the
//! context here; there is no process-wide state to cross-contaminate.

use chrono::Utc;
use lab_flow::{Context, Result};

use crate::{
    intake,
    models::{
        AnalysisResult, RecommendationResult, RunFailures, SessionResponse, UploadMetadata,
        UploadedDocument,
    },
    profile::UserProfile,
};

pub mod keys {
    pub const UPLOAD: &str = "upload";
    pub const UPLOAD_METADATA: &str = "upload_metadata";
    pub const PROFILE: &str = "profile";
    pub const ANALYSIS: &str = "analysis";
    pub const RECOMMENDATION: &str = "recommendation";
    pub const FAILURES: &str = "failures";
    pub const WITH_RECOMMENDATIONS: &str = "with_recommendations";
}

#[derive(Clone, Debug)]
pub struct SessionState {
    context: Context,
}

impl SessionState {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    pub async fn upload(&self) -> Option<UploadedDocument> {
        self.context.get(keys::UPLOAD).await
    }

    /// Summary of the current upload, stored beside it so reads stay cheap.
    pub async fn upload_metadata(&self) -> Option<UploadMetadata> {
        self.context.get(keys::UPLOAD_METADATA).await
    }

    /// Replaces the upload. Results of the previous document's run go with it.
    pub async fn set_upload(&self, doc: UploadedDocument) -> Result<()> {
        self.clear_results().await?;
        self.context
            .set(keys::UPLOAD_METADATA, intake::metadata(&doc))
            .await?;
        self.context.set(keys::UPLOAD, doc).await
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.context.get(keys::PROFILE).await
    }

    pub async fn set_profile(&self, profile: UserProfile) -> Result<()> {
        self.context.set(keys::PROFILE, profile).await
    }

    pub async fn analysis(&self) -> Option<AnalysisResult> {
        self.context.get(keys::ANALYSIS).await
    }

    pub async fn set_analysis(&self, text: String) -> Result<()> {
        let result = AnalysisResult {
            text,
            generated_at: Utc::now(),
        };
        self.context.set(keys::ANALYSIS, result).await
    }

    pub async fn recommendation(&self) -> Option<RecommendationResult> {
        self.context.get(keys::RECOMMENDATION).await
    }

    pub async fn set_recommendation(&self, text: String) -> Result<()> {
        let result = RecommendationResult {
            text,
            generated_at: Utc::now(),
        };
        self.context.set(keys::RECOMMENDATION, result).await
    }

    pub async fn failures(&self) -> RunFailures {
        self.context.get(keys::FAILURES).await.unwrap_or_default()
    }

    pub async fn record_failure(&self, update: impl FnOnce(&mut RunFailures)) -> Result<()> {
        let mut failures = self.failures().await;
        update(&mut failures);
        self.context.set(keys::FAILURES, failures).await
    }

    pub fn wants_recommendations(&self) -> bool {
        self.context
            .get_sync(keys::WITH_RECOMMENDATIONS)
            .unwrap_or(true)
    }

    /// Starts a fresh run: the previous analysis, recommendation and failures
    /// are cleared, so a failed run never shows an older recommendation.
    pub async fn begin_run(&self, with_recommendations: bool) -> Result<()> {
        self.clear_results().await?;
        self.context
            .set(keys::WITH_RECOMMENDATIONS, with_recommendations)
            .await
    }

    async fn clear_results(&self) -> Result<()> {
        self.context.remove(keys::ANALYSIS).await;
        self.context.remove(keys::RECOMMENDATION).await;
        self.context.remove(keys::FAILURES).await;
        Ok(())
    }

    pub async fn report_available(&self) -> bool {
        self.upload_metadata().await.is_some() && self.analysis().await.is_some()
    }

    pub async fn snapshot(&self, session_id: &str, status_message: Option<String>) -> SessionResponse {
        let upload = self.upload_metadata().await;
        let analysis = self.analysis().await;
        SessionResponse {
            session_id: session_id.to_string(),
            report_available: upload.is_some() && analysis.is_some(),
            upload,
            profile: self.profile().await.map(|p| p.to_blob()),
            analysis: analysis.map(|a| a.text),
            recommendation: self.recommendation().await.map(|r| r.text),
            failures: self.failures().await,
            status_message,
        }
    }
}
