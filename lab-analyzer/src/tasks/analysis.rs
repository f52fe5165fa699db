use async_trait::async_trait;
use lab_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::prompts::{ANALYSIS_QUERY, ANALYZER};
use crate::{
    agent::{AgentPayload, Attachment, ReasoningAgent},
    error::{LabError, LabResult},
    models::MediaType,
    session::SessionState,
    staging,
};

/// Sends the staged lab report to the analyzer and returns its text verbatim.
pub async fn analyze(
    agent: &dyn ReasoningAgent,
    staged_path: &Path,
    media_type: MediaType,
) -> LabResult<String> {
    let payload = AgentPayload::with_attachment(
        ANALYSIS_QUERY,
        Attachment {
            path: staged_path.to_path_buf(),
            media_type,
        },
    );

    let text = agent
        .run(&ANALYZER, payload)
        .await
        .map_err(|e| LabError::AnalysisFailed(e.to_string()))?;

    let text = text.trim();
    if text.is_empty() {
        return Err(LabError::AnalysisFailed(
            "the model returned an empty analysis".to_string(),
        ));
    }
    Ok(text.to_string())
}

/// Stages the session's upload, runs the analysis, and always releases the
/// staged file before returning.
pub struct AnalysisTask {
    agent: Arc<dyn ReasoningAgent>,
    staging_dir: Option<PathBuf>,
}

impl AnalysisTask {
    pub fn new(agent: Arc<dyn ReasoningAgent>, staging_dir: Option<PathBuf>) -> Self {
        Self { agent, staging_dir }
    }
}

#[async_trait]
impl Task for AnalysisTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(task_id = %self.id(), "Starting lab report analysis");
        let state = SessionState::new(context);

        let upload = state
            .upload()
            .await
            .ok_or_else(|| GraphError::ContextError("upload not found in session".to_string()))?;

        let staged = match staging::stage(&upload, self.staging_dir.as_deref()) {
            Ok(staged) => staged,
            Err(e) => {
                error!(filename = %upload.filename, "{}", e);
                state
                    .record_failure(|f| f.storage = Some(e.to_string()))
                    .await?;
                return Ok(TaskResult::new_with_status(
                    None,
                    NextAction::ContinueAndExecute,
                    Some("Upload could not be staged; analysis skipped".to_string()),
                ));
            }
        };

        let outcome = analyze(self.agent.as_ref(), staged.path(), upload.media_type).await;
        if let Err(e) = staged.release() {
            warn!("{}", e);
        }

        let status = match outcome {
            Ok(text) => {
                info!(chars = text.len(), "Lab report analysis completed");
                state.set_analysis(text).await?;
                "Lab report analyzed"
            }
            Err(e) => {
                error!("{}", e);
                state
                    .record_failure(|f| f.analysis = Some(e.to_string()))
                    .await?;
                "Lab report analysis failed"
            }
        };

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(status.to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::StubAgent;

    #[tokio::test]
    async fn returns_trimmed_text_and_sends_attachment() {
        let agent = StubAgent::new().reply(ANALYZER.name, "  **Test Summary:** ok \n");
        let text = analyze(&agent, Path::new("/tmp/x.png"), MediaType::Png)
            .await
            .unwrap();
        assert_eq!(text, "**Test Summary:** ok");

        let calls = agent.calls();
        let (_, payload) = &calls[0];
        assert_eq!(payload.query, ANALYSIS_QUERY);
        let attachment = payload.attachment.as_ref().unwrap();
        assert_eq!(attachment.path, Path::new("/tmp/x.png"));
        assert_eq!(attachment.media_type, MediaType::Png);
    }

    #[tokio::test]
    async fn remote_error_and_empty_text_are_failures() {
        let agent = StubAgent::new()
            .fail(ANALYZER.name, "503 Service Unavailable")
            .reply(ANALYZER.name, "   ");

        let first = analyze(&agent, Path::new("a.png"), MediaType::Png).await;
        assert!(matches!(first, Err(LabError::AnalysisFailed(m)) if m.contains("503")));

        let second = analyze(&agent, Path::new("a.png"), MediaType::Png).await;
        assert!(matches!(second, Err(LabError::AnalysisFailed(_))));
    }
}
