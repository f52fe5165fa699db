use async_trait::async_trait;
use lab_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{error, info};

use super::prompts::{WELLNESS_ADVISOR, recommendation_query};
use crate::{
    agent::{AgentPayload, ReasoningAgent},
    error::{LabError, LabResult},
    session::SessionState,
};

pub async fn recommend(
    agent: &dyn ReasoningAgent,
    analysis_text: &str,
    profile_text: &str,
) -> LabResult<String> {
    let payload = AgentPayload::text(recommendation_query(analysis_text, profile_text));
    let text = agent
        .run(&WELLNESS_ADVISOR, payload)
        .await
        .map_err(|e| LabError::RecommendationFailed(e.to_string()))?;

    let text = text.trim();
    if text.is_empty() {
        return Err(LabError::RecommendationFailed(
            "the model returned no recommendations".to_string(),
        ));
    }
    Ok(text.to_string())
}

/// Personalized recommendations from the analysis and the profile blob.
/// Only reached when the analysis in this run succeeded.
pub struct RecommendationTask {
    agent: Arc<dyn ReasoningAgent>,
}

impl RecommendationTask {
    pub fn new(agent: Arc<dyn ReasoningAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Task for RecommendationTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(task_id = %self.id(), "Starting personalized recommendations");
        let state = SessionState::new(context);

        let analysis = state
            .analysis()
            .await
            .ok_or_else(|| GraphError::ContextError("analysis not found in session".to_string()))?;
        let profile = state.profile().await.unwrap_or_default();

        let status = match recommend(self.agent.as_ref(), &analysis.text, &profile.to_blob()).await
        {
            Ok(text) => {
                info!(chars = text.len(), "Recommendations generated");
                state.set_recommendation(text).await?;
                "Personalized recommendations generated"
            }
            Err(e) => {
                error!("{}", e);
                state
                    .record_failure(|f| f.recommendation = Some(e.to_string()))
                    .await?;
                "Recommendations unavailable"
            }
        };

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(status.to_string()),
        ))
    }
}
