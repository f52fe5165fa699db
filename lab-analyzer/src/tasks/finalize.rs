use async_trait::async_trait;
use lab_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::info;

use crate::session::SessionState;

/// Closes the run with a summary of what succeeded.
pub struct FinalizeTask;

#[async_trait]
impl Task for FinalizeTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let state = SessionState::new(context);
        let failures = state.failures().await;
        let analyzed = state.analysis().await.is_some();
        let recommended = state.recommendation().await.is_some();

        let message = match (analyzed, recommended) {
            (true, true) => "Analysis complete with personalized recommendations",
            (true, false) if failures.recommendation.is_some() => {
                "Analysis complete; personalized recommendations could not be generated"
            }
            (true, false) => "Analysis complete",
            (false, _) if failures.storage.is_some() => {
                "Analysis failed: the upload could not be prepared"
            }
            (false, _) => {
                "Analysis failed. Please try uploading a clearer image with better lighting and readable text."
            }
        };

        info!(analyzed, recommended, "{}", message);
        Ok(TaskResult::new_with_status(
            Some(message.to_string()),
            NextAction::End,
            Some(message.to_string()),
        ))
    }
}
