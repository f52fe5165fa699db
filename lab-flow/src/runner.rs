//! `FlowRunner` loads a session, executes the graph from the session's
//! current task, and saves the updated session back to storage.
//!
//! Create it once at startup and share it across requests:
//! ```ignore
//! let result = state.flow_runner.run(&session_id).await?;
//! ```
//! Use `Graph::execute_session` directly when the caller needs to inspect or
//! modify the session before it is persisted.

use std::sync::Arc;

use crate::{
    error::{GraphError, Result},
    graph::{ExecutionResult, Graph},
    storage::SessionStorage,
};

#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
    storage: Arc<dyn SessionStorage>,
}

impl FlowRunner {
    pub fn new(graph: Arc<Graph>, storage: Arc<dyn SessionStorage>) -> Self {
        Self { graph, storage }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Runs the session and persists it, also when a task failed, so context
    /// writes made before the failure are kept.
    pub async fn run(&self, session_id: &str) -> Result<ExecutionResult> {
        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| GraphError::SessionNotFound(session_id.to_string()))?;

        let result = self.graph.execute_session(&mut session).await;
        self.storage.save(session).await?;
        result
    }

    /// Points the session at the graph's start task, then runs it.
    pub async fn run_from_start(&self, session_id: &str) -> Result<ExecutionResult> {
        let start = self
            .graph
            .start_task_id()
            .ok_or_else(|| GraphError::TaskNotFound("<start>".to_string()))?
            .to_string();

        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| GraphError::SessionNotFound(session_id.to_string()))?;
        session.current_task_id = start;
        self.storage.save(session).await?;

        self.run(session_id).await
    }
}
