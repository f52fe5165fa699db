use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    context::Context,
    error::{GraphError, Result},
    storage::Session,
    task::{NextAction, Task, TaskResult},
};

/// Upper bound on tasks chained by `ContinueAndExecute` in one call.
pub const DEFAULT_MAX_STEPS: usize = 32;

/// Predicate over the session context deciding whether an edge is taken.
pub type EdgeCondition = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Directed link between two task ids, optionally guarded.
#[derive(Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub condition: Option<EdgeCondition>,
}

/// Tasks keyed by id, the edges between them, and where a run starts.
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: Vec<Edge>,
    start_task_id: Option<String>,
    max_steps: usize,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            edges: Vec::new(),
            start_task_id: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Run the session's current task, following `ContinueAndExecute` until a
    /// task ends the run, pauses it, or has no outgoing edge.
    pub async fn execute_session(&self, session: &mut Session) -> Result<ExecutionResult> {
        let mut steps = 0;
        loop {
            steps += 1;
            if steps > self.max_steps {
                return Err(GraphError::StepLimitExceeded(self.max_steps));
            }

            let result = self
                .execute_single_task(&session.current_task_id, session.context.clone())
                .await?;
            session.status_message = result.status_message.clone();

            match result.next_action {
                NextAction::End => {
                    session.current_task_id = result.task_id;
                    return Ok(ExecutionResult {
                        response: result.response,
                        status: ExecutionStatus::Completed,
                    });
                }
                NextAction::Continue => {
                    if let Some(next) = self.find_next_task(&result.task_id, &session.context) {
                        session.current_task_id = next;
                    }
                    return Ok(ExecutionResult {
                        response: result.response,
                        status: ExecutionStatus::Paused,
                    });
                }
                NextAction::ContinueAndExecute => {
                    match self.find_next_task(&result.task_id, &session.context) {
                        Some(next) => {
                            debug!(from = %result.task_id, to = %next, "following edge");
                            session.current_task_id = next;
                        }
                        None => {
                            session.current_task_id = result.task_id;
                            return Ok(ExecutionResult {
                                response: result.response,
                                status: ExecutionStatus::Paused,
                            });
                        }
                    }
                }
            }
        }
    }

    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| GraphError::TaskNotFound(task_id.to_string()))?;

        info!(graph = %self.id, task_id = %task_id, "running task");
        let mut result = task.run(context).await?;
        result.task_id = task_id.to_string();
        Ok(result)
    }

    /// First matching edge wins: a conditional edge matches when its
    /// condition holds, an unconditional edge always matches.
    pub fn find_next_task(&self, current_task_id: &str, context: &Context) -> Option<String> {
        self.edges
            .iter()
            .filter(|edge| edge.from == current_task_id)
            .find(|edge| edge.condition.as_ref().is_none_or(|cond| cond(context)))
            .map(|edge| edge.to.clone())
    }

    pub fn start_task_id(&self) -> Option<&str> {
        self.start_task_id.as_deref()
    }

    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_id).cloned()
    }
}

/// Assembles a [`Graph`]; the first task added becomes the start task.
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(id),
        }
    }

    /// Adds a task; the first task added becomes the start task.
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.graph.tasks.is_empty() {
            self.graph.start_task_id = Some(task_id.clone());
        }
        self.graph.tasks.insert(task_id, task);
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            condition: None,
        });
        self
    }

    pub fn add_conditional_edge<F>(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        condition: F,
    ) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.graph.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            condition: Some(Arc::new(condition)),
        });
        self
    }

    pub fn set_start_task(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        if self.graph.tasks.contains_key(&task_id) {
            self.graph.start_task_id = Some(task_id);
        }
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.graph.max_steps = max_steps;
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// What one `execute_session` call produced.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The run stopped before an `End`; calling again resumes at the current task
    Paused,
    /// A task ended the run
    Completed,
}
