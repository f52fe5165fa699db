pub mod context;
pub mod error;
pub mod graph;
pub mod runner;
pub mod storage;
pub mod task;

// Re-export commonly used types
pub use context::Context;
pub use error::{GraphError, Result};
pub use graph::{ExecutionResult, ExecutionStatus, Graph, GraphBuilder};
pub use runner::FlowRunner;
pub use storage::{InMemorySessionStorage, Session, SessionStorage};
pub use task::{NextAction, Task, TaskResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordTask {
        id: String,
        next: NextAction,
        calls: Arc<AtomicUsize>,
    }

    impl RecordTask {
        fn new(id: &str, next: NextAction) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let task = Arc::new(Self {
                id: id.to_string(),
                next,
                calls: calls.clone(),
            });
            (task, calls)
        }
    }

    #[async_trait]
    impl Task for RecordTask {
        fn id(&self) -> &str {
            &self.id
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut trail: Vec<String> = context.get("trail").await.unwrap_or_default();
            trail.push(self.id.clone());
            context.set("trail", trail).await?;
            Ok(TaskResult::new_with_status(
                Some(format!("{} done", self.id)),
                self.next.clone(),
                Some(format!("{} ran", self.id)),
            ))
        }
    }

    struct FailingTask;

    #[async_trait]
    impl Task for FailingTask {
        async fn run(&self, context: Context) -> Result<TaskResult> {
            context.set("touched", true).await?;
            Err(GraphError::TaskExecutionFailed("boom".into()))
        }
    }

    #[tokio::test]
    async fn chains_tasks_until_end() {
        let (first, _) = RecordTask::new("first", NextAction::ContinueAndExecute);
        let (second, _) = RecordTask::new("second", NextAction::End);
        let graph = GraphBuilder::new("chain")
            .add_task(first)
            .add_task(second)
            .add_edge("first", "second")
            .build();

        let mut session = Session::new_from_task("s1".into(), "first");
        let result = graph.execute_session(&mut session).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.response.as_deref(), Some("second done"));
        assert_eq!(session.current_task_id, "second");
        assert_eq!(session.status_message.as_deref(), Some("second ran"));
        let trail: Vec<String> = session.context.get("trail").await.unwrap();
        assert_eq!(trail, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn conditional_edge_skips_task_when_condition_fails() {
        let (gate, _) = RecordTask::new("gate", NextAction::ContinueAndExecute);
        let (optional, optional_calls) = RecordTask::new("optional", NextAction::ContinueAndExecute);
        let (finish, finish_calls) = RecordTask::new("finish", NextAction::End);
        let graph = GraphBuilder::new("conditional")
            .add_task(gate)
            .add_task(optional)
            .add_task(finish)
            .add_conditional_edge("gate", "optional", |ctx| {
                ctx.get_sync::<bool>("go").unwrap_or(false)
            })
            .add_edge("gate", "finish")
            .add_edge("optional", "finish")
            .build();

        let mut skipped = Session::new_from_task("s1".into(), "gate");
        graph.execute_session(&mut skipped).await.unwrap();
        assert_eq!(optional_calls.load(Ordering::SeqCst), 0);
        assert_eq!(finish_calls.load(Ordering::SeqCst), 1);

        let mut taken = Session::new_from_task("s2".into(), "gate");
        taken.context.set("go", true).await.unwrap();
        graph.execute_session(&mut taken).await.unwrap();
        assert_eq!(optional_calls.load(Ordering::SeqCst), 1);
        assert_eq!(finish_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn continue_pauses_at_next_task() {
        let (first, _) = RecordTask::new("first", NextAction::Continue);
        let (second, second_calls) = RecordTask::new("second", NextAction::End);
        let graph = GraphBuilder::new("paused")
            .add_task(first)
            .add_task(second)
            .add_edge("first", "second")
            .build();

        let mut session = Session::new_from_task("s1".into(), "first");
        let result = graph.execute_session(&mut session).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Paused);
        assert_eq!(session.current_task_id, "second");
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cycles_hit_step_limit() {
        let (a, _) = RecordTask::new("a", NextAction::ContinueAndExecute);
        let (b, _) = RecordTask::new("b", NextAction::ContinueAndExecute);
        let graph = GraphBuilder::new("loop")
            .add_task(a)
            .add_task(b)
            .add_edge("a", "b")
            .add_edge("b", "a")
            .max_steps(5)
            .build();

        let mut session = Session::new_from_task("s1".into(), "a");
        let err = graph.execute_session(&mut session).await.unwrap_err();
        assert!(matches!(err, GraphError::StepLimitExceeded(5)));
    }

    #[tokio::test]
    async fn runner_persists_session_even_when_task_fails() {
        let failing: Arc<dyn Task> = Arc::new(FailingTask);
        let failing_id = failing.id().to_string();
        let graph = Arc::new(GraphBuilder::new("failing").add_task(failing).build());
        let storage = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(graph, storage.clone());

        storage
            .save(Session::new_from_task("s1".into(), "elsewhere"))
            .await
            .unwrap();
        let err = runner.run_from_start("s1").await.unwrap_err();
        assert!(matches!(err, GraphError::TaskExecutionFailed(_)));

        let session = storage.get("s1").await.unwrap().unwrap();
        assert_eq!(session.current_task_id, failing_id);
        assert!(session.context.contains_key("touched"));
    }

    #[tokio::test]
    async fn runner_reports_missing_session() {
        let graph = Arc::new(Graph::new("empty"));
        let runner = FlowRunner::new(graph, Arc::new(InMemorySessionStorage::new()));
        let err = runner.run("nope").await.unwrap_err();
        assert!(matches!(err, GraphError::SessionNotFound(id) if id == "nope"));
    }
}
