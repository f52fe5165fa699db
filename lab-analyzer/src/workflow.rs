use lab_flow::{FlowRunner, Graph, GraphBuilder, Session, SessionStorage, Task};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    agent::ReasoningAgent,
    session::{SessionState, keys},
    tasks::{AnalysisTask, FinalizeTask, RecommendationTask},
};

/// analysis -> [recommendation] -> finalize. The recommendation step only
/// runs when this run produced an analysis and asked for recommendations.
pub fn build_lab_workflow(agent: Arc<dyn ReasoningAgent>, staging_dir: Option<PathBuf>) -> Graph {
    let analysis_task = Arc::new(AnalysisTask::new(agent.clone(), staging_dir));
    let analysis_id = analysis_task.id().to_string();

    let recommendation_task = Arc::new(RecommendationTask::new(agent));
    let recommendation_id = recommendation_task.id().to_string();

    let finalize_task = Arc::new(FinalizeTask);
    let finalize_id = finalize_task.id().to_string();

    GraphBuilder::new("lab_workflow")
        .add_task(analysis_task)
        .add_task(recommendation_task)
        .add_task(finalize_task)
        .add_conditional_edge(&analysis_id, &recommendation_id, |ctx| {
            ctx.contains_key(keys::ANALYSIS)
                && SessionState::new(ctx.clone()).wants_recommendations()
        })
        .add_edge(&analysis_id, &finalize_id)
        .add_edge(&recommendation_id, &finalize_id)
        .build()
}

pub fn create_lab_session() -> Session {
    let session_id = Uuid::new_v4().to_string();
    let start = std::any::type_name::<AnalysisTask>();
    Session::new_from_task(session_id, start)
}

pub fn create_flow_runner(
    session_storage: Arc<dyn SessionStorage>,
    agent: Arc<dyn ReasoningAgent>,
    staging_dir: Option<PathBuf>,
) -> FlowRunner {
    let graph = Arc::new(build_lab_workflow(agent, staging_dir));
    FlowRunner::new(graph, session_storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agent::StubAgent,
        intake::{accept_upload, tests::png_bytes},
        profile::UserProfile,
        tasks::prompts::{ANALYZER, WELLNESS_ADVISOR},
    };
    use lab_flow::{ExecutionStatus, InMemorySessionStorage};

    async fn prepared_session(storage: &Arc<dyn SessionStorage>, with_recs: bool) -> String {
        let session = create_lab_session();
        let id = session.id.clone();
        let state = SessionState::new(session.context.clone());
        let doc = accept_upload("cbc.png", Some("image/png"), png_bytes(40, 20)).unwrap();
        state.set_upload(doc).await.unwrap();
        state.begin_run(with_recs).await.unwrap();
        storage.save(session).await.unwrap();
        id
    }

    async fn state_of(storage: &Arc<dyn SessionStorage>, id: &str) -> SessionState {
        let session = storage.get(id).await.unwrap().unwrap();
        SessionState::new(session.context)
    }

    #[tokio::test]
    async fn session_starts_at_analysis() {
        let graph = build_lab_workflow(Arc::new(StubAgent::new()), None);
        let session = create_lab_session();
        assert_eq!(Some(session.current_task_id.as_str()), graph.start_task_id());
    }

    #[tokio::test]
    async fn full_run_stores_analysis_and_recommendation() {
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let agent = Arc::new(
            StubAgent::new()
                .reply(ANALYZER.name, "Hemoglobin 10.1 g/dL (LOW)")
                .reply(WELLNESS_ADVISOR.name, "Add lentils and spinach."),
        );
        let runner = create_flow_runner(storage.clone(), agent.clone(), None);
        let id = prepared_session(&storage, true).await;

        let result = runner.run_from_start(&id).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);

        let state = state_of(&storage, &id).await;
        assert_eq!(state.analysis().await.unwrap().text, "Hemoglobin 10.1 g/dL (LOW)");
        assert_eq!(
            state.recommendation().await.unwrap().text,
            "Add lentils and spinach."
        );
        assert!(state.failures().await.is_empty());

        let (_, rec_payload) = agent.calls().remove(1);
        assert!(rec_payload.query.contains("Hemoglobin 10.1 g/dL (LOW)"));
    }

    #[tokio::test]
    async fn failed_analysis_never_calls_recommendation() {
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let agent = Arc::new(StubAgent::new().fail(ANALYZER.name, "timeout"));
        let runner = create_flow_runner(storage.clone(), agent.clone(), None);
        let id = prepared_session(&storage, true).await;

        let result = runner.run_from_start(&id).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(agent.call_count(ANALYZER.name), 1);
        assert_eq!(agent.call_count(WELLNESS_ADVISOR.name), 0);

        let state = state_of(&storage, &id).await;
        assert!(state.analysis().await.is_none());
        assert!(state.failures().await.analysis.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn recommendation_failure_keeps_analysis() {
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let agent = Arc::new(
            StubAgent::new()
                .reply(ANALYZER.name, "T1")
                .fail(WELLNESS_ADVISOR.name, "quota exceeded"),
        );
        let runner = create_flow_runner(storage.clone(), agent, None);
        let id = prepared_session(&storage, true).await;
        {
            let state = state_of(&storage, &id).await;
            state
                .set_profile(UserProfile {
                    age: Some(52),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let result = runner.run_from_start(&id).await.unwrap();
        assert_eq!(
            result.response.as_deref(),
            Some("Analysis complete; personalized recommendations could not be generated")
        );

        let state = state_of(&storage, &id).await;
        assert_eq!(state.analysis().await.unwrap().text, "T1");
        assert!(state.recommendation().await.is_none());
        assert!(
            state
                .failures()
                .await
                .recommendation
                .unwrap()
                .contains("quota exceeded")
        );
    }

    #[tokio::test]
    async fn recommendations_can_be_skipped() {
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let agent = Arc::new(StubAgent::new().reply(ANALYZER.name, "All values normal"));
        let runner = create_flow_runner(storage.clone(), agent.clone(), None);
        let id = prepared_session(&storage, false).await;

        runner.run_from_start(&id).await.unwrap();
        assert_eq!(agent.call_count(WELLNESS_ADVISOR.name), 0);
        assert!(state_of(&storage, &id).await.failures().await.is_empty());
    }

    #[tokio::test]
    async fn staged_file_is_removed_after_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let agent = Arc::new(
            StubAgent::new()
                .reply(ANALYZER.name, "ok")
                .reply(WELLNESS_ADVISOR.name, "ok"),
        );
        let runner = create_flow_runner(storage.clone(), agent.clone(), Some(dir.path().into()));
        let id = prepared_session(&storage, true).await;

        runner.run_from_start(&id).await.unwrap();

        let (_, payload) = agent.calls().remove(0);
        let staged = payload.attachment.unwrap().path;
        assert!(staged.starts_with(dir.path()));
        assert!(!staged.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_staging_dir_is_a_storage_failure() {
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let agent = Arc::new(StubAgent::new());
        let runner = create_flow_runner(
            storage.clone(),
            agent.clone(),
            Some(PathBuf::from("/nonexistent/lab-staging")),
        );
        let id = prepared_session(&storage, true).await;

        runner.run_from_start(&id).await.unwrap();
        assert!(agent.calls().is_empty());
        let failures = state_of(&storage, &id).await.failures().await;
        assert!(failures.storage.is_some());
        assert!(failures.analysis.is_none());
    }
}
