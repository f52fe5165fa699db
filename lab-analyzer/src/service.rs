use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post, put},
};
use chrono::Local;
use lab_flow::{ExecutionStatus, FlowRunner, InMemorySessionStorage, Session, SessionStorage};
use serde_json::{Value, json};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    agent::{GeminiAgent, ReasoningAgent, TavilySearch},
    config::Config,
    error::{LabError, LabResult},
    health_status::{self, ClassifiedValue},
    intake,
    models::{
        AnalyzeRequest, AnalyzeResponse, ClassifyRequest, ProfileForm, ProfileResponse,
        SessionResponse, UploadMetadata,
    },
    profile::UserProfile,
    report,
    session::SessionState,
    workflow::{create_flow_runner, create_lab_session},
};

type ApiResult<T> = Result<Json<T>, LabError>;

/// Lists report sections that had to be left out, joined with "; ".
pub const REPORT_WARNINGS_HEADER: &str = "x-report-warnings";

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Upper bound on how often idle sessions are swept.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub session_storage: Arc<dyn SessionStorage>,
    pub flow_runner: FlowRunner,
    pub config: Arc<Config>,
}

/// Builds the service against the live Gemini and Tavily APIs.
pub fn create_app(config: Config) -> LabResult<Router> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| LabError::Internal(format!("failed to build HTTP client: {e}")))?;

    let search = Arc::new(TavilySearch::new(
        client.clone(),
        config.tavily_api_key.clone(),
        config.tavily_base_url.clone(),
        config.search_results,
    ));
    let agent = Arc::new(GeminiAgent::new(
        client,
        config.google_api_key.clone(),
        config.gemini_base_url.clone(),
        config.model.clone(),
        search,
        config.max_tool_rounds,
    ));
    info!(model = %config.model, "Gemini agent configured");

    Ok(create_app_with_agent(config, agent))
}

/// Same service with any reasoning agent, e.g. a scripted one.
pub fn create_app_with_agent(config: Config, agent: Arc<dyn ReasoningAgent>) -> Router {
    let storage = Arc::new(InMemorySessionStorage::new());
    if tokio::runtime::Handle::try_current().is_ok() {
        spawn_session_sweeper(Arc::downgrade(&storage), config.session_ttl);
    } else {
        warn!("No async runtime; idle sessions will not be evicted");
    }
    let session_storage: Arc<dyn SessionStorage> = storage;
    let flow_runner = create_flow_runner(session_storage.clone(), agent, config.staging_dir.clone());

    build_router(AppState {
        session_storage,
        flow_runner,
        config: Arc::new(config),
    })
}

/// Periodically drops sessions idle for longer than `ttl`. Stops once the
/// storage itself is gone.
pub fn spawn_session_sweeper(
    storage: Weak<InMemorySessionStorage>,
    ttl: Duration,
) -> tokio::task::JoinHandle<()> {
    let period = ttl.min(MAX_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(live) = storage.upgrade() else {
                break;
            };
            let evicted = live.evict_idle(ttl);
            if evicted > 0 {
                info!(evicted, remaining = live.len(), "Idle sessions evicted");
            }
        }
    })
}

pub fn build_router(app_state: AppState) -> Router {
    let body_limit = app_state.config.max_upload_bytes + MULTIPART_OVERHEAD;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/lab/sessions", post(create_session))
        .route("/lab/classify", post(classify_value))
        .route("/lab/{session_id}", get(get_session).delete(delete_session))
        .route("/lab/{session_id}/upload", post(upload_report))
        .route("/lab/{session_id}/preview", get(preview_upload))
        .route("/lab/{session_id}/profile", put(update_profile))
        .route("/lab/{session_id}/analyze", post(run_analysis))
        .route("/lab/{session_id}/report", get(download_report))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn load_session(state: &AppState, session_id: &str) -> LabResult<Session> {
    state
        .session_storage
        .get(session_id)
        .await?
        .ok_or_else(|| LabError::SessionNotFound(session_id.to_string()))
}

async fn create_session(State(state): State<AppState>) -> LabResult<(StatusCode, Json<Value>)> {
    let session = create_lab_session();
    let session_id = session.id.clone();
    state.session_storage.save(session).await?;

    info!(session_id = %session_id, "Session created");
    Ok((StatusCode::CREATED, Json(json!({ "session_id": session_id }))))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    let snapshot = SessionState::new(session.context)
        .snapshot(&session_id, session.status_message)
        .await;
    Ok(Json(snapshot))
}

/// Ends a session early, e.g. when the page is closed.
async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> LabResult<StatusCode> {
    load_session(&state, &session_id).await?;
    state.session_storage.delete(&session_id).await?;
    info!(session_id = %session_id, "Session deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<UploadMetadata> {
    let session = load_session(&state, &session_id).await?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        upload = Some(intake::accept_upload(
            &filename,
            content_type.as_deref(),
            bytes.to_vec(),
        )?);
        break;
    }
    let doc = upload.ok_or_else(|| LabError::BadRequest("multipart field 'file' is required".into()))?;

    let metadata = intake::metadata(&doc);
    SessionState::new(session.context.clone()).set_upload(doc).await?;
    state.session_storage.save(session).await?;

    info!(session_id = %session_id, filename = %metadata.filename, size_kb = metadata.size_kb, "Lab report uploaded");
    Ok(Json(metadata))
}

async fn preview_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> LabResult<Response> {
    let session = load_session(&state, &session_id).await?;
    let doc = SessionState::new(session.context)
        .upload()
        .await
        .ok_or(LabError::MissingUpload)?;

    let metadata = intake::metadata(&doc);
    let width = state.config.preview_width;
    match tokio::task::spawn_blocking(move || intake::preview(&doc, width)).await? {
        Ok(preview) => Ok(([(header::CONTENT_TYPE, "image/png")], preview.png).into_response()),
        Err(e @ LabError::UnreadableImage(_)) => {
            warn!(session_id = %session_id, "{}", e);
            let body = Json(json!({
                "error": e.kind(),
                "message": e.to_string(),
                "metadata": metadata,
            }));
            Ok((e.status_code(), body).into_response())
        }
        Err(e) => Err(e),
    }
}

async fn update_profile(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(form): Json<ProfileForm>,
) -> ApiResult<ProfileResponse> {
    let session = load_session(&state, &session_id).await?;
    let profile = UserProfile::from_form(&form);
    let response = ProfileResponse {
        gender: profile.gender,
        activity_level: profile.activity_level,
        age: profile.age,
        profile: profile.to_blob(),
    };

    SessionState::new(session.context.clone()).set_profile(profile).await?;
    state.session_storage.save(session).await?;
    Ok(Json(response))
}

async fn run_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> ApiResult<AnalyzeResponse> {
    let request: AnalyzeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AnalyzeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| LabError::BadRequest(format!("invalid analyze request: {e}")))?
    };

    let session = load_session(&state, &session_id).await?;
    let session_state = SessionState::new(session.context.clone());
    if session_state.upload().await.is_none() {
        return Err(LabError::MissingUpload);
    }
    session_state
        .begin_run(request.with_recommendations.unwrap_or(true))
        .await?;
    state.session_storage.save(session).await?;

    info!(session_id = %session_id, "Starting lab analysis run");
    let result = state.flow_runner.run_from_start(&session_id).await?;

    let session = load_session(&state, &session_id).await?;
    let session_state = SessionState::new(session.context);
    let status = match result.status {
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Paused => "paused",
    };

    Ok(Json(AnalyzeResponse {
        session_id,
        status: status.to_string(),
        message: result.response,
        analysis: session_state.analysis().await.map(|a| a.text),
        recommendation: session_state.recommendation().await.map(|r| r.text),
        failures: session_state.failures().await,
    }))
}

async fn download_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> LabResult<Response> {
    let session = load_session(&state, &session_id).await?;
    let session_state = SessionState::new(session.context);

    let upload = session_state.upload().await.ok_or(LabError::MissingUpload)?;
    let analysis = session_state.analysis().await.ok_or(LabError::NoAnalysis)?;
    let recommendation = session_state.recommendation().await;
    let profile = session_state.profile().await;

    let now = Local::now();
    let rendered = tokio::task::spawn_blocking(move || {
        report::compose_pdf(
            Some(&upload),
            Some(&analysis.text),
            recommendation.as_ref().map(|r| r.text.as_str()),
            profile.as_ref(),
            now,
        )
    })
    .await??;

    let filename = report::report_filename(now);
    info!(
        session_id = %session_id,
        filename = %filename,
        size = rendered.pdf.len(),
        warnings = rendered.warnings.len(),
        "Report generated"
    );

    let mut response = (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        rendered.pdf,
    )
        .into_response();
    if !rendered.warnings.is_empty() {
        let value = header_text(&rendered.warnings.join("; "));
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(REPORT_WARNINGS_HEADER, value);
        }
    }
    Ok(response)
}

/// Header values must be visible ASCII.
fn header_text(text: &str) -> String {
    text.chars()
        .map(|c| if c == ' ' || c.is_ascii_graphic() { c } else { '?' })
        .collect()
}

async fn classify_value(Json(request): Json<ClassifyRequest>) -> Json<ClassifiedValue> {
    Json(health_status::describe(
        &request.parameter,
        &request.value,
        &request.reference_range,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweeper_evicts_idle_sessions_and_stops_with_storage() {
        let storage = Arc::new(InMemorySessionStorage::new());
        storage.save(create_lab_session()).await.unwrap();

        let sweeper = spawn_session_sweeper(Arc::downgrade(&storage), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(storage.is_empty());

        drop(storage);
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }

    #[test]
    fn header_text_keeps_visible_ascii_only() {
        assert_eq!(
            header_text("Lab report image could not be embedded: \u{e9}chec\n"),
            "Lab report image could not be embedded: ?chec?"
        );
    }
}
