use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::{error, info};
use transport_module::EmailTransport;
use uuid::Uuid;

use crate::engine::{
    address, dedup, progress, start_ticker_thread, CampaignDraft, CampaignEdit, CampaignScheduler,
    DispatchEngine, DispatchSummary, EngineError, ProgressSnapshot, RecipientSelector,
    ScheduleOutcome, ScheduleRequest, SqliteCampaignStore,
};

use super::config::ServiceConfig;
use super::state::AppState;
use super::BoxError;

pub async fn run_server(
    config: ServiceConfig,
    transport: Arc<dyn EmailTransport>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let config = Arc::new(config);
    let store = Arc::new(SqliteCampaignStore::new(&config.campaign_db_path)?);
    let engine = Arc::new(DispatchEngine::new(store, transport));

    let mut ticker_control = start_ticker_thread(engine.clone(), config.ticker_poll_interval);

    let state = AppState { engine };

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("campaign dispatch service listening on {}", addr);

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    ticker_control.stop_and_join();
    serve_result?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/recipients", post(create_recipient))
        .route("/campaigns", post(create_campaign))
        .route(
            "/campaigns/:id",
            patch(edit_campaign).delete(delete_campaign),
        )
        .route("/campaigns/:id/recipients", post(attach_recipients))
        .route("/campaigns/:id/preview", get(preview_campaign))
        .route("/campaigns/:id/send", post(send_campaign))
        .route("/campaigns/:id/schedule", post(schedule_campaign))
        .route("/campaigns/:id/progress", get(poll_progress))
        .route("/campaigns/:id/duplicate-stats", get(duplicate_stats))
        .route("/campaigns/:id/pause", post(pause_campaign))
        .route("/campaigns/:id/resume", post(resume_campaign))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    reason: String,
}

fn error_response(err: EngineError) -> Response {
    let (status, code) = match &err {
        EngineError::CampaignNotFound(_) => (StatusCode::NOT_FOUND, "campaign_not_found"),
        EngineError::InvalidAddress(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_address"),
        EngineError::InvalidSchedule(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_schedule"),
        EngineError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
        EngineError::ConcurrentDispatch(_) => (StatusCode::CONFLICT, "concurrent_dispatch"),
        _ => {
            error!("engine failure: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };
    (
        status,
        Json(ErrorBody {
            error: code,
            reason: err.to_string(),
        }),
    )
        .into_response()
}

/// The engine is synchronous (blocking sqlite + blocking transport), so every
/// handler funnels its work through `spawn_blocking`.
async fn run_blocking<T, F>(work: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
{
    match task::spawn_blocking(work).await {
        Ok(result) => result.map_err(error_response),
        Err(join_err) => {
            error!("blocking task panicked: {join_err}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response())
        }
    }
}

#[derive(Debug, Serialize)]
struct CampaignCreated {
    id: Uuid,
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(draft): Json<CampaignDraft>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    let campaign = run_blocking(move || {
        // The sender address must survive normalization too.
        let mut draft = draft;
        draft.from_address = address::normalize(&draft.from_address)?;
        CampaignScheduler::new(&engine).create_campaign(draft)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(CampaignCreated { id: campaign.id })))
}

#[derive(Debug, Deserialize)]
struct NewRecipient {
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    company: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecipientCreated {
    id: i64,
    email: String,
}

async fn create_recipient(
    State(state): State<AppState>,
    Json(body): Json<NewRecipient>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    let created = run_blocking(move || {
        let email = address::normalize(&body.email)?;
        let id = engine.store().insert_recipient(
            &email,
            body.display_name.as_deref(),
            body.company.as_deref(),
        )?;
        Ok(RecipientCreated { id, email })
    })
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
struct AttachRecipients {
    recipient_ids: Vec<i64>,
}

async fn attach_recipients(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AttachRecipients>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    run_blocking(move || {
        engine.load_existing(id)?;
        engine.store().attach_recipients(id, &body.recipient_ids)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SendBody {
    selector: RecipientSelector,
}

#[derive(Debug, Serialize)]
struct SendResponse {
    summary: DispatchSummary,
    progress: ProgressSnapshot,
}

async fn send_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SendBody>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    let response = run_blocking(move || {
        let summary = engine.send_campaign(id, &body.selector)?;
        let progress = progress::snapshot(engine.store(), id)?;
        Ok(SendResponse { summary, progress })
    })
    .await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ScheduleResponse {
    Dispatched { summary: DispatchSummary },
    Scheduled { next_run: DateTime<Utc> },
}

async fn schedule_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ScheduleRequest>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    let outcome =
        run_blocking(move || CampaignScheduler::new(&engine).schedule_campaign(id, request))
            .await?;
    let response = match outcome {
        ScheduleOutcome::Dispatched(summary) => ScheduleResponse::Dispatched { summary },
        ScheduleOutcome::Armed { next_run } => ScheduleResponse::Scheduled { next_run },
    };
    Ok(Json(response))
}

async fn preview_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    let preview =
        run_blocking(move || CampaignScheduler::new(&engine).preview_campaign(id)).await?;
    Ok(Json(preview))
}

async fn poll_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    let snapshot = run_blocking(move || progress::snapshot(engine.store(), id)).await?;
    Ok(Json(snapshot))
}

async fn duplicate_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    let stats = run_blocking(move || {
        engine.load_existing(id)?;
        dedup::duplicate_stats(engine.store(), id)
    })
    .await?;
    Ok(Json(stats))
}

async fn edit_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(edit): Json<CampaignEdit>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    let campaign =
        run_blocking(move || CampaignScheduler::new(&engine).edit_campaign(id, edit)).await?;
    Ok(Json(campaign))
}

async fn pause_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    run_blocking(move || CampaignScheduler::new(&engine).pause_campaign(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resume_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    run_blocking(move || CampaignScheduler::new(&engine).resume_campaign(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Response> {
    let engine = state.engine.clone();
    run_blocking(move || CampaignScheduler::new(&engine).delete_campaign(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
