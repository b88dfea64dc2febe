use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::corroboration::CorroborationIndex;
use super::domain::{Actor, Report, ReportDraft, ReportId, ReportStatus};
use super::ledger::ReporterTrustLedger;
use super::repository::{RepositoryError, ReportStore};
use super::service::{Deadline, TriageError, TriageService};
use super::workflow::WorkflowError;

const DEFAULT_QUEUE_LIMIT: usize = 50;

/// Admin status-change command.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChangeRequest {
    pub status: ReportStatus,
    pub actor: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoteRequest {
    pub actor: String,
    pub note: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueParams {
    pub limit: Option<usize>,
}

/// Router builder exposing intake, admin and queue endpoints.
pub fn report_router<S, I>(service: Arc<TriageService<S, I>>) -> Router
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    Router::new()
        .route("/api/v1/reports", post(submit_handler::<S, I>))
        .route("/api/v1/reports/queue", get(queue_handler::<S, I>))
        .route("/api/v1/reports/:report_id", get(report_handler::<S, I>))
        .route(
            "/api/v1/reports/:report_id/status",
            post(status_handler::<S, I>),
        )
        .route(
            "/api/v1/reports/:report_id/evidence",
            post(evidence_handler::<S, I>),
        )
        .route(
            "/api/v1/reports/:report_id/notes",
            post(note_handler::<S, I>),
        )
        .route(
            "/api/v1/reports/:report_id/rescore",
            post(rescore_handler::<S, I>),
        )
        .with_state(service)
}

/// Run a service call on the blocking pool, bounded by the request timeout.
///
/// A timed-out call never writes: either the deadline is expired before the
/// worker claims its commit, or the commit already started and its outcome is
/// returned instead of the timeout.
async fn run_blocking<S, I, T, F>(
    service: Arc<TriageService<S, I>>,
    operation: F,
) -> Result<T, TriageError>
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
    T: Send + 'static,
    F: FnOnce(&TriageService<S, I>, &Deadline) -> Result<T, TriageError> + Send + 'static,
{
    let timeout = service.request_timeout();
    let deadline = Deadline::after(timeout);
    let worker_deadline = deadline.clone();
    let mut task =
        tokio::task::spawn_blocking(move || operation(service.as_ref(), &worker_deadline));

    let joined = match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) if deadline.expire() => return Err(TriageError::Timeout(timeout)),
        Err(_) => {
            debug!("request deadline hit mid-commit; awaiting the write");
            task.await
        }
    };
    joined.unwrap_or_else(|join_error| Err(TriageError::TaskFailed(join_error.to_string())))
}

fn spawn_corroboration_rescore<S, I>(service: Arc<TriageService<S, I>>, report: Report)
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    let Some(permit) = service.try_reserve_rescore() else {
        debug!(report_id = %report.id, "corroboration follow-up skipped under load");
        return;
    };

    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        if let Err(error) = service.rescore_affected_by_submission(&report) {
            warn!(report_id = %report.id, %error, "corroboration follow-up failed");
        }
    });
}

fn admin(actor: String) -> Result<Actor, TriageError> {
    if actor.trim().is_empty() {
        return Err(TriageError::Validation("actor must not be empty".to_string()));
    }
    Ok(Actor::Admin(actor))
}

pub(crate) fn error_response(error: TriageError) -> Response {
    let status = match &error {
        TriageError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TriageError::Workflow(WorkflowError::IllegalTransition { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        TriageError::Workflow(WorkflowError::InvalidTransition { .. })
        | TriageError::TerminalReport(_)
        | TriageError::ConcurrentModification { .. }
        | TriageError::Repository(RepositoryError::Conflict)
        | TriageError::Repository(RepositoryError::VersionMismatch { .. }) => StatusCode::CONFLICT,
        TriageError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        TriageError::Collaborator(_)
        | TriageError::Timeout(_)
        | TriageError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        TriageError::TaskFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn submit_handler<S, I>(
    State(service): State<Arc<TriageService<S, I>>>,
    axum::Json(draft): axum::Json<ReportDraft>,
) -> Response
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    let result = run_blocking(service.clone(), move |service, deadline| {
        service.submit_within(draft, deadline)
    })
    .await;

    match result {
        Ok(report) => {
            spawn_corroboration_rescore(service, report.clone());
            (StatusCode::CREATED, axum::Json(report)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn report_handler<S, I>(
    State(service): State<Arc<TriageService<S, I>>>,
    Path(report_id): Path<String>,
) -> Response
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    let id = ReportId(report_id);
    match run_blocking(service, move |service, _| service.get(&id)).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<S, I>(
    State(service): State<Arc<TriageService<S, I>>>,
    Path(report_id): Path<String>,
    axum::Json(request): axum::Json<StatusChangeRequest>,
) -> Response
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    let id = ReportId(report_id);
    let result = run_blocking(service, move |service, deadline| {
        let actor = admin(request.actor)?;
        service.update_status_within(&id, request.status, actor, request.notes, deadline)
    })
    .await;

    match result {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn evidence_handler<S, I>(
    State(service): State<Arc<TriageService<S, I>>>,
    Path(report_id): Path<String>,
) -> Response
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    let id = ReportId(report_id);
    let result = run_blocking(service, move |service, deadline| {
        service.refresh_evidence_within(&id, deadline)
    })
    .await;

    match result {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn note_handler<S, I>(
    State(service): State<Arc<TriageService<S, I>>>,
    Path(report_id): Path<String>,
    axum::Json(request): axum::Json<NoteRequest>,
) -> Response
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    let id = ReportId(report_id);
    let result = run_blocking(service, move |service, deadline| {
        let author = admin(request.actor)?;
        service.annotate_within(&id, author, request.note, deadline)
    })
    .await;

    match result {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn rescore_handler<S, I>(
    State(service): State<Arc<TriageService<S, I>>>,
    Path(report_id): Path<String>,
) -> Response
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    let id = ReportId(report_id);
    let result = run_blocking(service, move |service, deadline| {
        service.retry_partial_score_within(&id, deadline)
    })
    .await;

    match result {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn queue_handler<S, I>(
    State(service): State<Arc<TriageService<S, I>>>,
    Query(params): Query<QueueParams>,
) -> Response
where
    S: ReportStore + ReporterTrustLedger + 'static,
    I: CorroborationIndex + 'static,
{
    let limit = params.limit.unwrap_or(DEFAULT_QUEUE_LIMIT);
    match run_blocking(service, move |service, _| service.review_queue(limit)).await {
        Ok(entries) => (StatusCode::OK, axum::Json(json!({ "reports": entries }))).into_response(),
        Err(error) => error_response(error),
    }
}
