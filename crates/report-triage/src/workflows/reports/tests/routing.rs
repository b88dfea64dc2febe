use super::common::*;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use std::time::Duration;

use crate::config::TriageSettings;
use crate::workflows::reports::corroboration::InMemoryCorroborationIndex;
use crate::workflows::reports::domain::ReportStatus;
use crate::workflows::reports::repository::{RepositoryError, ReportStore};
use crate::workflows::reports::router::{
    error_response, queue_handler, report_handler, status_handler,
};
use crate::workflows::reports::store::InMemoryReportStore;
use crate::workflows::reports::{report_router, QueueParams, StatusChangeRequest, TriageError};

type Store = InMemoryReportStore;
type Index = InMemoryCorroborationIndex;

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

#[tokio::test]
async fn submit_route_creates_pending_report() {
    let h = harness();
    let router = report_router(Arc::new(h.service));
    let payload = serde_json::to_value(draft()).expect("draft serializes");

    let response = router
        .oneshot(json_request("POST", "/api/v1/reports", payload))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["score"]["total"], 13);
    assert_eq!(body["score"]["tier"], "high");
    assert_eq!(body["history"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn submit_route_rejects_future_incident() {
    let h = harness();
    let router = report_router(Arc::new(h.service));
    let mut input = draft();
    input.incident_at = now() + chrono::Duration::days(1);

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/reports",
            serde_json::to_value(input).expect("draft serializes"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn status_route_applies_legal_transition() {
    let h = harness();
    let service = Arc::new(h.service);
    let report = service.submit(draft()).expect("submission succeeds");
    let router = report_router(service.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/reports/{}/status", report.id),
            json!({ "status": "analyzing", "actor": "admin-rina", "notes": "triaging" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "analyzing");
    assert_eq!(body["history"][1]["changed_by"]["id"], "admin-rina");
    assert_eq!(body["history"][1]["notes"], "triaging");
}

#[tokio::test]
async fn status_handler_maps_workflow_errors() {
    let h = harness();
    let service = Arc::new(h.service);
    let report = service.submit(draft()).expect("submission succeeds");

    let illegal = status_handler::<Store, Index>(
        State(service.clone()),
        Path(report.id.0.clone()),
        axum::Json(StatusChangeRequest {
            status: ReportStatus::Resolved,
            actor: "admin-rina".to_string(),
            notes: None,
        }),
    )
    .await;
    assert_eq!(illegal.status(), StatusCode::UNPROCESSABLE_ENTITY);

    advance(
        service.as_ref(),
        &report.id,
        &[ReportStatus::Analyzing, ReportStatus::Invalid],
    );
    let terminal = status_handler::<Store, Index>(
        State(service.clone()),
        Path(report.id.0.clone()),
        axum::Json(StatusChangeRequest {
            status: ReportStatus::Analyzing,
            actor: "admin-rina".to_string(),
            notes: None,
        }),
    )
    .await;
    assert_eq!(terminal.status(), StatusCode::CONFLICT);

    let anonymous_admin = status_handler::<Store, Index>(
        State(service),
        Path(report.id.0.clone()),
        axum::Json(StatusChangeRequest {
            status: ReportStatus::Analyzing,
            actor: " ".to_string(),
            notes: None,
        }),
    )
    .await;
    assert_eq!(anonymous_admin.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn report_handler_returns_not_found_for_unknown_id() {
    let h = harness();

    let response =
        report_handler::<Store, Index>(State(Arc::new(h.service)), Path("rpt-missing".to_string()))
            .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn note_route_accepts_notes_on_terminal_reports() {
    let h = harness();
    let service = Arc::new(h.service);
    let report = service.submit(draft()).expect("submission succeeds");
    advance(
        service.as_ref(),
        &report.id,
        &[ReportStatus::Analyzing, ReportStatus::Invalid],
    );

    let response = report_router(service)
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/reports/{}/notes", report.id),
            json!({ "actor": "admin-rina", "note": "reporter contacted" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["admin_notes"][0]["note"], "reporter contacted");
    assert_eq!(body["status"], "invalid");
}

#[tokio::test]
async fn evidence_route_rejects_terminal_reports() {
    let h = harness();
    let service = Arc::new(h.service);
    let report = service.submit(draft()).expect("submission succeeds");
    advance(
        service.as_ref(),
        &report.id,
        &[
            ReportStatus::Analyzing,
            ReportStatus::InProgress,
            ReportStatus::Resolved,
        ],
    );

    let response = report_router(service)
        .oneshot(
            Request::post(format!("/api/v1/reports/{}/evidence", report.id))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn queue_handler_lists_open_reports_by_credibility() {
    let h = harness();
    let service = Arc::new(h.service);
    let low = service
        .submit(anonymous_draft())
        .expect("submission succeeds");
    let high = service.submit(draft()).expect("submission succeeds");

    let response = queue_handler::<Store, Index>(
        State(service.clone()),
        Query(QueueParams::default()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let ids: Vec<&str> = body["reports"]
        .as_array()
        .expect("reports array")
        .iter()
        .filter_map(|entry| entry["report_id"].as_str())
        .collect();
    assert_eq!(ids, vec![high.id.0.as_str(), low.id.0.as_str()]);

    let limited = report_router(service)
        .oneshot(
            Request::get("/api/v1/reports/queue?limit=1")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    let body = read_json_body(limited).await;
    assert_eq!(body["reports"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn timed_out_submission_leaves_nothing_behind() {
    let settings = TriageSettings {
        request_timeout: Duration::from_millis(50),
        ..TriageSettings::default()
    };
    let h = harness_with_settings(InMemoryReportStore::default(), fresh_index(), settings);
    h.locations.set_delay(Duration::from_millis(300));
    let store = h.store.clone();
    let router = report_router(Arc::new(h.service));

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/reports",
            serde_json::to_value(draft()).expect("draft serializes"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(store.open_reports().expect("open reports").is_empty());
}

#[test]
fn unavailable_store_maps_to_service_unavailable() {
    let response = error_response(TriageError::Repository(RepositoryError::Unavailable(
        "report store lock poisoned".to_string(),
    )));
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = error_response(TriageError::TaskFailed("worker panicked".to_string()));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
