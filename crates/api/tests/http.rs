use std::sync::Arc;

use api::{config::Config, state::AppState};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use store::{InMemStore, StoreSeed};
use tower::ServiceExt;

fn seed() -> StoreSeed {
    serde_json::from_value(json!({
        "staff": [
            { "id": "t1", "name": "Ada Park" },
            { "id": "t2", "name": "Ben Cruz" },
            { "id": "t3", "name": "Cy Diaz" },
            { "id": "s1", "name": "Sam Sub", "is_substitute": true }
        ],
        "classrooms": [
            { "id": "x", "name": "Room X" },
            { "id": "y", "name": "Room Y" }
        ],
        "time_slots": [{ "id": "am", "code": "AM", "display_order": 1 }],
        "class_groups": [{
            "id": "toddlers", "name": "Toddlers",
            "required_ratio": 5, "preferred_ratio": 4, "min_age": 2
        }],
        "cells": [{
            "classroom_id": "x", "day_of_week": "mon", "time_slot_id": "am",
            "enrollment_for_staffing": 10, "class_group_ids": ["toddlers"]
        }],
        "teacher_schedules": [
            { "id": "a1", "teacher_id": "t1", "classroom_id": "x", "day_of_week": "mon", "time_slot_id": "am", "is_floater": true },
            { "id": "a2", "teacher_id": "t2", "classroom_id": "x", "day_of_week": "mon", "time_slot_id": "am" },
            { "id": "a3", "teacher_id": "t3", "classroom_id": "y", "day_of_week": "mon", "time_slot_id": "am" }
        ],
        "coverage_requests": [{
            "id": "cr1", "absence_id": "abs1", "teacher_id": "t2",
            "start_date": "2024-01-01", "end_date": "2024-01-02",
            "shifts": [
                { "id": "sh1", "date": "2024-01-01", "day_of_week": "mon", "time_slot_id": "am", "classroom_id": "x" },
                { "id": "sh2", "date": "2024-01-02", "day_of_week": "tue", "time_slot_id": "am", "classroom_id": "x" }
            ]
        }]
    }))
    .unwrap()
}

fn app() -> (Router, InMemStore) {
    let store = InMemStore::from_seed(seed());
    let mut config = Config::default();
    config.session.settle_delay = std::time::Duration::ZERO;
    let state = AppState::new(Arc::new(store.clone()), &config);
    (api::app(state), store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn save_body(teachers: Value) -> Value {
    json!({
        "classroom_id": "x", "day_of_week": "mon", "time_slot_id": "am",
        "enrollment_for_staffing": 10, "class_group_ids": ["toddlers"],
        "teachers": teachers
    })
}

#[tokio::test]
async fn health_and_openapi() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");

    let (status, doc) = send_json(&app, "GET", "/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/v1/schedule-cells/save"].is_object());
}

#[tokio::test]
async fn missing_cell_reads_as_empty() {
    let (app, _) = app();
    let (status, cell) = send_json(&app, "GET", "/v1/schedule-cells/y/tue/am", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cell["is_active"], json!(true));
    assert_eq!(cell["class_group_ids"], json!([]));
}

#[tokio::test]
async fn bulk_cell_update_writes_every_cell() {
    let (app, _) = app();
    let cells = json!([
        { "classroom_id": "y", "day_of_week": "tue", "time_slot_id": "am", "enrollment_for_staffing": 6, "class_group_ids": ["toddlers"] },
        { "classroom_id": "y", "day_of_week": "wed", "time_slot_id": "am", "is_active": false }
    ]);
    let (status, ack) = send_json(&app, "PUT", "/v1/schedule-cells", Some(cells)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["affected"], 2);

    let (_, cell) = send_json(&app, "GET", "/v1/schedule-cells/y/tue/am", None).await;
    assert_eq!(cell["enrollment_for_staffing"], 6);

    let bad = json!([{ "classroom_id": "y", "day_of_week": "thu", "time_slot_id": "am" }]);
    let (status, _) = send(&app, "PUT", "/v1/schedule-cells", Some(bad)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn save_returns_staffing_summary() {
    let (app, _) = app();
    let (status, out) = send_json(
        &app,
        "POST",
        "/v1/schedule-cells/save",
        Some(save_body(json!([{ "teacher_id": "t2" }, { "teacher_id": "t1" }]))),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{out}");
    assert_eq!(out["status"], "saved");
    let summary = &out["staffing"][0]["summary"];
    assert_eq!(summary["required"], 2);
    assert_eq!(summary["preferred"], 3);
    assert_eq!(summary["status"], "below_preferred");
}

#[tokio::test]
async fn conflicting_save_answers_409_without_writing() {
    let (app, store) = app();
    let (status, out) = send_json(
        &app,
        "POST",
        "/v1/schedule-cells/save",
        Some(save_body(json!([{ "teacher_id": "t2" }, { "teacher_id": "t3" }]))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(out["status"], "conflicts_pending");
    assert_eq!(out["conflicts"][0]["teacher_name"], "Cy Diaz");
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn validation_errors_are_plain_text() {
    let (app, _) = app();
    let mut body = save_body(json!([]));
    body["class_group_ids"] = json!([]);
    let (status, text) = send(&app, "POST", "/v1/schedule-cells/save", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(String::from_utf8(text).unwrap().contains("class group"));
}

#[tokio::test]
async fn teacher_schedule_crud() {
    let (app, _) = app();
    let (status, rows) = send_json(&app, "GET", "/v1/teacher-schedules?classroom_id=x", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows.as_array().unwrap().len(), 2);

    let new = json!({ "teacher_id": "t3", "classroom_id": "x", "day_of_week": "tue", "time_slot_id": "am" });
    let (status, created) = send_json(&app, "POST", "/v1/teacher-schedules", Some(new.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, again) = send_json(&app, "POST", "/v1/teacher-schedules", Some(new)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["id"], again["id"]);

    let id = created["id"].as_str().unwrap().to_string();
    let (status, updated) = send_json(
        &app,
        "PUT",
        &format!("/v1/teacher-schedules/{id}"),
        Some(json!({ "is_floater": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_floater"], true);

    let (status, _) = send(&app, "DELETE", &format!("/v1/teacher-schedules/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", &format!("/v1/teacher-schedules/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn staffing_rollup_counts_statuses() {
    let (app, _) = app();
    let (status, rollup) = send_json(&app, "GET", "/v1/staffing/cells", None).await;
    assert_eq!(status, StatusCode::OK);
    // one non-floater plus a half-counted floater against two required
    assert_eq!(rollup["below_required"], 1);
    assert_eq!(rollup["cells"][0]["summary"]["scheduled"], 1.5);
}

#[tokio::test]
async fn coverage_flow_over_http() {
    let (app, _) = app();
    let (status, view) = send_json(&app, "GET", "/v1/coverage/abs1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["counters"]["uncovered_shifts"], 2);

    let (status, contact) = send_json(
        &app,
        "GET",
        "/v1/substitute-contacts?coverage_request_id=cr1&sub_id=s1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(contact["contact_status"], "not_contacted");
    let contact_id = contact["contact"]["id"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &app,
        "POST",
        "/v1/assign-sub-shifts",
        Some(json!({
            "coverage_request_id": "cr1", "sub_id": "s1",
            "selected_shift_ids": ["sh1"], "confirmation": "mark_confirmed_and_assign"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, remaining) = send_json(&app, "GET", "/v1/coverage/abs1/assigned-shifts", None).await;
    assert_eq!(remaining["remaining_shift_count"], 1);
    assert_eq!(remaining["remaining_shift_keys"], json!(["2024-01-02|am"]));

    let (status, declined) = send_json(
        &app,
        "PUT",
        &format!("/v1/substitute-contacts/{contact_id}"),
        Some(json!({ "contact_status": "declined_all" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(declined["contact_status"], "declined_all");
    assert_eq!(declined["contact"]["shift_overrides"], json!([]));

    let (status, _) = send(&app, "GET", "/v1/coverage/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_roster_is_cached_until_save() {
    let (app, _) = app();
    let (status, opened) = send_json(&app, "POST", "/v1/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    let id = opened["session_id"].as_str().unwrap().to_string();
    let roster_uri = format!("/v1/sessions/{id}/roster/x/mon/am");

    let (_, first) = send_json(&app, "GET", &roster_uri, None).await;
    assert_eq!(first["from_cache"], false);
    let (_, second) = send_json(&app, "GET", &roster_uri, None).await;
    assert_eq!(second["from_cache"], true);

    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/v1/sessions/{id}/save"),
        Some(save_body(json!([{ "teacher_id": "t2" }]))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, after) = send_json(&app, "GET", &roster_uri, None).await;
    assert_eq!(after["from_cache"], false);
    assert_eq!(after["assignments"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", &format!("/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &roster_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
