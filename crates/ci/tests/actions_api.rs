//! Integration tests for the GitHub Actions client against a loopback
//! axum server.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use tourgen_ci::client::ActionsClient;
use tourgen_ci::error::CiError;
use tourgen_ci::logs::error_lines;
use tourgen_ci::runs::{RunFilter, RunVerdict};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base: &str) -> ActionsClient {
    ActionsClient::new(
        base,
        "acme/tours",
        Some("ghp_testtoken".to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn runs_body() -> Value {
    json!({
        "total_count": 3,
        "workflow_runs": [
            {"id": 3, "name": "render", "display_title": "Render job_abc", "status": "in_progress"},
            {"id": 2, "name": "render", "display_title": "Render job_xyz", "status": "completed", "conclusion": "failure"},
            {"id": 1, "name": "render", "display_title": "Render job_abc", "status": "completed", "conclusion": "success"}
        ]
    })
}

fn log_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("0_render.txt", options).unwrap();
    writer
        .write_all(b"2024-05-01T10:00:00Z starting\n2024-05-01T10:00:05Z ##[error]ffmpeg exited with 1\n")
        .unwrap();
    writer.finish().unwrap().into_inner()
}

// ---------------------------------------------------------------------------
// Test: runs and jobs
// ---------------------------------------------------------------------------

/// Run listing sends the API headers and forwards the filter.
#[tokio::test]
async fn list_runs_sends_headers_and_filter() {
    async fn runs(
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        assert_eq!(headers["accept"], "application/vnd.github+json");
        assert_eq!(headers["x-github-api-version"], "2022-11-28");
        assert_eq!(headers["authorization"], "Bearer ghp_testtoken");
        assert!(headers.contains_key("user-agent"));
        assert_eq!(params["branch"], "main");
        assert_eq!(params["per_page"], "5");
        (StatusCode::OK, Json(runs_body()))
    }

    let base = spawn_server(Router::new().route("/repos/acme/tours/actions/runs", get(runs))).await;
    let filter = RunFilter {
        branch: Some("main".to_string()),
        per_page: 5,
        ..Default::default()
    };

    let runs = client(&base).list_runs(&filter).await.unwrap();

    let verdicts: Vec<RunVerdict> = runs.iter().map(|r| r.verdict()).collect();
    assert_eq!(
        verdicts,
        [RunVerdict::InProgress, RunVerdict::Failure, RunVerdict::Success]
    );
}

/// Runs are matched to a render job through their titles.
#[tokio::test]
async fn find_runs_for_job_filters_by_title() {
    let app = Router::new().route(
        "/repos/acme/tours/actions/runs",
        get(|| async { Json(runs_body()) }),
    );
    let base = spawn_server(app).await;

    let runs = client(&base)
        .find_runs_for_job("job_abc", &RunFilter::default())
        .await
        .unwrap();

    let ids: Vec<u64> = runs.iter().map(|r| r.id).collect();
    assert_eq!(ids, [3, 1]);
}

/// Jobs come back with their steps.
#[tokio::test]
async fn list_jobs_includes_steps() {
    let app = Router::new().route(
        "/repos/acme/tours/actions/runs/{id}/jobs",
        get(|Path(id): Path<u64>| async move {
            assert_eq!(id, 2);
            Json(json!({"total_count": 1, "jobs": [{
                "id": 20, "name": "render", "status": "completed", "conclusion": "failure",
                "steps": [
                    {"name": "Set up job", "status": "completed", "conclusion": "success", "number": 1},
                    {"name": "Encode", "status": "completed", "conclusion": "failure", "number": 2}
                ]
            }]}))
        }),
    );
    let base = spawn_server(app).await;

    let jobs = client(&base).list_jobs(2).await.unwrap();

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].failed_step().map(|s| s.name.as_str()), Some("Encode"));
}

/// API errors keep status and body.
#[tokio::test]
async fn missing_run_is_api_error() {
    let app = Router::new().route(
        "/repos/acme/tours/actions/runs/{id}",
        get(|| async { (StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#) }),
    );
    let base = spawn_server(app).await;

    let err = client(&base).get_run(99).await.unwrap_err();

    assert_matches!(err, CiError::ApiError { status: 404, ref body } if body.contains("Not Found"));
}

// ---------------------------------------------------------------------------
// Test: logs, artifacts, dispatch
// ---------------------------------------------------------------------------

/// Run logs are unpacked and searchable for error markers.
#[tokio::test]
async fn run_logs_are_unpacked_and_searchable() {
    let app = Router::new().route(
        "/repos/acme/tours/actions/runs/{id}/logs",
        get(|| async { log_zip() }),
    );
    let base = spawn_server(app).await;

    let files = client(&base).run_logs(2).await.unwrap();

    assert_eq!(files.len(), 1);
    let errors = error_lines(&files);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, "##[error]ffmpeg exited with 1");
    assert_eq!(errors[0].line_number, 2);
}

/// Artifact archives are written to disk as-is.
#[tokio::test]
async fn download_artifact_writes_zip() {
    let app = Router::new()
        .route(
            "/repos/acme/tours/actions/runs/{id}/artifacts",
            get(|| async {
                Json(json!({"total_count": 1, "artifacts": [
                    {"id": 77, "name": "tour-video", "size_in_bytes": 5, "expired": false}
                ]}))
            }),
        )
        .route(
            "/repos/acme/tours/actions/artifacts/{id}/zip",
            get(|| async { b"PK...".to_vec() }),
        );
    let base = spawn_server(app).await;
    let api = client(&base);
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("artifacts").join("tour-video.zip");

    let artifacts = api.list_artifacts(2).await.unwrap();
    let written = api.download_artifact(artifacts[0].id, &dest).await.unwrap();

    assert_eq!(artifacts[0].name, "tour-video");
    assert_eq!(written, 5);
    assert_eq!(std::fs::read(&dest).unwrap(), b"PK...");
}

/// Dispatch posts the ref and inputs and accepts 204.
#[tokio::test]
async fn dispatch_workflow_posts_inputs() {
    async fn dispatch(Path(workflow): Path<String>, Json(body): Json<Value>) -> StatusCode {
        assert_eq!(workflow, "render.yml");
        assert_eq!(body["ref"], "main");
        assert_eq!(body["inputs"]["job_id"], "job_abc");
        StatusCode::NO_CONTENT
    }

    let app = Router::new().route(
        "/repos/acme/tours/actions/workflows/{workflow}/dispatches",
        post(dispatch),
    );
    let base = spawn_server(app).await;
    let mut inputs = BTreeMap::new();
    inputs.insert("job_id".to_string(), "job_abc".to_string());

    client(&base)
        .dispatch_workflow("render.yml", "main", &inputs)
        .await
        .unwrap();
}
