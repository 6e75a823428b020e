//! End-to-end command tests against loopback services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use tourgen_cli::args::{JobInput, ProbeArgs, WatchOptions};
use tourgen_cli::commands::{self, jobs, Context};
use tourgen_cli::config::Config;
use tourgen_cli::exit::Exit;
use tourgen_cli::output::Output;
use tourgen_core::candidates::VideoSource;
use tourgen_core::retry::PollPolicy;
use tourgen_core::types::JobId;
use tourgen_media::cloudinary::CloudinaryConfig;

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

fn context(vars: &[(&str, &str)]) -> Context {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut config = Config::from_lookup(|k| map.get(k).cloned()).unwrap();
    config.poll = PollPolicy::fixed(Duration::from_millis(5), 5);
    Context {
        config,
        out: Output::new(true),
        cancel: CancellationToken::new(),
    }
}

fn options() -> WatchOptions {
    WatchOptions {
        download: None,
        deadline_secs: None,
        no_probe: false,
    }
}

// ---------------------------------------------------------------------------
// Test: watch
// ---------------------------------------------------------------------------

/// A completed job's canonical URL is verified and the video downloaded.
#[tokio::test]
async fn watch_downloads_canonical_video() {
    async fn status(State(base): State<Arc<String>>) -> Json<serde_json::Value> {
        Json(json!({"status": "completed", "video_url": format!("{base}/media/j1.mp4")}))
    }

    // The handler needs the server's own address, so bind first.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = Router::new()
        .route("/api/status/{id}", get(status))
        .route("/media/j1.mp4", get(|| async { vec![1u8; 1000] }))
        .with_state(Arc::new(base.clone()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let ctx = context(&[("TOURGEN_API_URL", &base)]);
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("j1.mp4");
    let watch = WatchOptions {
        download: Some(dest.clone()),
        ..options()
    };

    let exit = jobs::watch(&ctx, "j1", &watch, None).await.unwrap();

    assert_eq!(exit, Exit::Success);
    assert_eq!(std::fs::read(&dest).unwrap().len(), 1000);
}

/// A failed job exits with the job-failed code.
#[tokio::test]
async fn watch_failed_job_exit_code() {
    let app = Router::new().route(
        "/api/status/{id}",
        get(|| async { Json(json!({"status": "failed", "error": "bad image"})) }),
    );
    let base = spawn_server(app).await;
    let ctx = context(&[("TOURGEN_API_URL", &base)]);

    let exit = jobs::watch(&ctx, "j2", &options(), None).await.unwrap();

    assert_eq!(exit, Exit::JobFailed);
}

/// A job stuck in "completed" without a URL is found by probing.
#[tokio::test]
async fn watch_probes_when_completed_without_url() {
    async fn delivery(uri: Uri) -> StatusCode {
        if uri.path() == "/demo/video/upload/videos/j3.mp4" {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        }
    }

    let app = Router::new()
        .route(
            "/api/status/{id}",
            get(|| async { Json(json!({"status": "completed"})) }),
        )
        .fallback(delivery);
    let base = spawn_server(app).await;
    let mut ctx = context(&[("TOURGEN_API_URL", &base)]);
    ctx.config.cloudinary = Some(CloudinaryConfig::new("demo").with_delivery_base(base.clone()));

    let exit = jobs::watch(&ctx, "j3", &options(), None).await.unwrap();

    assert_eq!(exit, Exit::Success);
}

/// The URL announced at submission is used when status never carries one.
#[tokio::test]
async fn run_uses_url_announced_at_submission() {
    async fn generate(State(base): State<Arc<String>>) -> Json<serde_json::Value> {
        Json(json!({"job_id": "j7", "video_url": format!("{base}/media/j7.mp4")}))
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = Router::new()
        .route("/api/generate", post(generate))
        .route(
            "/api/status/{id}",
            get(|| async { Json(json!({"status": "completed"})) }),
        )
        .route("/media/j7.mp4", get(|| async { vec![7u8; 64] }))
        .with_state(Arc::new(base.clone()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let ctx = context(&[("TOURGEN_API_URL", &base)]);
    let dir = tempfile::tempdir().unwrap();
    let input = JobInput {
        request: None,
        images: vec!["https://img.example.com/1.jpg".to_string()],
        address: Some("1 Bay St".to_string()),
        price: None,
        bedrooms: None,
        bathrooms: None,
        area_sqft: None,
        description: None,
        agent_name: None,
        agent_phone: None,
        agent_email: None,
    };
    let watch = WatchOptions {
        download: Some(dir.path().to_path_buf()),
        ..options()
    };

    let exit = jobs::run(&ctx, &input, &watch).await.unwrap();

    assert_eq!(exit, Exit::Success);
    assert_eq!(std::fs::read(dir.path().join("j7.mp4")).unwrap().len(), 64);
}

/// A reported URL that refuses HEAD is still verified through GET.
#[tokio::test]
async fn reported_url_refusing_head_is_verified() {
    async fn status(State(base): State<Arc<String>>) -> Json<serde_json::Value> {
        Json(json!({"status": "completed", "video_url": format!("{base}/media/j8.mp4")}))
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = Router::new()
        .route("/api/status/{id}", get(status))
        .route(
            "/media/j8.mp4",
            get(|| async { StatusCode::OK }).head(|| async { StatusCode::FORBIDDEN }),
        )
        .with_state(Arc::new(base.clone()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let ctx = context(&[("TOURGEN_API_URL", &base)]);

    let report = jobs::watch_job(&ctx, &JobId::new("j8").unwrap(), &options(), None)
        .await
        .unwrap();

    let url = format!("{base}/media/j8.mp4");
    assert_eq!(report.video, Some(VideoSource::Canonical(url)));
    assert!(report.verified);
}

/// A reported URL that never answers is kept, marked unverified.
#[tokio::test]
async fn dead_reported_url_is_kept_unverified() {
    let app = Router::new().route(
        "/api/status/{id}",
        get(|| async { Json(json!({"status": "done", "url": "http://127.0.0.1:9/j9.mp4"})) }),
    );
    let base = spawn_server(app).await;
    let ctx = context(&[("TOURGEN_API_URL", &base)]);

    let report = jobs::watch_job(&ctx, &JobId::new("j9").unwrap(), &options(), None)
        .await
        .unwrap();

    assert_eq!(
        report.video,
        Some(VideoSource::Canonical("http://127.0.0.1:9/j9.mp4".to_string()))
    );
    assert!(!report.verified);
    assert_eq!(report.exit(), Exit::Success);
}

/// Cancellation before the first request ends the watch as cancelled.
#[tokio::test]
async fn watch_cancelled() {
    let calls = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route(
            "/api/status/{id}",
            get(|State(calls): State<Arc<AtomicU32>>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Json(json!({"status": "processing"}))
            }),
        )
        .with_state(calls.clone());
    let base = spawn_server(app).await;
    let ctx = context(&[("TOURGEN_API_URL", &base)]);
    ctx.cancel.cancel();

    let exit = jobs::watch(&ctx, "j4", &options(), None).await.unwrap();

    assert_eq!(exit, Exit::Cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Test: probe and misc
// ---------------------------------------------------------------------------

/// `probe` without a canonical URL or a media host is a config error.
#[tokio::test]
async fn probe_requires_media_host_or_canonical() {
    let ctx = context(&[]);
    let args = ProbeArgs {
        job: "j5".to_string(),
        canonical: None,
        public_id: None,
        versions: Vec::new(),
        concurrency: 2,
    };

    let err = jobs::probe(&ctx, &args).await.unwrap_err();

    assert!(err.to_string().contains("CLOUDINARY_CLOUD_NAME"));
}

/// `probe` exits non-zero when nothing resolves.
#[tokio::test]
async fn probe_without_hit_is_error_exit() {
    let base = spawn_server(Router::new()).await;
    let ctx = context(&[]);
    let args = ProbeArgs {
        job: "j6".to_string(),
        canonical: Some(format!("{base}/nothing.mp4")),
        public_id: None,
        versions: Vec::new(),
        concurrency: 2,
    };

    let exit = jobs::probe(&ctx, &args).await.unwrap();

    assert_eq!(exit, Exit::Error);
}

/// `diagnose` with nothing reachable fails on the rendering service only.
#[tokio::test]
async fn diagnose_reports_unreachable_service() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let ctx = context(&[("TOURGEN_API_URL", &format!("http://{addr}"))]);

    let exit = commands::run(tourgen_cli::args::Command::Diagnose, &ctx)
        .await
        .unwrap();

    assert_eq!(exit, Exit::Error);
}
