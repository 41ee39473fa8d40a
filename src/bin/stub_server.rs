//! Stand-in for the Python inference server
//!
//! Speaks just enough of the server's HTTP surface for supervisor and
//! end-to-end tests to run without a Python toolchain: the readiness
//! banner on stderr, the four RPC routes and a handful of failure
//! modes selectable from the command line.

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

#[derive(Parser, Debug)]
#[command(name = "mapsynth-stub")]
#[command(about = "Fake inference server for mapsynth integration tests")]
struct StubArgs {
    /// Port to bind; 0 picks a free port
    #[arg(long, default_value = "0")]
    port: u16,

    /// Milliseconds to wait before announcing readiness
    #[arg(long, default_value = "0")]
    startup_delay_ms: u64,

    /// Milliseconds each RPC handler sleeps before answering
    #[arg(long, default_value = "0")]
    response_delay_ms: u64,

    /// Serve without ever printing the readiness line
    #[arg(long)]
    never_ready: bool,

    /// Exit with an error before becoming ready
    #[arg(long)]
    crash_before_ready: bool,

    /// Answer /run_model with a malformed payload
    #[arg(long)]
    invalid_notes: bool,
}

struct StubState {
    invalid_notes: bool,
    response_delay: Duration,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = StubArgs::parse();
    if args.crash_before_ready {
        eprintln!("Traceback (most recent call last):");
        eprintln!("RuntimeError: model assets missing");
        std::process::exit(1);
    }

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    let port = listener.local_addr()?.port();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let state = Arc::new(StubState {
        invalid_notes: args.invalid_notes,
        response_delay: Duration::from_millis(args.response_delay_ms),
        shutdown: Mutex::new(Some(shutdown_tx)),
    });
    let app = Router::new()
        .route("/ping", get(ping))
        .route("/close", get(close))
        .route("/get_beat_features", post(get_beat_features))
        .route("/run_model", post(run_model))
        .route("/convert_music_file", post(convert_music_file))
        .with_state(state);

    if args.startup_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(args.startup_delay_ms)).await;
    }
    if !args.never_ready {
        // The Flask development server prints this line on stderr once
        // it is accepting connections; the supervisor scans for it.
        eprintln!(
            " * Running on http://127.0.0.1:{}/ (Press CTRL+C to quit)",
            port
        );
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;
    Ok(())
}

async fn ping() -> &'static str {
    "ok"
}

async fn close(State(state): State<Arc<StubState>>) -> &'static str {
    if let Some(tx) = state.shutdown.lock().await.take() {
        let _ = tx.send(());
    }
    "closing"
}

async fn get_beat_features(
    State(state): State<Arc<StubState>>,
    Json(_request): Json<Value>,
) -> Json<Value> {
    tokio::time::sleep(state.response_delay).await;
    let beat_times: Vec<f64> = (1..=32).map(|i| f64::from(i) * 0.5).collect();
    Json(json!({
        "data": {
            "bpm": 120.0,
            "beat_times": beat_times,
            "y": [0.0, 0.25, -0.25, 0.5],
            "sr": 22050,
        }
    }))
}

async fn run_model(State(state): State<Arc<StubState>>, Json(_request): Json<Value>) -> Json<Value> {
    tokio::time::sleep(state.response_delay).await;
    if state.invalid_notes {
        return Json(json!({ "data": "not-a-note-list" }));
    }
    let notes: Vec<Value> = (0..8)
        .map(|i| {
            json!({
                "_time": f64::from(i + 1),
                "_lineIndex": i % 4,
                "_lineLayer": (i / 4) % 3,
                "_type": i % 2,
                "_cutDirection": i % 9,
            })
        })
        .collect();
    Json(json!({ "data": notes }))
}

async fn convert_music_file(
    State(state): State<Arc<StubState>>,
    Json(request): Json<Value>,
) -> Result<String, StatusCode> {
    tokio::time::sleep(state.response_delay).await;
    let working_dir = request
        .get("workingDir")
        .and_then(Value::as_str)
        .ok_or(StatusCode::BAD_REQUEST)?;
    tokio::fs::write(Path::new(working_dir).join("song.egg"), b"OggS stub audio")
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok("done".to_string())
}
