//! HTTP client for the inference server
//!
//! The server exposes a small localhost RPC surface: `GET /ping`,
//! `GET /close`, `POST /get_beat_features`, `POST /run_model`,
//! `POST /convert_music_file`. Analysis and model routes can legally
//! run for minutes on long songs, so those requests opt out of the
//! short default timeout and use the job processing ceiling instead.

use crate::error::{GeneratorError, Result};
use crate::models::chart::Note;
use crate::models::difficulty::Difficulty;
use crate::models::song::Model;
use crate::models::tracks::BeatFeatures;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Timeout for quick control routes (ping, close)
const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Envelope the server wraps JSON payloads in
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct BeatFeaturesRequest<'a> {
    song_path: &'a str,
}

#[derive(Debug, Serialize)]
struct RunModelRequest<'a> {
    model: &'a str,
    difficulty: &'a str,
    beat_times: &'a [f64],
    bpm: f64,
    version: &'a str,
    y: &'a [f64],
    sr: u32,
    #[serde(rename = "tempDir")]
    temp_dir: &'a str,
}

#[derive(Debug, Serialize)]
struct ConvertRequest<'a> {
    song_path: &'a str,
    #[serde(rename = "workingDir")]
    working_dir: &'a str,
}

/// Inference server RPC client
///
/// One client per supervised server instance; the base URL carries the
/// port the server actually bound. Cloning shares the underlying
/// connection pool.
#[derive(Clone, Debug)]
pub struct InferenceClient {
    http_client: reqwest::Client,
    base_url: String,
    /// Upper bound for analysis/model/convert requests
    rpc_ceiling: Duration,
}

impl InferenceClient {
    pub fn new(base_url: String, rpc_ceiling: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(CONTROL_TIMEOUT)
            .build()
            .map_err(|e| GeneratorError::RpcFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            rpc_ceiling,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Liveness probe
    pub async fn ping(&self) -> Result<()> {
        let response = self
            .http_client
            .get(format!("{}/ping", self.base_url))
            .send()
            .await
            .map_err(|e| GeneratorError::RpcFailed(format!("GET /ping: {}", e)))?;
        check_status("GET /ping", response.status())
    }

    /// Ask the server to shut itself down
    ///
    /// The server may exit before the response is fully written; callers
    /// treat errors here as advisory.
    pub async fn close(&self) -> Result<()> {
        let response = self
            .http_client
            .get(format!("{}/close", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| GeneratorError::RpcFailed(format!("GET /close: {}", e)))?;
        check_status("GET /close", response.status())
    }

    /// Analyze the audio file: tempo, beat grid, downsampled signal
    pub async fn get_beat_features(&self, song_path: &Path) -> Result<BeatFeatures> {
        let body = self
            .post_for_text(
                "/get_beat_features",
                &BeatFeaturesRequest {
                    song_path: &song_path.to_string_lossy(),
                },
            )
            .await?;
        let envelope: DataEnvelope<BeatFeatures> = parse_json("/get_beat_features", &body)?;
        Ok(envelope.data)
    }

    /// Run the note-generation model for one difficulty tier
    #[allow(clippy::too_many_arguments)]
    pub async fn run_model(
        &self,
        model: Model,
        difficulty: Difficulty,
        features: &BeatFeatures,
        version: &str,
        temp_dir: &Path,
    ) -> Result<Vec<Note>> {
        let body = self
            .post_for_text(
                "/run_model",
                &RunModelRequest {
                    model: model.as_str(),
                    difficulty: difficulty.as_str(),
                    beat_times: &features.beat_times,
                    bpm: features.bpm,
                    version,
                    y: &features.y,
                    sr: features.sr,
                    temp_dir: &temp_dir.to_string_lossy(),
                },
            )
            .await?;
        parse_notes(&body)
    }

    /// Convert the source audio into the bundle's ogg form
    ///
    /// The server writes the converted file into the working directory
    /// itself and returns a status line.
    pub async fn convert_music_file(&self, song_path: &Path, working_dir: &Path) -> Result<String> {
        self.post_for_text(
            "/convert_music_file",
            &ConvertRequest {
                song_path: &song_path.to_string_lossy(),
                working_dir: &working_dir.to_string_lossy(),
            },
        )
        .await
    }

    async fn post_for_text<B: Serialize>(&self, route: &str, body: &B) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, route))
            .timeout(self.rpc_ceiling)
            .json(body)
            .send()
            .await
            .map_err(|e| GeneratorError::RpcFailed(format!("POST {}: {}", route, e)))?;

        check_status(&format!("POST {}", route), response.status())?;
        response
            .text()
            .await
            .map_err(|e| GeneratorError::RpcFailed(format!("POST {}: {}", route, e)))
    }
}

fn check_status(request: &str, status: reqwest::StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(GeneratorError::RpcFailed(format!(
            "{} returned {}",
            request, status
        )))
    }
}

fn parse_json<T: DeserializeOwned>(route: &str, body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| GeneratorError::RpcFailed(format!("POST {}: invalid response: {}", route, e)))
}

/// Validate and decode the `/run_model` response
///
/// Anything other than `{data: [note, ...]}` is an invalid-notes
/// failure, not an RPC failure: the server answered, the model output
/// is what is wrong.
fn parse_notes(body: &str) -> Result<Vec<Note>> {
    let envelope: DataEnvelope<serde_json::Value> = serde_json::from_str(body)
        .map_err(|e| GeneratorError::InvalidNotes(format!("response was not JSON: {}", e)))?;

    if !envelope.data.is_array() {
        return Err(GeneratorError::InvalidNotes(format!(
            "expected a list of notes, got {}",
            value_kind(&envelope.data)
        )));
    }

    serde_json::from_value(envelope.data)
        .map_err(|e| GeneratorError::InvalidNotes(format!("malformed note: {}", e)))
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
