//! Single-song generation pipeline
//!
//! A job walks one audio file through the full pipeline: cover art,
//! inference server startup, beat analysis, per-difficulty note
//! generation, lighting synthesis, bundle writing, audio conversion and
//! final packaging. Jobs are independent of each other; the scheduler
//! only bounds how many run at once.

use crate::error::{GeneratorError, Result};
use crate::events::{EventBus, GeneratorEvent};
use crate::models::bundle;
use crate::models::song::SongArgs;
use crate::models::tracks::{DifficultyChart, Tracks};
use crate::models::Difficulty;
use crate::services::cover_art::CoverArtResolver;
use crate::services::event_synth::EventSynthesizer;
use crate::services::inference_client::InferenceClient;
use crate::services::metadata::SongMetadata;
use crate::services::supervisor::ProcessSupervisor;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pipeline states a job moves through
///
/// `Failed` is reachable from every non-terminal state; `Done` is
/// reached either through the full pipeline or directly when the output
/// already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Tags read, bundle name fixed
    MetadataLoaded,
    /// Cover image written to the working directory
    ArtResolved,
    /// Inference server spawned, readiness pending
    ServerStarting,
    /// Readiness marker seen, RPC available
    ServerReady,
    /// Note generation requested from the model
    NotesRequested,
    /// At least one difficulty returned a valid note list
    NotesReceived,
    /// Lighting tracks derived
    EventsSynthesized,
    /// Bundle files written to the working directory
    Written,
    /// Bundle moved into the output directory
    Packaged,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// How a job settled, as seen by the scheduler
#[derive(Debug)]
pub enum JobOutcome {
    /// Bundle produced and packaged
    Completed,
    /// Nothing ran; the output already existed or the name collided
    Skipped(String),
    Failed(GeneratorError),
}

/// One song's generation job
pub struct GenerationJob {
    pub id: Uuid,
    pub args: SongArgs,
    metadata: SongMetadata,
    server_command: Vec<String>,
    state: JobState,
    bus: EventBus,
    cancel: CancellationToken,
    synthesizer: EventSynthesizer,
    art_resolver: CoverArtResolver,
}

impl GenerationJob {
    pub fn new(
        args: SongArgs,
        metadata: SongMetadata,
        server_command: Vec<String>,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            args,
            metadata,
            server_command,
            state: JobState::MetadataLoaded,
            bus,
            cancel,
            synthesizer: EventSynthesizer::new(),
            art_resolver: CoverArtResolver::new(),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Run the job to completion
    ///
    /// Never panics on pipeline failures; every path settles into a
    /// [`JobOutcome`] with the supervisor torn down.
    pub async fn run(mut self) -> JobOutcome {
        let started = Instant::now();
        info!(job_id = %self.id, song = %self.args.song_name, "Starting generation job");
        self.bus.emit_lossy(GeneratorEvent::JobStarted {
            job_id: self.id,
            song_name: self.args.song_name.clone(),
            timestamp: Utc::now(),
        });

        if bundle::output_exists(&self.args) {
            info!(
                job_id = %self.id,
                song = %self.args.song_name,
                "Output already exists, skipping"
            );
            self.transition(JobState::Done);
            let reason = "output already exists".to_string();
            self.bus.emit_lossy(GeneratorEvent::JobSkipped {
                job_id: self.id,
                song_name: self.args.song_name.clone(),
                reason: reason.clone(),
                timestamp: Utc::now(),
            });
            return JobOutcome::Skipped(reason);
        }

        let result = self.execute().await;
        // A failure after the batch was cancelled is reported as the
        // cancellation, not as whatever secondary error the dying
        // server produced.
        let result = match result {
            Err(e) if self.cancel.is_cancelled() && !matches!(e, GeneratorError::Cancelled) => {
                debug!(job_id = %self.id, "Suppressing post-cancel error: {}", e);
                Err(GeneratorError::Cancelled)
            }
            other => other,
        };

        match result {
            Ok(()) => {
                self.transition(JobState::Done);
                let duration_secs = started.elapsed().as_secs_f64();
                info!(
                    job_id = %self.id,
                    song = %self.args.song_name,
                    duration_secs,
                    "Job completed"
                );
                self.bus.emit_lossy(GeneratorEvent::JobCompleted {
                    job_id: self.id,
                    song_name: self.args.song_name.clone(),
                    duration_secs,
                    timestamp: Utc::now(),
                });
                JobOutcome::Completed
            }
            Err(error) => {
                self.transition(JobState::Failed);
                warn!(
                    job_id = %self.id,
                    song = %self.args.song_name,
                    "Job failed: {}",
                    error
                );
                self.bus.emit_lossy(GeneratorEvent::JobFailed {
                    job_id: self.id,
                    song_name: self.args.song_name.clone(),
                    error: error.to_string(),
                    timestamp: Utc::now(),
                });
                if let Err(e) = std::fs::remove_dir_all(&self.args.working_dir) {
                    debug!(job_id = %self.id, "Working directory cleanup: {}", e);
                }
                JobOutcome::Failed(error)
            }
        }
    }

    async fn execute(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.args.working_dir)?;

        self.art_resolver.resolve(
            self.args.album_art.as_deref(),
            self.metadata.embedded_art.as_deref(),
            &self.args.working_dir,
        )?;
        self.transition(JobState::ArtResolved);

        let mut supervisor = ProcessSupervisor::new(
            self.server_command.clone(),
            self.id,
            self.cancel.child_token(),
        );
        self.transition(JobState::ServerStarting);
        let client = supervisor.start().await?;
        self.transition(JobState::ServerReady);

        let result = self.generate(&client).await;
        supervisor.stop().await;
        result?;

        bundle::finalize_bundle(&self.args)?;
        self.transition(JobState::Packaged);

        if self.args.zip_output {
            info!(
                job_id = %self.id,
                "Zip archiving is not performed; the bundle is left as a directory"
            );
        }
        Ok(())
    }

    /// Everything that needs the server alive: analysis, notes,
    /// lighting, bundle files, audio conversion
    async fn generate(&mut self, client: &InferenceClient) -> Result<()> {
        let features = client.get_beat_features(&self.args.song_path).await?;
        info!(
            job_id = %self.id,
            bpm = features.bpm,
            beats = features.beat_times.len(),
            "Beat features extracted"
        );

        let mut tracks = Tracks::new(features);
        self.transition(JobState::NotesRequested);

        let isolate = self.args.difficulty.is_all();
        for difficulty in self.args.difficulty.difficulties() {
            if self.cancel.is_cancelled() {
                return Err(GeneratorError::Cancelled);
            }
            match self.run_difficulty(client, &tracks, difficulty).await {
                Ok(chart) => {
                    tracks.insert_chart(difficulty, chart);
                }
                Err(e) if isolate => {
                    // Continue with the remaining tiers (per-tier error isolation)
                    warn!(
                        job_id = %self.id,
                        difficulty = %difficulty,
                        "Difficulty failed: {}",
                        e
                    );
                    self.bus.emit_lossy(GeneratorEvent::DifficultySkipped {
                        job_id: self.id,
                        difficulty,
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if !tracks.has_charts() {
            return Err(GeneratorError::InvalidNotes(
                "no difficulty produced a usable chart".to_string(),
            ));
        }
        self.transition(JobState::NotesReceived);
        self.transition(JobState::EventsSynthesized);

        bundle::write_bundle_files(&self.args, &tracks)?;
        self.transition(JobState::Written);

        let response = client
            .convert_music_file(&self.args.song_path, &self.args.working_dir)
            .await?;
        debug!(job_id = %self.id, "Audio conversion: {}", response.trim());

        Ok(())
    }

    async fn run_difficulty(
        &self,
        client: &InferenceClient,
        tracks: &Tracks,
        difficulty: Difficulty,
    ) -> Result<DifficultyChart> {
        let notes = client
            .run_model(
                self.args.model,
                difficulty,
                &tracks.features,
                &self.args.format_version,
                &self.args.working_dir,
            )
            .await?;
        debug!(
            job_id = %self.id,
            difficulty = %difficulty,
            notes = notes.len(),
            "Notes received"
        );

        let events =
            self.synthesizer
                .synthesize(&notes, tracks.features.bpm, self.args.color_swap_offset)?;
        Ok(DifficultyChart::new(notes, events))
    }

    fn transition(&mut self, to: JobState) {
        let from = self.state;
        self.state = to;
        debug!(job_id = %self.id, from = ?from, to = ?to, "Job state change");
        self.bus.emit_lossy(GeneratorEvent::JobStateChanged {
            job_id: self.id,
            from,
            to,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::difficulty::DifficultySelector;
    use crate::models::song::Model;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn args(out_dir: PathBuf, working_dir: PathBuf) -> SongArgs {
        SongArgs {
            song_path: PathBuf::from("/music/demo.ogg"),
            song_name: "Demo - Artist".to_string(),
            difficulty: DifficultySelector::All,
            model: Model::Random,
            format_version: "2.0.0".to_string(),
            out_dir,
            working_dir,
            environment: "DefaultEnvironment".to_string(),
            color_swap_offset: 2.5,
            album_art: None,
            zip_output: false,
            seed: 0,
        }
    }

    fn job(args: SongArgs, cancel: CancellationToken) -> (GenerationJob, EventBus) {
        let bus = EventBus::new(64);
        let job = GenerationJob::new(
            args,
            SongMetadata::default(),
            vec!["definitely-not-a-real-program-mapsynth".to_string()],
            bus.clone(),
            cancel,
        );
        (job, bus)
    }

    #[tokio::test]
    async fn test_existing_output_short_circuits_to_done() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let args = args(out.path().to_path_buf(), work.path().join("job"));
        fs::create_dir_all(args.bundle_dir()).unwrap();
        fs::write(args.bundle_dir().join("info.dat"), "{}").unwrap();

        let (job, bus) = job(args, CancellationToken::new());
        let mut rx = bus.subscribe();
        let outcome = job.run().await;

        assert!(matches!(outcome, JobOutcome::Skipped(_)));
        // JobStarted, then the Done transition, then JobSkipped.
        let mut saw_skip = false;
        while let Ok(event) = rx.try_recv() {
            if let GeneratorEvent::JobSkipped { reason, .. } = event {
                assert!(reason.contains("already exists"));
                saw_skip = true;
            }
        }
        assert!(saw_skip);
    }

    #[tokio::test]
    async fn test_zip_archive_also_short_circuits() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let args = args(out.path().to_path_buf(), work.path().join("job"));
        fs::write(args.zip_path(), b"zip").unwrap();

        let (job, _bus) = job(args, CancellationToken::new());
        assert!(matches!(job.run().await, JobOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_unspawnable_server_fails_the_job() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let args = args(out.path().to_path_buf(), work.path().join("job"));

        let (job, bus) = job(args, CancellationToken::new());
        let mut rx = bus.subscribe();
        let outcome = job.run().await;

        match outcome {
            JobOutcome::Failed(GeneratorError::SpawnFailed(_)) => {}
            other => panic!("expected SpawnFailed, got {:?}", other),
        }
        let mut saw_failed = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, GeneratorEvent::JobFailed { .. }) {
                saw_failed = true;
            }
        }
        assert!(saw_failed);
    }

    #[tokio::test]
    async fn test_pre_cancelled_job_reports_cancelled() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let args = args(out.path().to_path_buf(), work.path().join("job"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (job, _bus) = job(args, cancel);

        match job.run().await {
            JobOutcome::Failed(GeneratorError::Cancelled) => {}
            other => panic!("expected Cancelled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_job_cleans_its_working_directory() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let working_dir = work.path().join("job");
        let args = args(out.path().to_path_buf(), working_dir.clone());

        let (job, _bus) = job(args, CancellationToken::new());
        let _ = job.run().await;
        assert!(!working_dir.exists());
    }
}
