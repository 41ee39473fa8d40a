//! Batch scheduling across songs
//!
//! The scheduler prepares one job per input file, runs jobs under a
//! bounded worker ceiling, races each against the processing ceiling
//! and rolls the outcomes into a batch summary. Cancellation fans out
//! through child tokens so every in-flight server comes down with the
//! batch.

use crate::config::Settings;
use crate::error::GeneratorError;
use crate::events::{EventBus, GeneratorEvent};
use crate::models::song::{self, SongArgs};
use crate::services::generation_job::{GenerationJob, JobOutcome};
use crate::services::metadata::MetadataExtractor;
use crate::services::supervisor::PROCESSING_CEILING;
use crate::system;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome counts for one batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub duration_secs: f64,
}

impl BatchSummary {
    fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Completed => self.succeeded += 1,
            JobOutcome::Skipped(_) => self.skipped += 1,
            JobOutcome::Failed(GeneratorError::Cancelled) => self.cancelled += 1,
            JobOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// A job built during the prepare phase, waiting for a worker slot
struct PreparedJob {
    job: GenerationJob,
    cancel: CancellationToken,
}

/// Runs generation jobs with bounded concurrency
pub struct JobScheduler {
    bus: EventBus,
    cancel: CancellationToken,
}

impl JobScheduler {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            cancel: CancellationToken::new(),
        }
    }

    /// Request that the whole batch stop
    ///
    /// Safe to call more than once and from any task; in-flight jobs
    /// observe their child tokens and tear their servers down.
    pub fn cancel_all(&self) {
        if !self.cancel.is_cancelled() {
            info!("Cancelling batch");
        }
        self.cancel.cancel();
    }

    /// Run every file through the pipeline and return the tallied outcome
    pub async fn run_batch(&self, files: Vec<PathBuf>, settings: &Settings) -> BatchSummary {
        let started = Instant::now();
        let mut summary = BatchSummary {
            total: files.len(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            cancelled: 0,
            duration_secs: 0.0,
        };

        let mut pending = self.prepare_jobs(files, settings, &mut summary);
        let concurrency = settings.jobs.unwrap_or_else(system::usable_job_slots);
        info!(
            jobs = pending.len(),
            concurrency, "Starting batch generation"
        );

        let total = summary.total;
        let mut completed = summary.skipped;
        let mut in_flight = FuturesUnordered::new();
        while in_flight.len() < concurrency && !self.cancel.is_cancelled() {
            match pending.pop_front() {
                Some(prepared) => in_flight.push(Self::run_one(prepared, self.bus.clone())),
                None => break,
            }
        }

        while let Some(outcome) = in_flight.next().await {
            summary.record(&outcome);
            completed += 1;
            self.bus.emit_lossy(GeneratorEvent::BatchProgress {
                completed,
                total,
                timestamp: Utc::now(),
            });
            if !self.cancel.is_cancelled() {
                if let Some(prepared) = pending.pop_front() {
                    in_flight.push(Self::run_one(prepared, self.bus.clone()));
                }
            }
        }

        // Jobs still queued after a cancel never start; they count as
        // cancelled so the tallies cover every input.
        for prepared in pending {
            debug!(job_id = %prepared.job.id, "Cancelled before start");
            prepared.cancel.cancel();
            summary.cancelled += 1;
            completed += 1;
            self.bus.emit_lossy(GeneratorEvent::BatchProgress {
                completed,
                total,
                timestamp: Utc::now(),
            });
        }

        self.sweep_working_root(settings);
        summary.duration_secs = started.elapsed().as_secs_f64();
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            duration_secs = summary.duration_secs,
            "Batch finished"
        );
        self.bus.emit_lossy(GeneratorEvent::BatchFinished {
            total: summary.total,
            succeeded: summary.succeeded,
            failed: summary.failed,
            skipped: summary.skipped,
            cancelled: summary.cancelled,
            duration_secs: summary.duration_secs,
            timestamp: Utc::now(),
        });
        summary
    }

    /// Read tags, fix names, derive per-job seeds and scratch dirs
    ///
    /// Two files resolving to the same bundle name would race on one
    /// output directory, so later duplicates are skipped here rather
    /// than left to collide mid-batch.
    fn prepare_jobs(
        &self,
        files: Vec<PathBuf>,
        settings: &Settings,
        summary: &mut BatchSummary,
    ) -> VecDeque<PreparedJob> {
        let extractor = MetadataExtractor::new();
        let mut seen_names: HashSet<String> = HashSet::new();
        let mut prepared = VecDeque::new();

        for (index, path) in files.into_iter().enumerate() {
            let metadata = extractor.extract(&path);
            let song_name = song::song_name_from_tags(
                metadata.title.as_deref(),
                metadata.artist.as_deref(),
                &path,
            );
            if !seen_names.insert(song_name.clone()) {
                warn!(
                    song = %song_name,
                    path = %path.display(),
                    "Duplicate bundle name, skipping"
                );
                summary.skipped += 1;
                self.bus.emit_lossy(GeneratorEvent::JobSkipped {
                    job_id: Uuid::new_v4(),
                    song_name,
                    reason: "another input resolves to the same bundle name".to_string(),
                    timestamp: Utc::now(),
                });
                continue;
            }

            let seed = settings.seed.wrapping_add(index as u64);
            let mut rng = StdRng::seed_from_u64(seed);
            let environment = match song::resolve_environment(&settings.environment, &mut rng) {
                Ok(environment) => environment,
                Err(e) => {
                    // Settings validation already vetted the name.
                    warn!(song = %song_name, "Environment resolution failed: {}", e);
                    summary.failed += 1;
                    continue;
                }
            };

            let args = SongArgs {
                song_path: path,
                song_name,
                difficulty: settings.difficulty,
                model: settings.model,
                format_version: settings.format_version.clone(),
                out_dir: settings.out_dir.clone(),
                working_dir: settings
                    .working_dir
                    .join(format!("job-{}", Uuid::new_v4())),
                environment,
                color_swap_offset: settings.color_swap_offset_seconds(),
                album_art: settings.album_art.clone(),
                zip_output: settings.zip_output,
                seed,
            };
            let cancel = self.cancel.child_token();
            let job = GenerationJob::new(
                args,
                metadata,
                settings.server_command.clone(),
                self.bus.clone(),
                cancel.clone(),
            );
            prepared.push_back(PreparedJob { job, cancel });
        }
        prepared
    }

    /// Race one job against the processing ceiling
    ///
    /// On timeout the job future is dropped and its child token is
    /// cancelled; the supervisor's detached watcher takes the server
    /// process tree down.
    async fn run_one(prepared: PreparedJob, bus: EventBus) -> JobOutcome {
        let PreparedJob { job, cancel } = prepared;
        let job_id = job.id;
        let song_name = job.args.song_name.clone();
        match tokio::time::timeout(PROCESSING_CEILING, job.run()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                cancel.cancel();
                let error = GeneratorError::JobTimeout(PROCESSING_CEILING);
                warn!(job_id = %job_id, song = %song_name, "{}", error);
                bus.emit_lossy(GeneratorEvent::JobFailed {
                    job_id,
                    song_name,
                    error: error.to_string(),
                    timestamp: Utc::now(),
                });
                JobOutcome::Failed(error)
            }
        }
    }

    /// Remove scratch directories left behind by dropped or killed jobs
    fn sweep_working_root(&self, settings: &Settings) {
        let entries = match std::fs::read_dir(&settings.working_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with("job-") {
                continue;
            }
            let path = entry.path();
            debug!(path = %path.display(), "Sweeping leftover scratch directory");
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(path = %path.display(), "Scratch cleanup failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::difficulty::DifficultySelector;
    use crate::models::song::Model;
    use std::fs;
    use tempfile::TempDir;

    fn settings(inputs: Vec<PathBuf>, out_dir: PathBuf, working_dir: PathBuf) -> Settings {
        Settings {
            inputs,
            out_dir,
            working_dir,
            difficulty: DifficultySelector::All,
            model: Model::Random,
            environment: "DefaultEnvironment".to_string(),
            lights_intensity: 9,
            format_version: "2.0.0".to_string(),
            seed: 7,
            jobs: Some(2),
            server_command: vec!["definitely-not-a-real-program-mapsynth".to_string()],
            album_art: None,
            zip_output: false,
        }
    }

    #[tokio::test]
    async fn test_empty_batch_finishes_cleanly() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let settings = settings(
            Vec::new(),
            out.path().to_path_buf(),
            work.path().to_path_buf(),
        );
        let scheduler = JobScheduler::new(EventBus::new(64));
        let summary = scheduler.run_batch(Vec::new(), &settings).await;
        assert_eq!(summary.total, 0);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_duplicate_names_are_skipped_during_prepare() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let music = TempDir::new().unwrap();
        // Same stem in different directories collapses to one bundle name.
        let a = music.path().join("one").join("track.ogg");
        let b = music.path().join("two").join("track.ogg");
        fs::create_dir_all(a.parent().unwrap()).unwrap();
        fs::create_dir_all(b.parent().unwrap()).unwrap();
        fs::write(&a, b"not audio").unwrap();
        fs::write(&b, b"not audio").unwrap();

        let settings = settings(
            vec![a.clone(), b.clone()],
            out.path().to_path_buf(),
            work.path().to_path_buf(),
        );
        let scheduler = JobScheduler::new(EventBus::new(64));
        let summary = scheduler.run_batch(vec![a, b], &settings).await;
        // One skipped on the name, one failed at server spawn.
        assert_eq!(summary.total, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_batch_counts_queued_jobs_as_cancelled() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let music = TempDir::new().unwrap();
        let mut files = Vec::new();
        for i in 0..4 {
            let path = music.path().join(format!("song-{}.ogg", i));
            fs::write(&path, b"not audio").unwrap();
            files.push(path);
        }

        let settings = settings(
            files.clone(),
            out.path().to_path_buf(),
            work.path().to_path_buf(),
        );
        let scheduler = JobScheduler::new(EventBus::new(64));
        scheduler.cancel_all();
        scheduler.cancel_all();
        let summary = scheduler.run_batch(files, &settings).await;
        assert_eq!(summary.total, 4);
        assert_eq!(summary.cancelled, 4);
        assert_eq!(summary.succeeded, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_leftover_scratch_dirs() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let leftover = work.path().join("job-deadbeef");
        fs::create_dir_all(leftover.join("nested")).unwrap();
        let unrelated = work.path().join("keep-me");
        fs::create_dir_all(&unrelated).unwrap();

        let settings = settings(
            Vec::new(),
            out.path().to_path_buf(),
            work.path().to_path_buf(),
        );
        let scheduler = JobScheduler::new(EventBus::new(64));
        scheduler.run_batch(Vec::new(), &settings).await;
        assert!(!leftover.exists());
        assert!(unrelated.exists());
    }

    #[tokio::test]
    async fn test_batch_finished_event_carries_counts() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let music = TempDir::new().unwrap();
        let path = music.path().join("song.ogg");
        fs::write(&path, b"not audio").unwrap();

        let settings = settings(
            vec![path.clone()],
            out.path().to_path_buf(),
            work.path().to_path_buf(),
        );
        let bus = EventBus::new(256);
        let mut rx = bus.subscribe();
        let scheduler = JobScheduler::new(bus);
        scheduler.run_batch(vec![path], &settings).await;

        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            if let GeneratorEvent::BatchFinished { total, failed, .. } = event {
                finished = Some((total, failed));
            }
        }
        assert_eq!(finished, Some((1, 1)));
    }
}
