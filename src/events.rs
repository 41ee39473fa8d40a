//! Event types and broadcast bus for the generation pipeline
//!
//! Events are broadcast via [`EventBus`] and can be serialized for log
//! sinks or an SSE layer. All pipeline progress flows through this one
//! enum so consumers can match exhaustively.

use crate::models::Difficulty;
use crate::services::generation_job::JobState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeneratorEvent {
    /// Input scan started
    ScanStarted {
        /// Number of CLI inputs (files and directories) being scanned
        inputs: usize,
        /// When the scan started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Input scan finished
    ScanCompleted {
        /// Number of supported audio files found
        files: usize,
        /// When the scan finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A generation job began running
    ///
    /// Triggers:
    /// - UI: show the song as in-progress
    JobStarted {
        /// Job UUID
        job_id: Uuid,
        /// Bundle name (`Title - Artist`)
        song_name: String,
        /// When the job started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A job moved between pipeline states
    ///
    /// Triggers:
    /// - UI: per-song progress display
    JobStateChanged {
        /// Job UUID
        job_id: Uuid,
        /// State before the transition
        from: JobState,
        /// State after the transition
        to: JobState,
        /// When the transition happened
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One difficulty tier failed and was skipped within an `all` job
    ///
    /// Per-tier failures never fail the job while other tiers remain.
    DifficultySkipped {
        /// Job UUID
        job_id: Uuid,
        /// Tier that was skipped
        difficulty: Difficulty,
        /// Why the tier was skipped
        reason: String,
        /// When the tier was skipped
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Batch-level completion counter
    ///
    /// Emitted once per settled job (completed, skipped or failed).
    BatchProgress {
        /// Jobs settled so far
        completed: usize,
        /// Total jobs in the batch
        total: usize,
        /// When the counter updated
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A job finished and its bundle was packaged
    JobCompleted {
        /// Job UUID
        job_id: Uuid,
        /// Bundle name
        song_name: String,
        /// Wall-clock job duration in seconds
        duration_secs: f64,
        /// When the job completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A job was skipped without running
    ///
    /// Emitted when the output already exists or the bundle name
    /// collides with an earlier job in the same batch.
    JobSkipped {
        /// Job UUID
        job_id: Uuid,
        /// Bundle name
        song_name: String,
        /// Why the job was skipped
        reason: String,
        /// When the job was skipped
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A job failed
    JobFailed {
        /// Job UUID
        job_id: Uuid,
        /// Bundle name
        song_name: String,
        /// Error description
        error: String,
        /// When the job failed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The whole batch settled
    BatchFinished {
        /// Total jobs in the batch
        total: usize,
        /// Jobs that produced a bundle
        succeeded: usize,
        /// Jobs that failed
        failed: usize,
        /// Jobs skipped without running
        skipped: usize,
        /// Jobs cancelled before settling
        cancelled: usize,
        /// Wall-clock batch duration in seconds
        duration_secs: f64,
        /// When the batch finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl GeneratorEvent {
    /// Event type name for logging and SSE event fields
    pub fn event_type(&self) -> &str {
        match self {
            GeneratorEvent::ScanStarted { .. } => "ScanStarted",
            GeneratorEvent::ScanCompleted { .. } => "ScanCompleted",
            GeneratorEvent::JobStarted { .. } => "JobStarted",
            GeneratorEvent::JobStateChanged { .. } => "JobStateChanged",
            GeneratorEvent::DifficultySkipped { .. } => "DifficultySkipped",
            GeneratorEvent::BatchProgress { .. } => "BatchProgress",
            GeneratorEvent::JobCompleted { .. } => "JobCompleted",
            GeneratorEvent::JobSkipped { .. } => "JobSkipped",
            GeneratorEvent::JobFailed { .. } => "JobFailed",
            GeneratorEvent::BatchFinished { .. } => "BatchFinished",
        }
    }
}

/// Broadcast bus carrying [`GeneratorEvent`]s to all subscribers
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GeneratorEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<GeneratorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` otherwise.
    pub fn emit(
        &self,
        event: GeneratorEvent,
    ) -> Result<usize, broadcast::error::SendError<GeneratorEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    pub fn emit_lossy(&self, event: GeneratorEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
