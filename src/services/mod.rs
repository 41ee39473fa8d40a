//! Service modules for the generation pipeline

pub mod cover_art;
pub mod event_synth;
pub mod file_scanner;
pub mod generation_job;
pub mod inference_client;
pub mod line_splitter;
pub mod metadata;
pub mod scheduler;
pub mod supervisor;

pub use cover_art::CoverArtResolver;
pub use event_synth::EventSynthesizer;
pub use file_scanner::FileScanner;
pub use generation_job::{GenerationJob, JobOutcome, JobState};
pub use inference_client::InferenceClient;
pub use line_splitter::LineSplitter;
pub use metadata::{MetadataExtractor, SongMetadata};
pub use scheduler::{BatchSummary, JobScheduler};
pub use supervisor::ProcessSupervisor;
