//! # MapSynth
//!
//! Batch generation of Beat Saber map bundles from audio files:
//! - Audio discovery and tag-based bundle naming
//! - Supervision of the Python inference server over local HTTP
//! - Note generation per difficulty tier
//! - Deterministic lighting synthesis from the note chart
//! - Bundle assembly (info.dat, difficulty files, cover, audio)

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod services;
pub mod system;

pub use error::{GeneratorError, Result};
pub use events::{EventBus, GeneratorEvent};
