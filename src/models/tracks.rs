//! Per-song audio analysis results and accumulated chart state

use crate::models::chart::{Event, Note, Obstacle};
use crate::models::difficulty::Difficulty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Audio analysis returned by the inference server
///
/// `beat_times`, `y` and `sr` are opaque to the orchestrator; they are
/// held only to be echoed back into model requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatFeatures {
    /// Estimated tempo in beats per minute
    pub bpm: f64,
    /// Beat onset times in seconds
    pub beat_times: Vec<f64>,
    /// Downsampled audio signal
    pub y: Vec<f64>,
    /// Sample rate of `y`
    pub sr: u32,
}

/// Notes, lighting events and obstacles for one difficulty tier
#[derive(Debug, Clone, Default)]
pub struct DifficultyChart {
    pub notes: Vec<Note>,
    pub events: Vec<Event>,
    /// Always empty; the generator does not place walls
    pub obstacles: Vec<Obstacle>,
}

impl DifficultyChart {
    pub fn new(notes: Vec<Note>, events: Vec<Event>) -> Self {
        Self {
            notes,
            events,
            obstacles: Vec::new(),
        }
    }
}

/// All per-song state accumulated while a job runs
///
/// Charts are keyed by difficulty in a BTreeMap so the info file lists
/// tiers in ascending order.
#[derive(Debug, Clone)]
pub struct Tracks {
    pub features: BeatFeatures,
    pub charts: BTreeMap<Difficulty, DifficultyChart>,
}

impl Tracks {
    pub fn new(features: BeatFeatures) -> Self {
        Self {
            features,
            charts: BTreeMap::new(),
        }
    }

    pub fn insert_chart(&mut self, difficulty: Difficulty, chart: DifficultyChart) {
        self.charts.insert(difficulty, chart);
    }

    /// Whether at least one tier produced a chart
    pub fn has_charts(&self) -> bool {
        !self.charts.is_empty()
    }
}
