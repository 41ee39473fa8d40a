//! Data models for the beatmap generator

pub mod bundle;
pub mod chart;
pub mod difficulty;
pub mod song;
pub mod tracks;

pub use bundle::{InfoFile, LevelFile};
pub use chart::{Event, Note, Obstacle};
pub use difficulty::{Difficulty, DifficultySelector};
pub use song::{Model, SongArgs};
pub use tracks::{BeatFeatures, DifficultyChart, Tracks};
