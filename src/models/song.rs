//! Per-song job parameters, model selection, and environment handling

use crate::error::{GeneratorError, Result};
use crate::models::difficulty::DifficultySelector;
use clap::ValueEnum;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Note-generation model, passed through to the inference server verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Model {
    #[serde(rename = "random")]
    #[value(name = "random")]
    Random,
    #[serde(rename = "HMM")]
    #[value(name = "HMM")]
    Hmm,
    #[serde(rename = "segmented_HMM")]
    #[value(name = "segmented_HMM")]
    SegmentedHmm,
    #[serde(rename = "rate_modulated_segmented_HMM")]
    #[value(name = "rate_modulated_segmented_HMM")]
    RateModulatedSegmentedHmm,
}

impl Model {
    /// Wire name expected by the inference server
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Random => "random",
            Model::Hmm => "HMM",
            Model::SegmentedHmm => "segmented_HMM",
            Model::RateModulatedSegmentedHmm => "rate_modulated_segmented_HMM",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visual environments a bundle can request
pub const ENVIRONMENTS: [&str; 13] = [
    "DefaultEnvironment",
    "BigMirrorEnvironment",
    "Origins",
    "NiceEnvironment",
    "TriangleEnvironment",
    "KDAEnvironment",
    "DragonsEnvironment",
    "MonstercatEnvironment",
    "CrabRaveEnvironment",
    "PanicEnvironment",
    "RocketEnvironment",
    "GreenDayEnvironment",
    "GreenDayGrenadeEnvironment",
];

/// Sentinel requesting a randomly chosen environment per song
pub const RANDOM_ENVIRONMENT: &str = "RANDOM";

/// Resolve a requested environment name to a concrete one
///
/// `RANDOM` picks from [`ENVIRONMENTS`] using the supplied RNG so runs
/// with a fixed seed stay reproducible. A name outside the known list
/// is a configuration error.
pub fn resolve_environment<R: Rng>(requested: &str, rng: &mut R) -> Result<String> {
    if requested.eq_ignore_ascii_case(RANDOM_ENVIRONMENT) {
        // The list is non-empty, so choose() cannot return None.
        let picked = ENVIRONMENTS
            .choose(rng)
            .copied()
            .unwrap_or("DefaultEnvironment");
        return Ok(picked.to_string());
    }

    match ENVIRONMENTS.iter().find(|e| **e == requested) {
        Some(found) => Ok((*found).to_string()),
        None => Err(GeneratorError::Config(format!(
            "unknown environment '{}' (use RANDOM or one of: {})",
            requested,
            ENVIRONMENTS.join(", ")
        ))),
    }
}

/// Strip characters that are invalid in file names on common platforms
pub fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>'))
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Build the bundle directory name from tag metadata
///
/// Falls back to the audio file stem when the title tag is missing and
/// to `Unknown Artist` when the artist tag is missing, so every song
/// gets a usable name.
pub fn song_name_from_tags(title: Option<&str>, artist: Option<&str>, path: &Path) -> String {
    let title = title
        .map(sanitize_component)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| sanitize_component(&s.to_string_lossy()))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string())
        });
    let artist = artist
        .map(sanitize_component)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| "Unknown Artist".to_string());

    format!("{} - {}", title, artist)
}

/// Everything a single generation job needs to run
///
/// Built up front by the scheduler so the job itself never consults
/// global settings.
#[derive(Debug, Clone)]
pub struct SongArgs {
    /// Source audio file
    pub song_path: PathBuf,
    /// Sanitized `Title - Artist` bundle name
    pub song_name: String,
    /// Tiers to generate
    pub difficulty: DifficultySelector,
    /// Note-generation model
    pub model: Model,
    /// Beatmap schema version written to the bundle files
    pub format_version: String,
    /// Final destination directory for finished bundles
    pub out_dir: PathBuf,
    /// Scratch directory for this job, removed on completion
    pub working_dir: PathBuf,
    /// Concrete environment name (already resolved, never `RANDOM`)
    pub environment: String,
    /// Minimum seconds between primary lighting changes
    pub color_swap_offset: f64,
    /// Explicit cover image overriding embedded art
    pub album_art: Option<PathBuf>,
    /// Whether a zip archive was requested for the bundle
    pub zip_output: bool,
    /// Seed for this job's deterministic choices
    pub seed: u64,
}

impl SongArgs {
    /// Directory the finished bundle will occupy
    pub fn bundle_dir(&self) -> PathBuf {
        self.out_dir.join(&self.song_name)
    }

    /// Archive path checked for the zip form of the bundle
    pub fn zip_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.zip", self.song_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_model_wire_names() {
        assert_eq!(Model::Random.as_str(), "random");
        assert_eq!(Model::Hmm.as_str(), "HMM");
        assert_eq!(Model::SegmentedHmm.as_str(), "segmented_HMM");
        assert_eq!(
            Model::RateModulatedSegmentedHmm.as_str(),
            "rate_modulated_segmented_HMM"
        );
    }

    #[test]
    fn test_model_serde_matches_wire_names() {
        let json = serde_json::to_string(&Model::RateModulatedSegmentedHmm).unwrap();
        assert_eq!(json, "\"rate_modulated_segmented_HMM\"");
    }

    #[test]
    fn test_sanitize_strips_path_separators() {
        assert_eq!(sanitize_component("AC/DC"), "ACDC");
        assert_eq!(sanitize_component("what? really*"), "what really");
        assert_eq!(sanitize_component("  spaced  "), "spaced");
    }

    #[test]
    fn test_song_name_uses_tags_when_present() {
        let name = song_name_from_tags(
            Some("Thunderstruck"),
            Some("AC/DC"),
            Path::new("/music/track01.ogg"),
        );
        assert_eq!(name, "Thunderstruck - ACDC");
    }

    #[test]
    fn test_song_name_falls_back_to_file_stem_and_unknown_artist() {
        let name = song_name_from_tags(None, None, Path::new("/music/track01.ogg"));
        assert_eq!(name, "track01 - Unknown Artist");
    }

    #[test]
    fn test_song_name_treats_empty_tags_as_missing() {
        let name = song_name_from_tags(Some("   "), Some(""), Path::new("/music/demo.mp3"));
        assert_eq!(name, "demo - Unknown Artist");
    }

    #[test]
    fn test_resolve_environment_passes_known_names_through() {
        let mut rng = StdRng::seed_from_u64(7);
        let resolved = resolve_environment("NiceEnvironment", &mut rng).unwrap();
        assert_eq!(resolved, "NiceEnvironment");
    }

    #[test]
    fn test_resolve_environment_random_is_deterministic_per_seed() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let first = resolve_environment("RANDOM", &mut a).unwrap();
        let second = resolve_environment("RANDOM", &mut b).unwrap();
        assert_eq!(first, second);
        assert!(ENVIRONMENTS.contains(&first.as_str()));
    }

    #[test]
    fn test_resolve_environment_rejects_unknown_names() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(resolve_environment("MoonEnvironment", &mut rng).is_err());
    }

    #[test]
    fn test_bundle_paths() {
        let args = SongArgs {
            song_path: PathBuf::from("/music/a.ogg"),
            song_name: "A - B".to_string(),
            difficulty: DifficultySelector::All,
            model: Model::Random,
            format_version: "2.0.0".to_string(),
            out_dir: PathBuf::from("/out"),
            working_dir: PathBuf::from("/tmp/job"),
            environment: "DefaultEnvironment".to_string(),
            color_swap_offset: 2.5,
            album_art: None,
            zip_output: false,
            seed: 1,
        };
        assert_eq!(args.bundle_dir(), PathBuf::from("/out/A - B"));
        assert_eq!(args.zip_path(), PathBuf::from("/out/A - B.zip"));
    }
}
