//! Typed writers for the on-disk bundle (info file, beatmap files)
//!
//! Files are written into the job's working directory first, then moved
//! into the output directory once the whole bundle is complete, so a
//! crashed job never leaves a half-written bundle behind.

use crate::error::{GeneratorError, Result};
use crate::models::chart::{Event, Note, Obstacle};
use crate::models::difficulty::Difficulty;
use crate::models::song::SongArgs;
use crate::models::tracks::{DifficultyChart, Tracks};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Fixed level author written to every info file
pub const LEVEL_AUTHOR: &str = "MapSynth";
/// Converted audio file name inside the bundle
pub const SONG_FILENAME: &str = "song.egg";
/// Cover image file name inside the bundle
pub const COVER_FILENAME: &str = "cover.jpg";
/// Metadata file name inside the bundle
pub const INFO_FILENAME: &str = "info.dat";

/// Top-level `info.dat` structure (v2 schema)
#[derive(Debug, Clone, Serialize)]
pub struct InfoFile {
    #[serde(rename = "_version")]
    pub version: String,
    #[serde(rename = "_songName")]
    pub song_name: String,
    #[serde(rename = "_songSubName")]
    pub song_sub_name: String,
    #[serde(rename = "_songAuthorName")]
    pub song_author_name: String,
    #[serde(rename = "_levelAuthorName")]
    pub level_author_name: String,
    #[serde(rename = "_beatsPerMinute")]
    pub beats_per_minute: u32,
    #[serde(rename = "_songTimeOffset")]
    pub song_time_offset: u32,
    #[serde(rename = "_shuffle")]
    pub shuffle: u32,
    #[serde(rename = "_shufflePeriod")]
    pub shuffle_period: f64,
    #[serde(rename = "_previewStartTime")]
    pub preview_start_time: u32,
    #[serde(rename = "_previewDuration")]
    pub preview_duration: u32,
    #[serde(rename = "_songFilename")]
    pub song_filename: String,
    #[serde(rename = "_coverImageFilename")]
    pub cover_image_filename: String,
    #[serde(rename = "_environmentName")]
    pub environment_name: String,
    #[serde(rename = "_difficultyBeatmapSets")]
    pub difficulty_beatmap_sets: Vec<BeatmapSet>,
}

/// One characteristic's worth of beatmap descriptors
#[derive(Debug, Clone, Serialize)]
pub struct BeatmapSet {
    #[serde(rename = "_beatmapCharacteristicName")]
    pub beatmap_characteristic_name: String,
    #[serde(rename = "_difficultyBeatmaps")]
    pub difficulty_beatmaps: Vec<BeatmapDescriptor>,
}

/// Descriptor for a single difficulty's beatmap file
#[derive(Debug, Clone, Serialize)]
pub struct BeatmapDescriptor {
    #[serde(rename = "_difficulty")]
    pub difficulty: String,
    #[serde(rename = "_difficultyRank")]
    pub difficulty_rank: u8,
    #[serde(rename = "_beatmapFilename")]
    pub beatmap_filename: String,
    #[serde(rename = "_noteJumpMovementSpeed")]
    pub note_jump_movement_speed: u8,
    #[serde(rename = "_noteJumpStartBeatOffset")]
    pub note_jump_start_beat_offset: u8,
}

impl InfoFile {
    /// Assemble the info file for the tiers that actually produced charts
    pub fn from_job(args: &SongArgs, bpm: f64, tiers: &[Difficulty]) -> Self {
        // rsplit always yields at least one segment.
        let author = args
            .song_name
            .rsplit(" - ")
            .next()
            .unwrap_or(&args.song_name)
            .to_string();

        let beatmaps = tiers
            .iter()
            .map(|d| BeatmapDescriptor {
                difficulty: d.display_name().to_string(),
                difficulty_rank: d.rank(),
                beatmap_filename: d.file_name(),
                note_jump_movement_speed: d.note_jump_speed(),
                note_jump_start_beat_offset: 0,
            })
            .collect();

        Self {
            version: args.format_version.clone(),
            song_name: args.song_name.clone(),
            song_sub_name: String::new(),
            song_author_name: author,
            level_author_name: LEVEL_AUTHOR.to_string(),
            beats_per_minute: bpm.floor() as u32,
            song_time_offset: 0,
            shuffle: 0,
            shuffle_period: 0.5,
            preview_start_time: 10,
            preview_duration: 30,
            song_filename: SONG_FILENAME.to_string(),
            cover_image_filename: COVER_FILENAME.to_string(),
            environment_name: args.environment.clone(),
            difficulty_beatmap_sets: vec![BeatmapSet {
                beatmap_characteristic_name: "Standard".to_string(),
                difficulty_beatmaps: beatmaps,
            }],
        }
    }
}

/// Top-level `<Difficulty>.dat` structure (v2 schema)
#[derive(Debug, Clone, Serialize)]
pub struct LevelFile {
    #[serde(rename = "_version")]
    pub version: String,
    #[serde(rename = "_customData")]
    pub custom_data: LevelCustomData,
    #[serde(rename = "_events")]
    pub events: Vec<Event>,
    #[serde(rename = "_notes")]
    pub notes: Vec<Note>,
    #[serde(rename = "_obstacles")]
    pub obstacles: Vec<Obstacle>,
}

/// Editor bookkeeping block carried verbatim in every beatmap file
#[derive(Debug, Clone, Serialize)]
pub struct LevelCustomData {
    #[serde(rename = "_time")]
    pub time: String,
    #[serde(rename = "_BPMChanges")]
    pub bpm_changes: Vec<serde_json::Value>,
    #[serde(rename = "_bookmarks")]
    pub bookmarks: Vec<serde_json::Value>,
}

impl Default for LevelCustomData {
    fn default() -> Self {
        Self {
            time: String::new(),
            bpm_changes: Vec::new(),
            bookmarks: Vec::new(),
        }
    }
}

impl LevelFile {
    pub fn from_chart(version: &str, chart: &DifficultyChart) -> Self {
        Self {
            version: version.to_string(),
            custom_data: LevelCustomData::default(),
            events: chart.events.clone(),
            notes: chart.notes.clone(),
            obstacles: chart.obstacles.clone(),
        }
    }
}

/// Whether this song's output already exists in finished form
pub fn output_exists(args: &SongArgs) -> bool {
    args.bundle_dir().join(INFO_FILENAME).exists() || args.zip_path().exists()
}

/// Write `info.dat` and one beatmap file per produced tier into the
/// job's working directory
pub fn write_bundle_files(args: &SongArgs, tracks: &Tracks) -> Result<()> {
    let tiers: Vec<Difficulty> = tracks.charts.keys().copied().collect();
    let info = InfoFile::from_job(args, tracks.features.bpm, &tiers);
    write_json(&args.working_dir.join(INFO_FILENAME), &info)?;

    for (difficulty, chart) in &tracks.charts {
        let level = LevelFile::from_chart(&args.format_version, chart);
        write_json(&args.working_dir.join(difficulty.file_name()), &level)?;
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)
        .map_err(|e| GeneratorError::PackagingFailed(format!("serialize {}: {}", path.display(), e)))?;
    fs::write(path, json)
        .map_err(|e| GeneratorError::PackagingFailed(format!("write {}: {}", path.display(), e)))?;
    Ok(())
}

/// Move the finished bundle from the working directory into the output
/// directory, then remove the working directory
///
/// Copy-then-delete rather than rename, since the working directory may
/// sit on a different filesystem than the output.
pub fn finalize_bundle(args: &SongArgs) -> Result<()> {
    let dest = args.bundle_dir();
    fs::create_dir_all(&dest)
        .map_err(|e| GeneratorError::PackagingFailed(format!("create {}: {}", dest.display(), e)))?;

    let entries = fs::read_dir(&args.working_dir).map_err(|e| {
        GeneratorError::PackagingFailed(format!("read {}: {}", args.working_dir.display(), e))
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| GeneratorError::PackagingFailed(e.to_string()))?;
        let target = dest.join(entry.file_name());
        fs::copy(entry.path(), &target).map_err(|e| {
            GeneratorError::PackagingFailed(format!("copy {}: {}", target.display(), e))
        })?;
    }

    fs::remove_dir_all(&args.working_dir).map_err(|e| {
        GeneratorError::PackagingFailed(format!("remove {}: {}", args.working_dir.display(), e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::difficulty::DifficultySelector;
    use crate::models::song::Model;
    use crate::models::tracks::BeatFeatures;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn args(out_dir: PathBuf, working_dir: PathBuf) -> SongArgs {
        SongArgs {
            song_path: PathBuf::from("/music/demo.ogg"),
            song_name: "Demo Song - Some Artist".to_string(),
            difficulty: DifficultySelector::All,
            model: Model::Random,
            format_version: "2.0.0".to_string(),
            out_dir,
            working_dir,
            environment: "NiceEnvironment".to_string(),
            color_swap_offset: 2.5,
            album_art: None,
            zip_output: false,
            seed: 0,
        }
    }

    #[test]
    fn test_info_file_constants_and_author_split() {
        let args = args(PathBuf::from("/out"), PathBuf::from("/work"));
        let info = InfoFile::from_job(&args, 128.9, &[Difficulty::Easy, Difficulty::Expert]);

        assert_eq!(info.version, "2.0.0");
        assert_eq!(info.song_name, "Demo Song - Some Artist");
        assert_eq!(info.song_author_name, "Some Artist");
        assert_eq!(info.level_author_name, "MapSynth");
        assert_eq!(info.beats_per_minute, 128);
        assert_eq!(info.shuffle_period, 0.5);
        assert_eq!(info.preview_start_time, 10);
        assert_eq!(info.preview_duration, 30);
        assert_eq!(info.song_filename, "song.egg");
        assert_eq!(info.cover_image_filename, "cover.jpg");
        assert_eq!(info.environment_name, "NiceEnvironment");

        let set = &info.difficulty_beatmap_sets[0];
        assert_eq!(set.beatmap_characteristic_name, "Standard");
        assert_eq!(set.difficulty_beatmaps.len(), 2);
        assert_eq!(set.difficulty_beatmaps[0].difficulty, "Easy");
        assert_eq!(set.difficulty_beatmaps[0].difficulty_rank, 1);
        assert_eq!(set.difficulty_beatmaps[0].note_jump_movement_speed, 8);
        assert_eq!(set.difficulty_beatmaps[1].beatmap_filename, "Expert.dat");
        assert_eq!(set.difficulty_beatmaps[1].note_jump_start_beat_offset, 0);
    }

    #[test]
    fn test_level_file_custom_data_shape() {
        let level = LevelFile::from_chart("2.0.0", &DifficultyChart::default());
        let json = serde_json::to_value(&level).unwrap();
        assert_eq!(json["_customData"]["_time"], "");
        assert!(json["_customData"]["_BPMChanges"].as_array().unwrap().is_empty());
        assert!(json["_customData"]["_bookmarks"].as_array().unwrap().is_empty());
        assert!(json["_events"].as_array().unwrap().is_empty());
        assert!(json["_obstacles"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_output_exists_checks_info_and_zip() {
        let out = TempDir::new().unwrap();
        let args = args(out.path().to_path_buf(), PathBuf::from("/unused"));
        assert!(!output_exists(&args));

        fs::create_dir_all(args.bundle_dir()).unwrap();
        fs::write(args.bundle_dir().join(INFO_FILENAME), "{}").unwrap();
        assert!(output_exists(&args));

        fs::remove_dir_all(args.bundle_dir()).unwrap();
        fs::write(args.zip_path(), b"zip").unwrap();
        assert!(output_exists(&args));
    }

    #[test]
    fn test_write_and_finalize_bundle() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let working_dir = work.path().join("job");
        fs::create_dir_all(&working_dir).unwrap();
        let args = args(out.path().to_path_buf(), working_dir.clone());

        let mut tracks = Tracks::new(BeatFeatures {
            bpm: 100.0,
            beat_times: vec![0.5],
            y: vec![0.0],
            sr: 22050,
        });
        tracks.insert_chart(Difficulty::Normal, DifficultyChart::default());

        write_bundle_files(&args, &tracks).unwrap();
        fs::write(working_dir.join(SONG_FILENAME), b"egg").unwrap();
        finalize_bundle(&args).unwrap();

        assert!(!working_dir.exists());
        let bundle = args.bundle_dir();
        assert!(bundle.join(INFO_FILENAME).exists());
        assert!(bundle.join("Normal.dat").exists());
        assert!(bundle.join(SONG_FILENAME).exists());

        let info: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(bundle.join(INFO_FILENAME)).unwrap()).unwrap();
        assert_eq!(info["_beatsPerMinute"], 100);
    }
}
