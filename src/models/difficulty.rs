//! Difficulty tiers and the job-level difficulty selector

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five fixed skill tiers
///
/// Ordering follows ascending skill so iteration and map keys stay in
/// easy-to-expertplus order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    Expert,
    #[value(name = "expertplus")]
    ExpertPlus,
}

impl Difficulty {
    /// All tiers, ascending
    pub const ALL: [Difficulty; 5] = [
        Difficulty::Easy,
        Difficulty::Normal,
        Difficulty::Hard,
        Difficulty::Expert,
        Difficulty::ExpertPlus,
    ];

    /// Lowercase wire name, used in RPC payloads and the CLI
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
            Difficulty::ExpertPlus => "expertplus",
        }
    }

    /// Display-cased name, used for `_difficulty` and the beatmap filename
    pub fn display_name(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Normal => "Normal",
            Difficulty::Hard => "Hard",
            Difficulty::Expert => "Expert",
            Difficulty::ExpertPlus => "ExpertPlus",
        }
    }

    /// Beatmap filename inside the bundle, e.g. `Expert.dat`
    pub fn file_name(&self) -> String {
        format!("{}.dat", self.display_name())
    }

    /// Fixed difficulty rank written to the info file
    pub fn rank(&self) -> u8 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Normal => 3,
            Difficulty::Hard => 5,
            Difficulty::Expert => 7,
            Difficulty::ExpertPlus => 9,
        }
    }

    /// Fixed note-jump movement speed written to the info file
    pub fn note_jump_speed(&self) -> u8 {
        match self {
            Difficulty::Easy => 8,
            Difficulty::Normal => 10,
            Difficulty::Hard => 12,
            Difficulty::Expert => 14,
            Difficulty::ExpertPlus => 16,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            "expert" => Ok(Difficulty::Expert),
            "expertplus" => Ok(Difficulty::ExpertPlus),
            other => Err(format!(
                "unknown difficulty '{}' (expected easy, normal, hard, expert, expertplus or all)",
                other
            )),
        }
    }
}

/// Job-level difficulty selection: one tier, or `all` meaning every tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultySelector {
    /// Run once for each of the five tiers
    All,
    /// Run a single tier
    One(Difficulty),
}

impl DifficultySelector {
    /// The tiers a job with this selector will attempt, in ascending order
    pub fn difficulties(&self) -> Vec<Difficulty> {
        match self {
            DifficultySelector::All => Difficulty::ALL.to_vec(),
            DifficultySelector::One(d) => vec![*d],
        }
    }

    /// Whether per-difficulty errors should be isolated rather than
    /// failing the job outright
    pub fn is_all(&self) -> bool {
        matches!(self, DifficultySelector::All)
    }
}

impl fmt::Display for DifficultySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DifficultySelector::All => f.write_str("all"),
            DifficultySelector::One(d) => f.write_str(d.as_str()),
        }
    }
}

impl FromStr for DifficultySelector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(DifficultySelector::All)
        } else {
            <Difficulty as FromStr>::from_str(s).map(DifficultySelector::One)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for difficulty in Difficulty::ALL {
            assert_eq!(
                <Difficulty as FromStr>::from_str(difficulty.as_str()),
                Ok(difficulty)
            );
        }
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Difficulty::ExpertPlus).unwrap();
        assert_eq!(json, "\"expertplus\"");
        let back: Difficulty = serde_json::from_str("\"expertplus\"").unwrap();
        assert_eq!(back, Difficulty::ExpertPlus);
    }

    #[test]
    fn test_rank_and_jump_speed_constants() {
        let ranks: Vec<u8> = Difficulty::ALL.iter().map(|d| d.rank()).collect();
        assert_eq!(ranks, vec![1, 3, 5, 7, 9]);

        let speeds: Vec<u8> = Difficulty::ALL.iter().map(|d| d.note_jump_speed()).collect();
        assert_eq!(speeds, vec![8, 10, 12, 14, 16]);
    }

    #[test]
    fn test_selector_all_expands_to_five_tiers() {
        let selector: DifficultySelector = "all".parse().unwrap();
        assert_eq!(selector, DifficultySelector::All);
        assert_eq!(selector.difficulties().len(), 5);
        assert_eq!(selector.difficulties()[0], Difficulty::Easy);
        assert_eq!(selector.difficulties()[4], Difficulty::ExpertPlus);
    }

    #[test]
    fn test_selector_single_tier() {
        let selector: DifficultySelector = "hard".parse().unwrap();
        assert_eq!(selector, DifficultySelector::One(Difficulty::Hard));
        assert_eq!(selector.difficulties(), vec![Difficulty::Hard]);
        assert!(!selector.is_all());
    }

    #[test]
    fn test_selector_rejects_unknown_names() {
        assert!("impossible".parse::<DifficultySelector>().is_err());
    }

    #[test]
    fn test_beatmap_file_names() {
        assert_eq!(Difficulty::Easy.file_name(), "Easy.dat");
        assert_eq!(Difficulty::ExpertPlus.file_name(), "ExpertPlus.dat");
    }
}
