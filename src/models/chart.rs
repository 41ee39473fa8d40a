//! Chart primitives shared between the RPC layer and bundle writers
//!
//! Field names follow the v2 beatmap schema (`_time`, `_type`, ...),
//! which is also the shape the model server returns notes in.

use serde::{Deserialize, Serialize};

/// A single note block placed on the grid
///
/// Notes arrive from the model server and are written through to the
/// beatmap file unchanged. Only `_time` is required when parsing;
/// missing grid fields default to zero so a sparse payload still
/// deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Placement time in beats
    #[serde(rename = "_time")]
    pub time: f64,
    /// Horizontal column (0-3, left to right)
    #[serde(rename = "_lineIndex", default)]
    pub line_index: i64,
    /// Vertical row (0-2, bottom to top)
    #[serde(rename = "_lineLayer", default)]
    pub line_layer: i64,
    /// Color hand: 0 = left, 1 = right, 3 = bomb
    #[serde(rename = "_type", default)]
    pub kind: i64,
    /// Required swing direction (0-8)
    #[serde(rename = "_cutDirection", default)]
    pub cut_direction: i64,
}

/// A lighting event emitted by the synthesizer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event time in beats
    #[serde(rename = "_time")]
    pub time: f64,
    /// Target channel (lights, lasers, rings, speeds)
    #[serde(rename = "_type")]
    pub event_type: u8,
    /// Channel-specific value (off, on, fade, color)
    #[serde(rename = "_value")]
    pub value: u8,
}

impl Event {
    pub fn new(time: f64, event_type: u8, value: u8) -> Self {
        Self {
            time,
            event_type,
            value,
        }
    }
}

/// A wall segment
///
/// The generator never places obstacles; beatmap files always carry an
/// empty obstacle list. The type exists so the file schema is complete.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    #[serde(rename = "_time")]
    pub time: f64,
    #[serde(rename = "_lineIndex")]
    pub line_index: i64,
    #[serde(rename = "_type")]
    pub kind: i64,
    #[serde(rename = "_duration")]
    pub duration: f64,
    #[serde(rename = "_width")]
    pub width: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_parses_full_payload() {
        let json = r#"{"_time": 4.5, "_lineIndex": 2, "_lineLayer": 1, "_type": 0, "_cutDirection": 8}"#;
        let note: Note = serde_json::from_str(json).unwrap();
        assert_eq!(note.time, 4.5);
        assert_eq!(note.line_index, 2);
        assert_eq!(note.line_layer, 1);
        assert_eq!(note.kind, 0);
        assert_eq!(note.cut_direction, 8);
    }

    #[test]
    fn test_note_grid_fields_default_to_zero() {
        let note: Note = serde_json::from_str(r#"{"_time": 1.0}"#).unwrap();
        assert_eq!(note.time, 1.0);
        assert_eq!(note.line_index, 0);
        assert_eq!(note.kind, 0);
    }

    #[test]
    fn test_note_without_time_is_rejected() {
        assert!(serde_json::from_str::<Note>(r#"{"_lineIndex": 1}"#).is_err());
    }

    #[test]
    fn test_event_serializes_with_underscore_names() {
        let event = Event::new(0.0, 4, 0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["_time"], 0.0);
        assert_eq!(json["_type"], 4);
        assert_eq!(json["_value"], 0);
    }
}
