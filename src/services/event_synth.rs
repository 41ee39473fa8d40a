//! Lighting event synthesis
//!
//! Pure, deterministic transform from a note chart to a lighting track.
//! No I/O and no randomness: the same notes, tempo and swap interval
//! always produce the same events. Emission order is fixed per note as
//! lights, then rings, then lasers; no post-sort is applied.

use crate::error::{GeneratorError, Result};
use crate::models::chart::{Event, Note};
use tracing::debug;

/// Lighting event channels (`_type` values)
pub mod channels {
    /// Primary light bar
    pub const LIGHTS: u8 = 4;
    /// The four laser channels
    pub const LASERS: [u8; 4] = [0, 1, 2, 3];
    /// Laser channel the synthesizer drives
    pub const SECONDARY_LASER: u8 = LASERS[1];
    /// Ring spin channels
    pub const RINGS: [u8; 2] = [8, 9];
    /// Rotation speed channels
    pub const SPEEDS: [u8; 2] = [12, 13];
}

/// Lighting event values (`_value` values), indexed red then blue
pub mod values {
    pub const OFF: u8 = 0;
    pub const NORMAL: [u8; 2] = [5, 1];
    pub const FADE_IN: [u8; 2] = [6, 2];
    pub const FADE_OUT: [u8; 2] = [7, 3];
}

/// Primary-light phase machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Off,
    FadeIn,
    Normal,
    FadeOut,
}

struct LightState {
    /// Time of the last primary-light change, in beats
    last_time: f64,
    /// Current color index (0 = red, 1 = blue)
    color: usize,
    phase: Phase,
}

/// Lighting track synthesizer
pub struct EventSynthesizer {}

impl EventSynthesizer {
    pub fn new() -> Self {
        Self {}
    }

    /// Derive the lighting track for one difficulty's notes
    ///
    /// `color_swap_seconds` is the minimum wall-clock spacing between
    /// primary-light changes; it is converted to beats using the tempo
    /// so the swap cadence follows the song. An empty note list is an
    /// error: there is nothing to light.
    pub fn synthesize(
        &self,
        notes: &[Note],
        bpm: f64,
        color_swap_seconds: f64,
    ) -> Result<Vec<Event>> {
        if notes.is_empty() {
            return Err(GeneratorError::InvalidNotes(
                "cannot synthesize events for an empty note list".to_string(),
            ));
        }

        let swap_interval = (bpm / 60.0).round() * color_swap_seconds;

        let mut events = vec![Event::new(0.0, channels::LIGHTS, values::OFF)];
        let mut state = LightState {
            last_time: 0.0,
            color: 0,
            phase: Phase::Off,
        };
        let mut ring_counter: usize = 0;
        let last_index = notes.len() - 1;

        for (index, note) in notes.iter().enumerate() {
            let boundary = index == 0 || index == last_index;
            self.light_step(note, boundary, swap_interval, &mut state, &mut events);
            self.ring_step(note, &mut ring_counter, &mut events);
            self.laser_step(note, &mut events);
        }

        Ok(events)
    }

    /// Primary light: boundary notes force lights-off without touching
    /// the phase state; interior notes advance the phase machine once
    /// the swap interval has elapsed
    fn light_step(
        &self,
        note: &Note,
        boundary: bool,
        swap_interval: f64,
        state: &mut LightState,
        events: &mut Vec<Event>,
    ) {
        if boundary {
            events.push(Event::new(note.time, channels::LIGHTS, values::OFF));
            return;
        }

        if note.time - state.last_time > swap_interval {
            let (phase, color) = match state.phase {
                Phase::Off | Phase::FadeOut => (Phase::FadeIn, 1 - state.color),
                Phase::FadeIn => (Phase::Normal, state.color),
                Phase::Normal => (Phase::FadeOut, state.color),
            };
            let value = match phase {
                Phase::FadeIn => values::FADE_IN[color],
                Phase::Normal => values::NORMAL[color],
                Phase::FadeOut => values::FADE_OUT[color],
                Phase::Off => values::OFF,
            };
            events.push(Event::new(note.time, channels::LIGHTS, value));
            state.last_time = note.time;
            state.color = color;
            state.phase = phase;
        }
    }

    /// Rings: one spin event per note, cycling channels on a 3-step
    /// pattern (first channel for step 0, second for steps 1 and 2)
    fn ring_step(&self, note: &Note, counter: &mut usize, events: &mut Vec<Event>) {
        if *counter > 2 {
            *counter = 0;
        }
        let ring = usize::from(*counter > 0);
        events.push(Event::new(note.time, channels::RINGS[ring], values::OFF));
        *counter += 1;
    }

    /// Secondary laser: one event per non-bomb note, intensity looked
    /// up by note type from the steady color table
    ///
    /// A note type outside the table has no laser intensity; the lookup
    /// failure is logged and the note's laser is skipped, the rest of
    /// the walk continues.
    fn laser_step(&self, note: &Note, events: &mut Vec<Event>) {
        if note.kind == 3 {
            return;
        }
        match laser_intensity(note.kind) {
            Some(value) => {
                events.push(Event::new(note.time, channels::SECONDARY_LASER, value));
            }
            None => {
                debug!(
                    "No laser intensity for note type {} at beat {}, skipping",
                    note.kind, note.time
                );
            }
        }
    }
}

impl Default for EventSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

fn laser_intensity(kind: i64) -> Option<u8> {
    usize::try_from(kind)
        .ok()
        .and_then(|k| values::NORMAL.get(k).copied())
}
