//! Shared utilities for testing mapsynth

pub mod audio_generator;
pub mod stub;

pub use audio_generator::generate_test_wav;
pub use stub::{ready_command, stub_command_with};
