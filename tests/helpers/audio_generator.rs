//! Audio test fixture generator

use std::path::{Path, PathBuf};

/// Generate a short mono WAV tone at the given path
pub fn generate_test_wav(path: &Path, duration_seconds: f64) -> anyhow::Result<PathBuf> {
    let sample_rate = 22050u32;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_samples = (duration_seconds * sample_rate as f64) as usize;
    for i in 0..total_samples {
        // 220Hz tone at 30% amplitude
        let t = i as f32 / sample_rate as f32;
        let sample = (0.3 * (2.0 * std::f32::consts::PI * 220.0 * t).sin() * i16::MAX as f32) as i16;
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(path.to_path_buf())
}
