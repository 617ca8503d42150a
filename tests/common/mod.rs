//! Synthetic lecture fixtures shared by the integration tests

#![allow(dead_code)]

use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Writes `secs` of "speech" (a gated, vibrato-modulated harmonic tone) over
/// steady hiss. The first second is hiss only.
pub fn write_noisy_lecture(dir: &Path, name: &str, sample_rate: u32, channels: u16, secs: f32) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let mut rng = StdRng::seed_from_u64(sample_rate as u64 + secs.to_bits() as u64);

    let frames = (sample_rate as f32 * secs) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let voiced = t >= 1.0 && (t * 3.0).fract() < 0.7;
        let f0 = 180.0 + 20.0 * (2.0 * PI * 5.0 * t).sin();
        let speech = if voiced {
            0.25 * (2.0 * PI * f0 * t).sin() + 0.1 * (2.0 * PI * 2.0 * f0 * t).sin() + 0.05 * (2.0 * PI * 3.0 * f0 * t).sin()
        } else {
            0.0
        };
        for _ in 0..channels {
            let hiss = rng.gen_range(-0.03f32..0.03);
            let sample = ((speech + hiss).clamp(-1.0, 1.0) * 32767.0) as i16;
            writer.write_sample(sample).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

pub fn read_wav_info(path: &Path) -> (hound::WavSpec, u32) {
    let reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    let frames = reader.duration();
    (spec, frames)
}

/// Creates a named pipe. Opening it for reading blocks until a writer opens
/// it, which lets a test act while a worker is inside its first stage.
#[cfg(unix)]
pub fn make_fifo(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let status = std::process::Command::new("mkfifo").arg(&path).status().unwrap();
    assert!(status.success(), "mkfifo failed");
    path
}
