//! Speech enhancement
//!
//! Each channel is taken down to a speech working rate, high-passed to drop
//! rumble, optionally given a presence boost around 3 kHz, and brought back
//! to its original rate and length. Loudness is normalized afterwards.

use biquad::{Biquad, Coefficients, DirectForm1, Q_BUTTERWORTH_F32, ToHertz, Type};
use rayon::prelude::*;

use super::common::{normalize_output, sanitize};
use crate::audio::{AudioBuffer, AudioConverter};
use crate::error::{CleanerError, Result};

const HIGHPASS_HZ: f32 = 80.0;
const PRESENCE_HZ: f32 = 3000.0;
const PRESENCE_Q: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechEnhancer {
    working_rate: u32,
    /// Presence boost in dB; `None` disables the boost.
    presence_gain_db: Option<f32>,
}

impl SpeechEnhancer {
    pub fn new(working_rate: u32, presence_gain_db: Option<f32>) -> Self {
        Self { working_rate, presence_gain_db }
    }

    pub fn working_rate(&self) -> u32 {
        self.working_rate
    }

    pub fn presence_gain_db(&self) -> Option<f32> {
        self.presence_gain_db
    }

    pub fn process(&self, audio: &AudioBuffer) -> Result<AudioBuffer> {
        let source_rate = audio.sample_rate();
        let frames = audio.frames();
        if frames == 0 {
            return Ok(audio.clone());
        }

        let channels = (0..audio.channels())
            .into_par_iter()
            .map(|ch| self.process_channel(audio.channel(ch).to_vec(), source_rate))
            .collect::<Result<Vec<_>>>()?;

        let mut output = audio.with_channels(channels)?;
        if !output.is_finite() {
            return Err(CleanerError::processing("Speech enhancement produced non-finite samples"));
        }
        sanitize(&mut output);
        normalize_output(&mut output);
        Ok(output)
    }

    fn process_channel(&self, mut data: Vec<f32>, source_rate: u32) -> Result<Vec<f32>> {
        let frames = data.len();

        if source_rate > self.working_rate {
            let cutoff = self.working_rate as f32 * 0.45;
            run_cascade(&mut data, Type::LowPass, source_rate as f32, cutoff, Q_BUTTERWORTH_F32)?;
        }

        let down_ratio = self.working_rate as f64 / source_rate as f64;
        let working_len = ((frames as f64 * down_ratio).round() as usize).max(1);
        let mut working = AudioConverter::resample_channel(data, working_len, down_ratio)?;

        let rate = self.working_rate as f32;
        run_cascade(&mut working, Type::HighPass, rate, HIGHPASS_HZ, Q_BUTTERWORTH_F32)?;

        if let Some(gain_db) = self.presence_gain_db {
            let mut eq = DirectForm1::<f32>::new(coefficients(Type::PeakingEQ(gain_db), rate, PRESENCE_HZ, PRESENCE_Q)?);
            for s in working.iter_mut() {
                *s = eq.run(*s);
            }
        }

        // Resample straight back to the original frame count.
        AudioConverter::resample_channel(working, frames, source_rate as f64 / self.working_rate as f64)
    }
}

fn coefficients(filter: Type<f32>, rate: f32, freq: f32, q: f32) -> Result<Coefficients<f32>> {
    Coefficients::<f32>::from_params(filter, rate.hz(), freq.hz(), q)
        .map_err(|e| CleanerError::processing(format!("Failed to create filter at {} Hz: {:?}", freq, e)))
}

/// Two cascaded second-order sections for a 24 dB/octave slope.
fn run_cascade(samples: &mut [f32], filter: Type<f32>, rate: f32, freq: f32, q: f32) -> Result<()> {
    let coeffs = coefficients(filter, rate, freq, q)?;
    for mut section in [DirectForm1::<f32>::new(coeffs), DirectForm1::<f32>::new(coeffs)] {
        for s in samples.iter_mut() {
            *s = section.run(*s);
        }
    }
    Ok(())
}
