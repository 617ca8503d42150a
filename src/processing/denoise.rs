//! Stationary spectral gating
//!
//! A noise profile (per-bin mean and standard deviation of the dB magnitude)
//! is estimated from the leading part of the recording. Every STFT bin that
//! stays below `mean + 1.5 * std` is attenuated by the configured strength.
//! Frames are analysed and resynthesised in fixed-size blocks, so memory
//! beyond the output buffers does not grow with recording length.

use rayon::prelude::*;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::audio::AudioBuffer;
use crate::error::{CleanerError, Result};

const THRESHOLD_STD: f32 = 1.5;
const SMOOTHING_BINS: usize = 3;
/// STFT frames held in memory at once per channel.
const BLOCK_FRAMES: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct SpectralGate {
    fft_size: usize,
    hop_size: usize,
    strength: f32,
    profile_secs: f32,
    block_frames: usize,
}

struct Transforms {
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    window: Vec<f32>,
}

impl SpectralGate {
    /// `strength` is the proportion of noise removed, in `[0, 1]`.
    pub fn new(fft_size: usize, strength: f32, profile_secs: f32) -> Self {
        Self {
            fft_size,
            hop_size: fft_size / 4, // 75% overlap
            strength: strength.clamp(0.0, 1.0),
            profile_secs,
            block_frames: BLOCK_FRAMES,
        }
    }

    #[cfg(test)]
    fn with_block_frames(mut self, block_frames: usize) -> Self {
        self.block_frames = block_frames.max(1);
        self
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    pub fn process(&self, audio: &AudioBuffer) -> Result<AudioBuffer> {
        let transforms = self.plan();
        let profile_samples = ((self.profile_secs * audio.sample_rate() as f32) as usize).max(1);

        let channels = (0..audio.channels())
            .map(|ch| self.process_channel(&transforms, audio.channel(ch).to_vec(), profile_samples))
            .collect::<Result<Vec<_>>>()?;

        let output = audio.with_channels(channels)?;
        if !output.is_finite() {
            return Err(CleanerError::processing("Spectral gate produced non-finite samples"));
        }
        Ok(output)
    }

    fn plan(&self) -> Transforms {
        let mut planner = RealFftPlanner::<f32>::new();
        let window = (0..self.fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / self.fft_size as f32).cos()))
            .collect();
        Transforms {
            forward: planner.plan_fft_forward(self.fft_size),
            inverse: planner.plan_fft_inverse(self.fft_size),
            window,
        }
    }

    fn process_channel(&self, t: &Transforms, samples: Vec<f32>, profile_samples: usize) -> Result<Vec<f32>> {
        let len = samples.len();
        if len == 0 {
            return Ok(samples);
        }

        // Centre the frames so the edges see full overlap.
        let pad = self.fft_size / 2;
        let n_frames = 1 + (len + 2 * pad).saturating_sub(self.fft_size).div_ceil(self.hop_size);
        let padded_len = (n_frames - 1) * self.hop_size + self.fft_size;

        // Frames lying entirely inside the profile window.
        let noise_frames = (profile_samples.saturating_sub(pad) / self.hop_size + 1).clamp(1, n_frames);
        let profile = (0..noise_frames)
            .into_par_iter()
            .map(|f| self.analyze(t, &samples, f, pad))
            .collect::<Result<Vec<_>>>()?;
        let threshold = noise_threshold(&profile);
        drop(profile);

        let attenuation = 1.0 - self.strength;
        let mut output = vec![0.0f32; padded_len];
        let mut window_sum = vec![0.0f32; padded_len];

        let mut block_start = 0;
        while block_start < n_frames {
            let block_end = (block_start + self.block_frames).min(n_frames);
            let frames = (block_start..block_end)
                .into_par_iter()
                .map(|f| {
                    let mut spectrum = self.analyze(t, &samples, f, pad)?;
                    let gains = smooth(
                        &spectrum
                            .iter()
                            .zip(&threshold)
                            .map(|(c, &th)| if to_db(c.norm()) < th { attenuation } else { 1.0 })
                            .collect::<Vec<_>>(),
                    );
                    for (c, g) in spectrum.iter_mut().zip(&gains) {
                        *c *= *g;
                    }
                    self.synthesize(t, spectrum)
                })
                .collect::<Result<Vec<_>>>()?;

            for (f, frame) in (block_start..block_end).zip(&frames) {
                let start = f * self.hop_size;
                for (i, (s, w)) in frame.iter().zip(&t.window).enumerate() {
                    output[start + i] += s * w;
                    window_sum[start + i] += w * w;
                }
            }
            block_start = block_end;
        }

        Ok((0..len)
            .map(|i| {
                let ws = window_sum[pad + i];
                if ws > 1e-3 { output[pad + i] / ws } else { samples[i] * attenuation }
            })
            .collect())
    }

    /// Windowed spectrum of frame `f`, reading zeros outside the signal.
    fn analyze(&self, t: &Transforms, samples: &[f32], f: usize, pad: usize) -> Result<Vec<Complex<f32>>> {
        let offset = f * self.hop_size;
        let mut buffer: Vec<f32> = t
            .window
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let sample = (offset + i).checked_sub(pad).and_then(|idx| samples.get(idx)).copied().unwrap_or(0.0);
                sample * w
            })
            .collect();
        let mut spectrum = t.forward.make_output_vec();
        t.forward
            .process(&mut buffer, &mut spectrum)
            .map_err(|e| CleanerError::processing(format!("Forward FFT failed: {}", e)))?;
        Ok(spectrum)
    }

    fn synthesize(&self, t: &Transforms, mut spectrum: Vec<Complex<f32>>) -> Result<Vec<f32>> {
        // The inverse transform rejects non-zero imaginary parts at DC and Nyquist.
        if let Some(first) = spectrum.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = spectrum.last_mut() {
            last.im = 0.0;
        }

        let mut frame = t.inverse.make_output_vec();
        t.inverse
            .process(&mut spectrum, &mut frame)
            .map_err(|e| CleanerError::processing(format!("Inverse FFT failed: {}", e)))?;

        let norm = 1.0 / self.fft_size as f32;
        frame.iter_mut().for_each(|s| *s *= norm);
        Ok(frame)
    }
}

fn to_db(magnitude: f32) -> f32 {
    20.0 * (magnitude + 1e-10).log10()
}

fn noise_threshold(spectra: &[Vec<Complex<f32>>]) -> Vec<f32> {
    let bins = spectra[0].len();
    let count = spectra.len() as f32;
    (0..bins)
        .map(|b| {
            let mean = spectra.iter().map(|s| to_db(s[b].norm())).sum::<f32>() / count;
            let var = spectra.iter().map(|s| (to_db(s[b].norm()) - mean).powi(2)).sum::<f32>() / count;
            mean + THRESHOLD_STD * var.sqrt()
        })
        .collect()
}

/// Moving average of the gain mask across neighbouring bins.
fn smooth(gains: &[f32]) -> Vec<f32> {
    let half = SMOOTHING_BINS / 2;
    (0..gains.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(gains.len());
            gains[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
        })
        .collect()
}
