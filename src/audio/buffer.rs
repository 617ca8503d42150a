//! In-memory PCM buffer passed from stage to stage

use ndarray::{Array2, ArrayView1};
use crate::error::{CleanerError, Result};

/// Planar f32 samples, one row per channel, plus the sample rate they were
/// recorded at.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Array2<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Array2<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(CleanerError::audio("Sample rate cannot be 0"));
        }
        if samples.nrows() == 0 {
            return Err(CleanerError::audio("Audio must have at least one channel"));
        }
        Ok(Self { samples, sample_rate })
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        let frames = samples.len();
        let samples = Array2::from_shape_vec((1, frames), samples)
            .map_err(|e| CleanerError::audio(format!("Invalid mono layout: {}", e)))?;
        Self::new(samples, sample_rate)
    }

    /// Builds a buffer from frame-interleaved samples (`L R L R ...`).
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(CleanerError::audio("Channel count must be greater than 0"));
        }
        if interleaved.len() % channels != 0 {
            return Err(CleanerError::audio(format!(
                "Interleaved length {} is not a multiple of {} channels", interleaved.len(), channels
            )));
        }

        let frames = interleaved.len() / channels;
        let mut samples = Array2::zeros((channels, frames));
        for (frame, chunk) in interleaved.chunks_exact(channels).enumerate() {
            for (ch, &sample) in chunk.iter().enumerate() {
                samples[[ch, frame]] = sample;
            }
        }
        Self::new(samples, sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    pub fn frames(&self) -> usize {
        self.samples.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> ArrayView1<'_, f32> {
        self.samples.row(index)
    }

    pub fn samples(&self) -> &Array2<f32> {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut Array2<f32> {
        &mut self.samples
    }

    /// Replaces every channel, keeping the sample rate.
    pub fn with_channels(&self, channels: Vec<Vec<f32>>) -> Result<Self> {
        let frames = channels.first().map(Vec::len).unwrap_or(0);
        if channels.iter().any(|c| c.len() != frames) {
            return Err(CleanerError::audio("Channels have different lengths"));
        }
        let count = channels.len();
        let flat: Vec<f32> = channels.into_iter().flatten().collect();
        let samples = Array2::from_shape_vec((count, frames), flat)
            .map_err(|e| CleanerError::audio(format!("Invalid channel layout: {}", e)))?;
        Self::new(samples, self.sample_rate)
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.samples.len());
        for frame in self.samples.columns() {
            out.extend(frame.iter().copied());
        }
        out
    }

    /// True when every sample is a finite number.
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |p, s| p.max(s.abs()))
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_layout() {
        let buffer = AudioBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 16000).unwrap();
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.channel(1).to_vec(), vec![-0.1, -0.2, -0.3]);
        assert_eq!(buffer.to_interleaved(), vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }

    #[test]
    fn test_invalid_buffers() {
        assert!(AudioBuffer::mono(vec![0.0; 4], 0).is_err());
        assert!(AudioBuffer::from_interleaved(&[0.0; 5], 2, 16000).is_err());
        assert!(AudioBuffer::from_interleaved(&[0.0; 4], 0, 16000).is_err());
    }

    #[test]
    fn test_duration_and_levels() {
        let buffer = AudioBuffer::mono(vec![0.5, -0.5, 0.5, -0.5], 4).unwrap();
        assert!((buffer.duration() - 1.0).abs() < f64::EPSILON);
        assert!((buffer.peak() - 0.5).abs() < 1e-6);
        assert!((buffer.rms() - 0.5).abs() < 1e-6);
        assert!(buffer.is_finite());
    }

    #[test]
    fn test_with_channels_keeps_rate() {
        let buffer = AudioBuffer::mono(vec![0.0; 3], 22050).unwrap();
        let replaced = buffer.with_channels(vec![vec![1.0, 2.0, 3.0]]).unwrap();
        assert_eq!(replaced.sample_rate(), 22050);
        assert_eq!(replaced.channel(0).to_vec(), vec![1.0, 2.0, 3.0]);
        assert!(buffer.with_channels(vec![vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
