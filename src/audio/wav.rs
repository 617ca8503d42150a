//! WAV file reading and in-memory WAV encoding

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::error::{CleanerError, Result};

/// Sample encoding used when writing WAV output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WavEncoding {
    Int16,
    Float32,
}

impl WavEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            WavEncoding::Int16 => "int16",
            WavEncoding::Float32 => "float32",
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            WavEncoding::Int16 => 16,
            WavEncoding::Float32 => 32,
        }
    }

    pub fn to_sample_format(self) -> SampleFormat {
        match self {
            WavEncoding::Int16 => SampleFormat::Int,
            WavEncoding::Float32 => SampleFormat::Float,
        }
    }
}

pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();

    let file = File::open(path)
        .map_err(|e| CleanerError::audio(format!("Cannot open audio file {}: {}", path.display(), e)))?;

    let mut reader = WavReader::new(BufReader::new(file))?;

    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(CleanerError::audio("Invalid sample rate"));
    }
    if spec.channels == 0 {
        return Err(CleanerError::audio("WAV file declares no channels"));
    }

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
        (format, bits) => {
            return Err(CleanerError::audio(format!(
                "Unsupported WAV sample format: {:?} {}-bit", format, bits
            )));
        }
    };

    if samples.is_empty() {
        return Err(CleanerError::audio(format!("No audio samples in {}", path.display())));
    }

    AudioBuffer::from_interleaved(&samples, spec.channels as usize, spec.sample_rate)
}

/// Encodes the buffer as a complete WAV file in memory.
pub fn encode_wav(buffer: &AudioBuffer, encoding: WavEncoding) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: encoding.bits_per_sample(),
        sample_format: encoding.to_sample_format(),
    };

    let mut cursor = Cursor::new(Vec::with_capacity(buffer.samples().len() * 4 + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;

        for sample in buffer.to_interleaved() {
            let clamped = if sample.is_finite() { sample.clamp(-1.0, 1.0) } else { 0.0 };
            let written = match encoding {
                WavEncoding::Float32 => writer.write_sample(clamped),
                WavEncoding::Int16 => writer.write_sample((clamped * 32767.0) as i16),
            };
            written?;
        }

        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wav_encoding() {
        assert_eq!(WavEncoding::Int16.name(), "int16");
        assert_eq!(WavEncoding::Int16.bits_per_sample(), 16);
        assert_eq!(WavEncoding::Float32.name(), "float32");
        assert_eq!(WavEncoding::Float32.bits_per_sample(), 32);
    }

    #[test]
    fn test_float_wav_survives_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");

        let original = AudioBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 16000).unwrap();
        let bytes = encode_wav(&original, WavEncoding::Float32).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.sample_rate(), 16000);
        assert_eq!(loaded.channels(), 2);
        assert_eq!(loaded.frames(), 3);
        for (a, b) in loaded.to_interleaved().iter().zip(original.to_interleaved()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_int16_wav_is_scaled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pcm.wav");

        let original = AudioBuffer::mono(vec![0.5, -0.5, 2.0], 8000).unwrap();
        std::fs::write(&path, encode_wav(&original, WavEncoding::Int16).unwrap()).unwrap();

        let loaded = read_wav(&path).unwrap();
        let samples = loaded.channel(0).to_vec();
        assert!((samples[0] - 0.5).abs() < 1e-3);
        assert!((samples[1] + 0.5).abs() < 1e-3);
        // Out-of-range input is clipped on write.
        assert!((samples[2] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_missing_wav_is_audio_error() {
        let err = read_wav("/definitely/not/here.wav").unwrap_err();
        assert!(matches!(err, CleanerError::Audio { .. }));
    }

    #[test]
    fn test_corrupt_wav_is_audio_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.wav");
        std::fs::write(&path, b"these are lecture notes, not audio").unwrap();

        let err = read_wav(&path).unwrap_err();
        assert!(matches!(err, CleanerError::Audio { .. }));
        assert!(err.to_string().contains("WAV: "), "{}", err);
    }
}
