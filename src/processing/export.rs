//! Final materialisation of PCM into the requested container

use crate::audio::mp3::encode_mp3;
use crate::audio::wav::encode_wav;
use crate::audio::{AudioBuffer, WavEncoding};
use crate::error::Result;
use crate::task::OutputFormat;

/// Encoded file contents, ready to be committed to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    format: OutputFormat,
    bytes: Vec<u8>,
}

impl EncodedAudio {
    pub fn new(format: OutputFormat, bytes: Vec<u8>) -> Self {
        Self { format, bytes }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatExporter {
    format: OutputFormat,
    wav_encoding: WavEncoding,
    mp3_bitrate: u32,
}

impl FormatExporter {
    pub fn new(format: OutputFormat, wav_encoding: WavEncoding, mp3_bitrate: u32) -> Self {
        Self { format, wav_encoding, mp3_bitrate }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn encode(&self, audio: &AudioBuffer) -> Result<EncodedAudio> {
        let bytes = match self.format {
            OutputFormat::Wav => encode_wav(audio, self.wav_encoding)?,
            OutputFormat::Mp3 => encode_mp3(audio, self.mp3_bitrate)?,
        };
        Ok(EncodedAudio::new(self.format, bytes))
    }
}
