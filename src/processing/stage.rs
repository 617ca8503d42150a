//! Pipeline stages and the data flowing between them

use std::path::PathBuf;

use log::debug;

use super::denoise::SpectralGate;
use super::enhance::SpeechEnhancer;
use super::export::{EncodedAudio, FormatExporter};
use crate::audio::{AudioBuffer, decode};
use crate::error::StageError;

/// What a stage receives and returns.
///
/// A pipeline starts from [`StageData::Source`]; the first stage that needs
/// samples decodes the file, so decode failures are attributed to it.
#[derive(Debug, Clone, PartialEq)]
pub enum StageData {
    Source(PathBuf),
    Pcm(AudioBuffer),
    Encoded(EncodedAudio),
}

impl StageData {
    pub fn into_pcm(self, stage: &'static str) -> Result<AudioBuffer, StageError> {
        match self {
            StageData::Source(path) => {
                debug!("[{}] loading {}", stage, path.display());
                decode::load(&path).map_err(|e| StageError::new(stage, e))
            }
            StageData::Pcm(audio) => Ok(audio),
            StageData::Encoded(_) => Err(StageError::new(stage, "audio has already been encoded")),
        }
    }

    pub fn into_encoded(self, stage: &'static str) -> Result<EncodedAudio, StageError> {
        match self {
            StageData::Encoded(encoded) => Ok(encoded),
            _ => Err(StageError::new(stage, "pipeline did not produce encoded audio")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioStage {
    NoiseReduction(SpectralGate),
    SpeechEnhancement(SpeechEnhancer),
    FormatExport(FormatExporter),
}

impl AudioStage {
    pub const NOISE_REDUCTION: &'static str = "noise_reduction";
    pub const SPEECH_ENHANCEMENT: &'static str = "speech_enhancement";
    pub const FORMAT_EXPORT: &'static str = "format_export";

    pub fn name(&self) -> &'static str {
        match self {
            AudioStage::NoiseReduction(_) => Self::NOISE_REDUCTION,
            AudioStage::SpeechEnhancement(_) => Self::SPEECH_ENHANCEMENT,
            AudioStage::FormatExport(_) => Self::FORMAT_EXPORT,
        }
    }

    pub fn apply(&self, data: StageData) -> Result<StageData, StageError> {
        let stage = self.name();
        match self {
            AudioStage::NoiseReduction(gate) => {
                let audio = data.into_pcm(stage)?;
                gate.process(&audio).map(StageData::Pcm).map_err(|e| StageError::new(stage, e))
            }
            AudioStage::SpeechEnhancement(enhancer) => {
                let audio = data.into_pcm(stage)?;
                enhancer.process(&audio).map(StageData::Pcm).map_err(|e| StageError::new(stage, e))
            }
            AudioStage::FormatExport(exporter) => {
                let audio = data.into_pcm(stage)?;
                exporter.encode(&audio).map(StageData::Encoded).map_err(|e| StageError::new(stage, e))
            }
        }
    }
}
