//! Per-task pipeline construction and execution

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::debug;

use super::denoise::SpectralGate;
use super::enhance::SpeechEnhancer;
use super::export::{EncodedAudio, FormatExporter};
use super::stage::{AudioStage, StageData};
use crate::config::ProcessingConfig;
use crate::error::StageError;
use crate::task::TaskOptions;

/// How a pipeline run ended when no stage failed.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Completed(EncodedAudio),
    Cancelled { stages_completed: usize },
}

/// Builds a fresh pipeline for each task from its options.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    processing: ProcessingConfig,
}

impl PipelineBuilder {
    pub fn new(processing: &ProcessingConfig) -> Self {
        Self { processing: processing.clone() }
    }

    /// Noise reduction (unless off), speech enhancement (if enabled), export.
    pub fn build(&self, options: &TaskOptions) -> Pipeline {
        let mut stages = Vec::with_capacity(3);

        if let Some(strength) = options.noise_level.strength() {
            stages.push(AudioStage::NoiseReduction(SpectralGate::new(
                self.processing.fft_size,
                strength,
                self.processing.noise_profile_secs,
            )));
        }

        if options.enhancement_enabled {
            let presence = options
                .voice_clarity_boost
                .then(|| options.enhancement_level.presence_gain_db());
            stages.push(AudioStage::SpeechEnhancement(SpeechEnhancer::new(
                self.processing.enhancement_rate,
                presence,
            )));
        }

        stages.push(AudioStage::FormatExport(FormatExporter::new(
            options.output_format,
            self.processing.wav_encoding,
            self.processing.mp3_bitrate,
        )));

        Pipeline { stages }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    stages: Vec<AudioStage>,
}

impl Pipeline {
    pub fn stages(&self) -> &[AudioStage] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(AudioStage::name).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage over `source`.
    ///
    /// `on_progress` receives `stages_completed / total` after each stage.
    /// `cancel` is checked at every boundary, including before the first
    /// stage and after the last one; a running stage is never interrupted.
    pub fn run<F>(&self, source: &Path, cancel: &AtomicBool, mut on_progress: F) -> Result<PipelineOutcome, StageError>
    where
        F: FnMut(f32),
    {
        let total = self.stages.len();
        let mut data = StageData::Source(source.to_path_buf());

        for (completed, stage) in self.stages.iter().enumerate() {
            if completed > 0 {
                on_progress(completed as f32 / total as f32);
            }
            if cancel.load(Ordering::Acquire) {
                return Ok(PipelineOutcome::Cancelled { stages_completed: completed });
            }

            let start = Instant::now();
            data = stage.apply(data)?;
            debug!("{} finished in {:.2?} for {}", stage.name(), start.elapsed(), source.display());
        }

        on_progress(1.0);
        if cancel.load(Ordering::Acquire) {
            return Ok(PipelineOutcome::Cancelled { stages_completed: total });
        }

        let last = self.stages.last().map(AudioStage::name).unwrap_or(AudioStage::FORMAT_EXPORT);
        data.into_encoded(last).map(PipelineOutcome::Completed)
    }
}
