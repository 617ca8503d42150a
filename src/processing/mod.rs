//! Audio Processing Pipeline
//!
//! A task's options select an ordered list of [`AudioStage`]s. Samples flow
//! from stage to stage as [`StageData`] until export produces the encoded
//! output file contents.

pub mod common;
pub mod denoise;
pub mod enhance;
pub mod export;
pub mod pipeline;
pub mod stage;

pub use denoise::SpectralGate;
pub use enhance::SpeechEnhancer;
pub use export::{EncodedAudio, FormatExporter};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineOutcome};
pub use stage::{AudioStage, StageData};
