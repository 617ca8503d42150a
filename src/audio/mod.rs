//! Audio Module
//!
//! In-memory buffers, source decoding, sample rate conversion and the WAV/MP3
//! encoders used by the export stage.

pub mod buffer;
pub mod converter;
pub mod decode;
pub mod mp3;
pub mod wav;

pub use buffer::AudioBuffer;
pub use converter::AudioConverter;
pub use wav::WavEncoding;
