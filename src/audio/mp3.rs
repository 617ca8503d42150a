//! MP3 encoding through LAME

use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, InterleavedPcm, Quality};

use crate::audio::AudioBuffer;
use crate::error::{CleanerError, Result};

/// Encodes the buffer as an MP3 stream in memory.
///
/// LAME's interleaved entry point always expects two channels, so mono is
/// duplicated and anything wider than stereo is folded down to two channels.
pub fn encode_mp3(buffer: &AudioBuffer, bitrate_kbps: u32) -> Result<Vec<u8>> {
    let pcm = stereo_pcm(buffer);

    let mut builder = Builder::new().ok_or_else(|| CleanerError::audio("Failed to create MP3 encoder"))?;
    builder
        .set_num_channels(2)
        .map_err(|e| CleanerError::audio(format!("Failed to set channels: {:?}", e)))?;
    builder
        .set_sample_rate(buffer.sample_rate())
        .map_err(|e| CleanerError::audio(format!("Unsupported MP3 sample rate {}: {:?}", buffer.sample_rate(), e)))?;
    builder
        .set_brate(map_bitrate(bitrate_kbps))
        .map_err(|e| CleanerError::audio(format!("Failed to set bitrate: {:?}", e)))?;
    builder
        .set_quality(Quality::Best)
        .map_err(|e| CleanerError::audio(format!("Failed to set quality: {:?}", e)))?;
    let mut encoder = builder
        .build()
        .map_err(|e| CleanerError::audio(format!("Failed to build encoder: {:?}", e)))?;

    // LAME needs roughly 1.25x input + 7200 bytes.
    let mut out: Vec<u8> = Vec::with_capacity(pcm.len() * 5 / 4 + 7200);

    let encoded = encoder
        .encode(InterleavedPcm(&pcm), out.spare_capacity_mut())
        .map_err(|e| CleanerError::audio(format!("Failed to encode MP3: {:?}", e)))?;
    // SAFETY: the encoder initialised exactly `encoded` bytes of spare capacity.
    unsafe { out.set_len(encoded) };

    out.reserve(7200);
    let flushed = encoder
        .flush::<FlushNoGap>(out.spare_capacity_mut())
        .map_err(|e| CleanerError::audio(format!("Failed to flush encoder: {:?}", e)))?;
    // SAFETY: as above, `flushed` bytes past the current length are initialised.
    unsafe { out.set_len(out.len() + flushed) };

    Ok(out)
}

fn stereo_pcm(buffer: &AudioBuffer) -> Vec<i16> {
    let to_i16 = |s: f32| {
        let s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
        (s * 32767.0) as i16
    };

    let frames = buffer.frames();
    let mut pcm = Vec::with_capacity(frames * 2);
    match buffer.channels() {
        1 => {
            for &s in buffer.channel(0).iter() {
                let v = to_i16(s);
                pcm.push(v);
                pcm.push(v);
            }
        }
        2 => {
            let (left, right) = (buffer.channel(0), buffer.channel(1));
            for i in 0..frames {
                pcm.push(to_i16(left[i]));
                pcm.push(to_i16(right[i]));
            }
        }
        n => {
            // Even channels fold left, odd channels fold right.
            let samples = buffer.samples();
            for i in 0..frames {
                let (mut l, mut r, mut nl, mut nr) = (0.0f32, 0.0f32, 0usize, 0usize);
                for ch in 0..n {
                    if ch % 2 == 0 {
                        l += samples[[ch, i]];
                        nl += 1;
                    } else {
                        r += samples[[ch, i]];
                        nr += 1;
                    }
                }
                pcm.push(to_i16(l / nl.max(1) as f32));
                pcm.push(to_i16(r / nr.max(1) as f32));
            }
        }
    }
    pcm
}

fn map_bitrate(bitrate: u32) -> Bitrate {
    match bitrate {
        0..=32 => Bitrate::Kbps32,
        33..=40 => Bitrate::Kbps40,
        41..=48 => Bitrate::Kbps48,
        49..=64 => Bitrate::Kbps64,
        65..=80 => Bitrate::Kbps80,
        81..=96 => Bitrate::Kbps96,
        97..=112 => Bitrate::Kbps112,
        113..=128 => Bitrate::Kbps128,
        129..=160 => Bitrate::Kbps160,
        161..=192 => Bitrate::Kbps192,
        193..=224 => Bitrate::Kbps224,
        225..=256 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}
