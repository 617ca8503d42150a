//! Common processing utilities shared between stages

use log::debug;

use crate::audio::AudioBuffer;

/// Replace NaN and infinite samples with silence and clamp to full scale.
pub fn sanitize(audio: &mut AudioBuffer) {
    for s in audio.samples_mut().iter_mut() {
        *s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
    }
}

/// Normalize final output audio
///
/// Quiet recordings are lifted towards an RMS of 0.2 without letting the
/// peak exceed 0.95. Loud recordings, and quiet ones whose peak already
/// sits near full scale, are left untouched.
pub fn normalize_output(audio: &mut AudioBuffer) {
    if audio.is_empty() {
        return;
    }

    let rms = audio.rms();
    let peak = audio.peak();

    if rms < 0.1 && peak > 0.001 {
        let rms_gain = 0.2 / rms;
        let peak_gain = if peak > 0.0 { 0.95 / peak } else { 1.0 };
        let gain = rms_gain.min(peak_gain).min(8.0);
        if gain <= 1.0 {
            return;
        }

        debug!("Normalization: RMS={:.4}, Peak={:.4}, gain={:.2}", rms, peak, gain);

        for s in audio.samples_mut().iter_mut() {
            *s = (*s * gain).clamp(-1.0, 1.0);
        }
    }
}
