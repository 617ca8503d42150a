//! Sample rate conversion

use crate::error::{CleanerError, Result};

pub struct AudioConverter;

impl AudioConverter {
    /// Resample one channel to exactly `new_length` samples by linear
    /// interpolation. `ratio` is target rate over source rate.
    pub fn resample_channel(data: Vec<f32>, new_length: usize, ratio: f64) -> Result<Vec<f32>> {
        if data.is_empty() {
            return Err(CleanerError::audio("Input data is empty"));
        }

        let old_length = data.len();
        let mut new_data = vec![0.0f32; new_length];

        for (i, out) in new_data.iter_mut().enumerate() {
            let old_pos = i as f64 / ratio;
            let old_index = old_pos.floor() as usize;
            let fraction = old_pos - old_index as f64;

            *out = if old_index >= old_length - 1 {
                data[old_length - 1]
            } else {
                data[old_index] + (data[old_index + 1] - data[old_index]) * fraction as f32
            };
        }

        Ok(new_data)
    }
}
