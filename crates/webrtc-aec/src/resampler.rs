//! Linear resampler compensating render/capture clock drift.
//!
//! The far-end frame is stretched or squeezed by the measured skew before
//! it enters the far-end buffer, so that far and near streams advance at
//! the same rate.
//!
//! C++ source: `webrtc/modules/audio_processing/aec/aec_resampler.c`

/// Largest skew, as a fraction of the rate, that is compensated.
pub const MAX_SKEW: f32 = 0.01;

/// Smoothing applied to per-frame skew measurements.
const SKEW_SMOOTHING: f32 = 0.05;

#[derive(Debug, Clone)]
pub struct DriftResampler {
    /// Fractional read position carried between frames, in `[0, 1)`.
    position: f32,
    last_sample: f32,
    skew: f32,
}

impl Default for DriftResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl DriftResampler {
    pub fn new() -> Self {
        Self {
            position: 0.0,
            last_sample: 0.0,
            skew: 0.0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current smoothed skew.
    pub fn skew(&self) -> f32 {
        self.skew
    }

    /// Fold one drift measurement into the skew estimate.
    ///
    /// `drift_samples` is the number of device samples the render clock
    /// gained on the capture clock during the last frame, out of
    /// `device_frame_len`.
    pub fn update_skew(&mut self, drift_samples: i32, device_frame_len: usize) {
        if device_frame_len == 0 {
            return;
        }
        let measured = (drift_samples as f32 / device_frame_len as f32).clamp(-MAX_SKEW, MAX_SKEW);
        self.skew += SKEW_SMOOTHING * (measured - self.skew);
    }

    /// Resample `input` by `1 + skew`, appending to `output`. Returns the
    /// number of samples produced.
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) -> usize {
        if input.is_empty() {
            return 0;
        }
        let step = 1.0 / (1.0 + self.skew);
        let n = input.len() as f32;
        let start = output.len();
        // Index 0 of the virtual signal is the last sample of the previous
        // frame; index k >= 1 is input[k - 1].
        let sample_at = |k: usize| -> f32 {
            if k == 0 {
                self.last_sample
            } else {
                input[k - 1]
            }
        };
        let mut pos = self.position;
        while pos < n {
            let i = pos.floor() as usize;
            let frac = pos - i as f32;
            let a = sample_at(i);
            let b = sample_at((i + 1).min(input.len()));
            output.push(a + frac * (b - a));
            pos += step;
        }
        self.position = pos - n;
        self.last_sample = input[input.len() - 1];
        output.len() - start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_skew_is_a_one_sample_delay() {
        let mut rs = DriftResampler::new();
        let input: Vec<f32> = (1..=80).map(|v| v as f32).collect();
        let mut out = Vec::new();
        assert_eq!(rs.process(&input, &mut out), 80);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 1.0);
        assert_eq!(out[79], 79.0);
        out.clear();
        rs.process(&input, &mut out);
        assert_eq!(out[0], 80.0);
    }

    #[test]
    fn skew_changes_output_length() {
        let mut rs = DriftResampler::new();
        for _ in 0..400 {
            rs.update_skew(48, 480);
        }
        assert!((rs.skew() - MAX_SKEW).abs() < 1e-4);
        let input = vec![1.0f32; 160];
        let mut out = Vec::new();
        let mut produced = 0;
        for _ in 0..100 {
            produced += rs.process(&input, &mut out);
        }
        let expected = 160.0 * 100.0 * (1.0 + rs.skew());
        assert!((produced as f32 - expected).abs() < 3.0, "{produced} vs {expected}");
    }

    #[test]
    fn skew_is_clamped() {
        let mut rs = DriftResampler::new();
        for _ in 0..1000 {
            rs.update_skew(-480, 480);
        }
        assert!(rs.skew() >= -MAX_SKEW - 1e-6);
    }
}
