//! RMS level in dBFS following RFC 6465.
//!
//! Ported from `modules/audio_processing/rms_level.h/cc`.

const MAX_SQUARED_LEVEL: f32 = 32768.0 * 32768.0;
/// 10^(-127/10).
const MIN_LEVEL: f32 = 1.995_262_314_968_883e-13;

/// Level reported for digital silence.
pub const MIN_LEVEL_DB: i32 = 127;
/// Level reported for audio that is inaudible but not all zeros.
pub(crate) const INAUDIBLE_BUT_NOT_MUTED: i32 = 126;

fn compute_rms(mean_square: f32) -> i32 {
    if mean_square <= MIN_LEVEL * MAX_SQUARED_LEVEL {
        return MIN_LEVEL_DB;
    }
    let mean_square_norm = mean_square / MAX_SQUARED_LEVEL;
    let rms = 10.0 * mean_square_norm.log10();
    debug_assert!(rms <= 0.0);
    (-rms + 0.5) as i32
}

/// Accumulates sample energy between two reads of the level.
#[derive(Debug, Default)]
pub(crate) struct RmsLevel {
    sum_square: f32,
    sample_count: usize,
}

impl RmsLevel {
    pub(crate) fn reset(&mut self) {
        self.sum_square = 0.0;
        self.sample_count = 0;
    }

    pub(crate) fn analyze(&mut self, data: &[i16]) {
        self.sum_square += data.iter().map(|&s| f32::from(s) * f32::from(s)).sum::<f32>();
        self.sample_count += data.len();
    }

    /// Average level since the last call, as a positive dBFS value in
    /// `0..=127`. Resets the accumulator.
    pub(crate) fn average(&mut self) -> i32 {
        let have_samples = self.sample_count != 0;
        let mut rms = if have_samples {
            compute_rms(self.sum_square / self.sample_count as f32)
        } else {
            MIN_LEVEL_DB
        };
        if have_samples && rms == MIN_LEVEL_DB && self.sum_square != 0.0 {
            rms = INAUDIBLE_BUT_NOT_MUTED;
        }
        self.reset();
        rms
    }
}
