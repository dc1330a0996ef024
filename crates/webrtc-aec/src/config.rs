//! Echo canceller configuration and block constants.
//!
//! C++ source: `webrtc/modules/audio_processing/aec/aec_core.h`

/// Samples per processing block.
pub const BLOCK_LEN: usize = 64;
/// FFT length (two blocks).
pub const FFT_LEN: usize = 2 * BLOCK_LEN;
/// Unique FFT bins.
pub const NUM_BINS: usize = BLOCK_LEN + 1;
/// Filter partitions, each one block long.
pub const NUM_PARTITIONS: usize = 12;

/// Far-end history the delay estimator searches, in blocks.
pub const DELAY_HISTORY_BLOCKS: usize = 64;

/// Lowest accepted device (sound card) rate.
pub const MIN_DEVICE_SAMPLE_RATE_HZ: u32 = 8000;
/// Highest accepted device (sound card) rate.
pub const MAX_DEVICE_SAMPLE_RATE_HZ: u32 = 96000;

/// Aggressiveness of the nonlinear processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionLevel {
    Low,
    #[default]
    Moderate,
    High,
}

impl SuppressionLevel {
    /// Exponent applied to the suppression gain.
    pub(crate) fn overdrive(self) -> f32 {
        match self {
            Self::Low => 1.0,
            Self::Moderate => 2.0,
            Self::High => 5.0,
        }
    }
}

/// Runtime echo canceller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AecConfig {
    pub suppression_level: SuppressionLevel,
    /// Rate of the render device clock; drift is measured in these samples.
    pub device_sample_rate_hz: u32,
    pub drift_compensation: bool,
    pub metrics: bool,
    pub delay_logging: bool,
}

impl Default for AecConfig {
    fn default() -> Self {
        Self {
            suppression_level: SuppressionLevel::Moderate,
            device_sample_rate_hz: 48000,
            drift_compensation: false,
            metrics: true,
            delay_logging: false,
        }
    }
}

/// Samples per 10 ms frame at `sample_rate_hz`, for the rates the canceller
/// runs at directly.
pub fn frame_length(sample_rate_hz: u32) -> Option<usize> {
    match sample_rate_hz {
        8000 => Some(80),
        16000 | 32000 => Some(160),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AecConfig::default();
        assert_eq!(config.suppression_level, SuppressionLevel::Moderate);
        assert_eq!(config.device_sample_rate_hz, 48000);
        assert!(!config.drift_compensation);
        assert!(config.metrics);
    }

    #[test]
    fn overdrive_grows_with_level() {
        assert!(SuppressionLevel::Low.overdrive() < SuppressionLevel::Moderate.overdrive());
        assert!(SuppressionLevel::Moderate.overdrive() < SuppressionLevel::High.overdrive());
    }

    #[test]
    fn frame_lengths() {
        assert_eq!(frame_length(8000), Some(80));
        assert_eq!(frame_length(32000), Some(160));
        assert_eq!(frame_length(44100), None);
    }
}
