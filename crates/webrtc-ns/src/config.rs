//! Noise suppression configuration and common constants.
//!
//! C++ source: `webrtc/modules/audio_processing/ns/defines.h`
//!             `webrtc/modules/audio_processing/ns/ns_core.h`

/// Number of blocks in the short startup phase.
pub const SHORT_STARTUP_PHASE_BLOCKS: i32 = 50;

/// Number of blocks in the long startup phase.
pub const LONG_STARTUP_PHASE_BLOCKS: i32 = 200;

/// Threshold of the averaged log likelihood ratio feature.
pub const LRT_FEATURE_THR: f32 = 0.5;

/// Frame and transform sizes for one processing rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    /// New samples per 10 ms block.
    pub frame_size: usize,
    /// FFT length (frame plus overlap).
    pub fft_size: usize,
}

impl FrameGeometry {
    /// 80-sample blocks with a 128-point FFT.
    pub const NARROWBAND: Self = Self {
        frame_size: 80,
        fft_size: 128,
    };
    /// 160-sample blocks with a 256-point FFT (16 kHz and the 32 kHz low band).
    pub const WIDEBAND: Self = Self {
        frame_size: 160,
        fft_size: 256,
    };

    /// Geometry for a processing rate, `None` if unsupported. 32 kHz input
    /// is processed on its 16 kHz low band.
    pub fn for_sample_rate(sample_rate_hz: u32) -> Option<Self> {
        match sample_rate_hz {
            8000 => Some(Self::NARROWBAND),
            16000 | 32000 => Some(Self::WIDEBAND),
            _ => None,
        }
    }

    /// Samples shared by consecutive extended frames.
    pub fn overlap(&self) -> usize {
        self.fft_size - self.frame_size
    }

    /// Unique frequency bins.
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }
}

/// Target suppression level for the noise suppressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionLevel {
    /// 6 dB suppression.
    K6dB,
    /// 12 dB suppression (default).
    #[default]
    K12dB,
    /// 18 dB suppression.
    K18dB,
    /// 21 dB suppression.
    K21dB,
}

/// Configuration for the noise suppressor.
#[derive(Debug, Clone, Copy)]
pub struct NsConfig {
    /// Target suppression level.
    pub target_level: SuppressionLevel,
    /// Rate of the signal handed to the suppressor.
    pub sample_rate_hz: u32,
}

impl Default for NsConfig {
    fn default() -> Self {
        Self {
            target_level: SuppressionLevel::K12dB,
            sample_rate_hz: 16000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_suppression_level() {
        let config = NsConfig::default();
        assert_eq!(config.target_level, SuppressionLevel::K12dB);
    }

    #[test]
    fn geometry_per_rate() {
        assert_eq!(FrameGeometry::for_sample_rate(8000), Some(FrameGeometry::NARROWBAND));
        assert_eq!(FrameGeometry::for_sample_rate(32000), Some(FrameGeometry::WIDEBAND));
        assert_eq!(FrameGeometry::for_sample_rate(48000), None);
        assert_eq!(FrameGeometry::NARROWBAND.overlap(), 48);
        assert_eq!(FrameGeometry::WIDEBAND.overlap(), 96);
        assert_eq!(FrameGeometry::WIDEBAND.num_bins(), 129);
    }
}
