//! Mobile echo control configuration.
//!
//! C++ source: `webrtc/modules/audio_processing/aecm/echo_control_mobile.h`

/// Samples per processing block.
pub const PART_LEN: usize = 64;
/// FFT length.
pub const PART_LEN2: usize = 2 * PART_LEN;
/// Unique FFT bins, and echo path taps.
pub const PART_LEN1: usize = PART_LEN + 1;

/// Size of the echo path in bytes (`PART_LEN1` int16 taps).
pub const ECHO_PATH_SIZE_BYTES: usize = PART_LEN1 * std::mem::size_of::<i16>();

/// Far-end spectra kept for delay estimation, in blocks.
pub const MAX_DELAY_BLOCKS: usize = 100;

/// Acoustic routing of the device, from quietest to loudest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingMode {
    QuietEarpieceOrHeadset,
    Earpiece,
    LoudEarpiece,
    #[default]
    Speakerphone,
    LoudSpeakerphone,
}

impl RoutingMode {
    pub const ALL: [Self; 5] = [
        Self::QuietEarpieceOrHeadset,
        Self::Earpiece,
        Self::LoudEarpiece,
        Self::Speakerphone,
        Self::LoudSpeakerphone,
    ];

    /// Echo overestimation in Q4 applied before computing the gain.
    pub(crate) fn suppression_q4(self) -> u32 {
        match self {
            Self::QuietEarpieceOrHeadset => 8,
            Self::Earpiece => 12,
            Self::LoudEarpiece => 16,
            Self::Speakerphone => 24,
            Self::LoudSpeakerphone => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AecmConfig {
    pub routing_mode: RoutingMode,
    pub comfort_noise: bool,
}

impl Default for AecmConfig {
    fn default() -> Self {
        Self {
            routing_mode: RoutingMode::Speakerphone,
            comfort_noise: true,
        }
    }
}

/// Samples per 10 ms frame, for supported rates.
pub fn frame_length(sample_rate_hz: u32) -> Option<usize> {
    match sample_rate_hz {
        8000 => Some(80),
        16000 => Some(160),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_path_is_130_bytes() {
        assert_eq!(ECHO_PATH_SIZE_BYTES, 130);
    }

    #[test]
    fn louder_routes_suppress_more() {
        let q4: Vec<u32> = RoutingMode::ALL.iter().map(|m| m.suppression_q4()).collect();
        assert!(q4.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn no_wideband_split_rate() {
        assert_eq!(frame_length(32000), None);
        assert_eq!(frame_length(16000), Some(160));
    }
}
