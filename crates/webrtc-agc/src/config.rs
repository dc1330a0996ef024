//! Gain control configuration.
//!
//! C++ source: `webrtc/modules/audio_processing/agc/legacy/gain_control.h`

use crate::error::AgcError;

/// Highest target level, in dB below full scale.
pub const MAX_TARGET_LEVEL_DBFS: u8 = 31;
/// Highest digital compression gain.
pub const MAX_COMPRESSION_GAIN_DB: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgcMode {
    /// Drive the capture device volume; the caller applies the suggested
    /// level through [`GainControl::stream_analog_level`](crate::GainControl::stream_analog_level).
    #[default]
    AdaptiveAnalog,
    /// Same loop as `AdaptiveAnalog` on a software gain stage.
    AdaptiveDigital,
    /// Compressor only.
    FixedDigital,
}

impl AgcMode {
    pub fn is_adaptive(self) -> bool {
        !matches!(self, Self::FixedDigital)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgcConfig {
    pub mode: AgcMode,
    /// Output target, in dB below full scale (so 3 means -3 dBFS).
    pub target_level_dbfs: u8,
    pub compression_gain_db: u8,
    pub limiter: bool,
    pub analog_level_min: u16,
    pub analog_level_max: u16,
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            mode: AgcMode::AdaptiveAnalog,
            target_level_dbfs: 3,
            compression_gain_db: 9,
            limiter: true,
            analog_level_min: 0,
            analog_level_max: 255,
        }
    }
}

impl AgcConfig {
    pub fn validate(&self) -> Result<(), AgcError> {
        if self.target_level_dbfs > MAX_TARGET_LEVEL_DBFS {
            return Err(AgcError::InvalidTargetLevel(i32::from(
                self.target_level_dbfs,
            )));
        }
        if self.compression_gain_db > MAX_COMPRESSION_GAIN_DB {
            return Err(AgcError::InvalidCompressionGain(i32::from(
                self.compression_gain_db,
            )));
        }
        if self.analog_level_min >= self.analog_level_max {
            return Err(AgcError::InvalidAnalogLimits {
                min: i32::from(self.analog_level_min),
                max: i32::from(self.analog_level_max),
            });
        }
        Ok(())
    }

    /// Speech level, in dBFS, the adaptive loop steers the compressor
    /// input toward: the output target minus the compression gain.
    pub fn adaptive_target_dbfs(&self) -> f32 {
        -f32::from(self.target_level_dbfs) - f32::from(self.compression_gain_db)
    }
}

/// Samples per 10 ms frame for the band the controller runs on.
pub fn frame_length(sample_rate_hz: u32) -> Option<usize> {
    match sample_rate_hz {
        8000 => Some(80),
        16000 | 32000 => Some(160),
        _ => None,
    }
}
