//! Audio processing configuration.
//!
//! [`Config`] is a snapshot of every component's enable flag and settings.
//! It is applied with [`AudioProcessing::apply_config`](crate::AudioProcessing::apply_config),
//! which goes through the same validated setters as the component
//! handles, and read back with [`AudioProcessing::config`](crate::AudioProcessing::config).
//!
//! Ported from `AudioProcessing::Config` in `api/audio/audio_processing.h`;
//! enumerations from the legacy component interfaces in
//! `webrtc/modules/audio_processing/include/audio_processing.h`.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which echo canceller, if any, runs on the capture path. The wideband
/// and mobile cancellers exclude each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EchoMode {
    #[default]
    Off,
    Wideband,
    Mobile,
}

/// Aggressiveness of the wideband echo canceller's suppressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EchoSuppressionLevel {
    Low,
    #[default]
    Moderate,
    High,
}

impl TryFrom<i32> for EchoSuppressionLevel {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Moderate),
            2 => Ok(Self::High),
            _ => Err(Error::BadParameter),
        }
    }
}

impl From<EchoSuppressionLevel> for webrtc_aec::SuppressionLevel {
    fn from(level: EchoSuppressionLevel) -> Self {
        match level {
            EchoSuppressionLevel::Low => Self::Low,
            EchoSuppressionLevel::Moderate => Self::Moderate,
            EchoSuppressionLevel::High => Self::High,
        }
    }
}

/// Acoustic setup the mobile echo canceller is tuned for, from quietest
/// to loudest echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoutingMode {
    QuietEarpieceOrHeadset,
    Earpiece,
    LoudEarpiece,
    #[default]
    Speakerphone,
    LoudSpeakerphone,
}

impl TryFrom<i32> for RoutingMode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::QuietEarpieceOrHeadset),
            1 => Ok(Self::Earpiece),
            2 => Ok(Self::LoudEarpiece),
            3 => Ok(Self::Speakerphone),
            4 => Ok(Self::LoudSpeakerphone),
            _ => Err(Error::BadParameter),
        }
    }
}

impl From<RoutingMode> for webrtc_aecm::RoutingMode {
    fn from(mode: RoutingMode) -> Self {
        match mode {
            RoutingMode::QuietEarpieceOrHeadset => Self::QuietEarpieceOrHeadset,
            RoutingMode::Earpiece => Self::Earpiece,
            RoutingMode::LoudEarpiece => Self::LoudEarpiece,
            RoutingMode::Speakerphone => Self::Speakerphone,
            RoutingMode::LoudSpeakerphone => Self::LoudSpeakerphone,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GainControlMode {
    /// Drive the capture device volume through the stream analog level.
    #[default]
    AdaptiveAnalog,
    /// Adapt a software gain stage instead of the device volume.
    AdaptiveDigital,
    /// Fixed compression gain and limiter only.
    FixedDigital,
}

impl TryFrom<i32> for GainControlMode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::AdaptiveAnalog),
            1 => Ok(Self::AdaptiveDigital),
            2 => Ok(Self::FixedDigital),
            _ => Err(Error::BadParameter),
        }
    }
}

impl From<GainControlMode> for webrtc_agc::AgcMode {
    fn from(mode: GainControlMode) -> Self {
        match mode {
            GainControlMode::AdaptiveAnalog => Self::AdaptiveAnalog,
            GainControlMode::AdaptiveDigital => Self::AdaptiveDigital,
            GainControlMode::FixedDigital => Self::FixedDigital,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoiseSuppressionLevel {
    Low,
    #[default]
    Moderate,
    High,
    VeryHigh,
}

impl TryFrom<i32> for NoiseSuppressionLevel {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Moderate),
            2 => Ok(Self::High),
            3 => Ok(Self::VeryHigh),
            _ => Err(Error::BadParameter),
        }
    }
}

impl From<NoiseSuppressionLevel> for webrtc_ns::SuppressionLevel {
    fn from(level: NoiseSuppressionLevel) -> Self {
        match level {
            NoiseSuppressionLevel::Low => Self::K6dB,
            NoiseSuppressionLevel::Moderate => Self::K12dB,
            NoiseSuppressionLevel::High => Self::K18dB,
            NoiseSuppressionLevel::VeryHigh => Self::K21dB,
        }
    }
}

/// How likely a frame must be to hold speech before voice detection
/// reports it. Lower likelihoods trade missed speech for fewer false
/// alarms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Likelihood {
    VeryLow,
    #[default]
    Low,
    Moderate,
    High,
}

impl TryFrom<i32> for Likelihood {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::VeryLow),
            1 => Ok(Self::Low),
            2 => Ok(Self::Moderate),
            3 => Ok(Self::High),
            _ => Err(Error::BadParameter),
        }
    }
}

impl From<Likelihood> for webrtc_vad::Aggressiveness {
    fn from(likelihood: Likelihood) -> Self {
        match likelihood {
            Likelihood::VeryLow => Self::VeryAggressive,
            Likelihood::Low => Self::Aggressive,
            Likelihood::Moderate => Self::LowBitrate,
            Likelihood::High => Self::Quality,
        }
    }
}

/// Snapshot of every component's settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub echo_cancellation: EchoCancellationConfig,
    pub echo_control_mobile: EchoControlMobileConfig,
    pub gain_control: GainControlConfig,
    pub noise_suppression: NoiseSuppressionConfig,
    pub high_pass_filter: HighPassFilterConfig,
    pub voice_detection: VoiceDetectionConfig,
    pub level_estimator: LevelEstimatorConfig,
}

impl Config {
    /// The echo canceller the snapshot asks for. Both flags set is not a
    /// valid mode and is rejected when applied.
    pub fn echo_mode(&self) -> Option<EchoMode> {
        match (
            self.echo_cancellation.enabled,
            self.echo_control_mobile.enabled,
        ) {
            (false, false) => Some(EchoMode::Off),
            (true, false) => Some(EchoMode::Wideband),
            (false, true) => Some(EchoMode::Mobile),
            (true, true) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoCancellationConfig {
    pub enabled: bool,
    pub suppression_level: EchoSuppressionLevel,
    pub drift_compensation: bool,
    /// Render device rate, for drift compensation.
    pub device_sample_rate_hz: u32,
    pub metrics: bool,
    pub delay_logging: bool,
}

impl Default for EchoCancellationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            suppression_level: EchoSuppressionLevel::Moderate,
            drift_compensation: false,
            device_sample_rate_hz: 48000,
            metrics: true,
            delay_logging: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoControlMobileConfig {
    pub enabled: bool,
    pub routing_mode: RoutingMode,
    pub comfort_noise: bool,
}

impl Default for EchoControlMobileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            routing_mode: RoutingMode::Speakerphone,
            comfort_noise: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainControlConfig {
    pub enabled: bool,
    pub mode: GainControlMode,
    /// Output target in dB below full scale, `0..=31`.
    pub target_level_dbfs: i32,
    /// `0..=90`.
    pub compression_gain_db: i32,
    pub limiter: bool,
    pub analog_level_minimum: i32,
    pub analog_level_maximum: i32,
}

impl Default for GainControlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: GainControlMode::AdaptiveAnalog,
            target_level_dbfs: 3,
            compression_gain_db: 9,
            limiter: true,
            analog_level_minimum: 0,
            analog_level_maximum: 255,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSuppressionConfig {
    pub enabled: bool,
    pub level: NoiseSuppressionLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HighPassFilterConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceDetectionConfig {
    pub enabled: bool,
    pub likelihood: Likelihood,
    pub frame_size_ms: i32,
}

impl Default for VoiceDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            likelihood: Likelihood::Low,
            frame_size_ms: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelEstimatorConfig {
    pub enabled: bool,
}
