//! Gain controller handle.
//!
//! C++ source: `webrtc/modules/audio_processing/agc/legacy/analog_agc.c`
//!             (`WebRtcAgc_Analyze`, `WebRtcAgc_VirtualMic`),
//!             `webrtc/modules/audio_processing/gain_control_impl.cc`

use webrtc_common_audio::audio_util::db_to_ratio;

use crate::analog_agc::AnalogAgc;
use crate::config::{AgcConfig, AgcMode, frame_length};
use crate::digital_agc::DigitalAgc;
use crate::error::AgcError;
use crate::gain_table::GainTable;

/// Virtual microphone gain at either end of the level range.
const VIRTUAL_MIC_RANGE_DB: f32 = 12.0;

/// One gain controller instance, for one capture channel.
///
/// # Example
///
/// ```
/// use webrtc_agc::{AgcConfig, AgcMode, GainControl};
///
/// let config = AgcConfig { mode: AgcMode::FixedDigital, ..AgcConfig::default() };
/// let mut agc = GainControl::new(16000, config).unwrap();
/// let mut frame = [100i16; 160];
/// agc.analyze(&mut frame, None).unwrap();
/// agc.process(&mut frame, None, false).unwrap();
/// assert!(frame[159] > 100);
/// ```
#[derive(Debug)]
pub struct GainControl {
    config: AgcConfig,
    frame_len: usize,
    analog: AnalogAgc,
    digital: DigitalAgc,
    /// Level last reported by the caller.
    stream_level: u16,
    /// Level suggested to the caller in `AdaptiveAnalog` mode.
    suggested_level: u16,
    /// Software microphone level in `AdaptiveDigital` mode.
    virtual_level: u16,
}

impl GainControl {
    pub fn new(sample_rate_hz: u32, config: AgcConfig) -> Result<Self, AgcError> {
        config.validate()?;
        let frame_len =
            frame_length(sample_rate_hz).ok_or(AgcError::UnsupportedSampleRate(sample_rate_hz))?;
        tracing::debug!(sample_rate_hz, ?config, "creating gain control");
        let mid = midpoint(&config);
        Ok(Self {
            config,
            frame_len,
            analog: AnalogAgc::new(),
            digital: DigitalAgc::new(table_for(&config)),
            stream_level: mid,
            suggested_level: mid,
            virtual_level: mid,
        })
    }

    pub fn reset(&mut self) {
        self.analog.reset();
        self.digital.reset();
        let mid = midpoint(&self.config);
        self.suggested_level = self.stream_level;
        self.virtual_level = mid;
    }

    pub fn config(&self) -> &AgcConfig {
        &self.config
    }

    /// Apply new settings. The gain table is rebuilt and the levels are
    /// clamped into the new range; signal state is kept.
    pub fn set_config(&mut self, config: AgcConfig) -> Result<(), AgcError> {
        config.validate()?;
        let table_changed = config.compression_gain_db != self.config.compression_gain_db
            || config.target_level_dbfs != self.config.target_level_dbfs
            || config.limiter != self.config.limiter;
        if config.mode != self.config.mode {
            self.analog.restart_level_tracking();
        }
        self.config = config;
        if table_changed {
            self.digital.set_table(table_for(&config));
        }
        let (min, max) = (config.analog_level_min, config.analog_level_max);
        self.stream_level = self.stream_level.clamp(min, max);
        self.suggested_level = self.suggested_level.clamp(min, max);
        self.virtual_level = self.virtual_level.clamp(min, max);
        Ok(())
    }

    fn check_length(&self, len: usize) -> Result<(), AgcError> {
        if len != self.frame_len {
            return Err(AgcError::BadFrameLength {
                expected: self.frame_len,
                actual: len,
            });
        }
        Ok(())
    }

    /// Report the capture device level applied to the coming frame.
    pub fn set_stream_analog_level(&mut self, level: i32) -> Result<(), AgcError> {
        let (min, max) = (self.config.analog_level_min, self.config.analog_level_max);
        if level < i32::from(min) || level > i32::from(max) {
            return Err(AgcError::AnalogLevelOutOfRange { level, min, max });
        }
        let level = level as u16;
        if self.config.mode == AgcMode::AdaptiveAnalog && level != self.suggested_level {
            tracing::trace!(level, suggested = self.suggested_level, "manual level change");
            self.analog.restart_level_tracking();
        }
        self.stream_level = level;
        self.suggested_level = level;
        Ok(())
    }

    /// Level to apply to the capture device (`AdaptiveAnalog`), the virtual
    /// microphone level (`AdaptiveDigital`), or the last reported level.
    pub fn stream_analog_level(&self) -> u16 {
        match self.config.mode {
            AgcMode::AdaptiveAnalog => self.suggested_level,
            AgcMode::AdaptiveDigital => self.virtual_level,
            AgcMode::FixedDigital => self.stream_level,
        }
    }

    /// Whether clipping was found by the last [`analyze`](Self::analyze).
    pub fn stream_is_saturated(&self) -> bool {
        self.analog.is_saturated()
    }

    /// Gain the compressor applied at the end of the last frame, in dB.
    pub fn compressor_gain_db(&self) -> f32 {
        20.0 * (self.digital.last_gain_q16() as f32 / 65536.0).log10()
    }

    /// Analysis hook, run on the split capture bands before echo
    /// cancellation. In `AdaptiveDigital` mode the virtual microphone gain
    /// is applied here.
    pub fn analyze(&mut self, low: &mut [i16], mut high: Option<&mut [i16]>) -> Result<(), AgcError> {
        self.check_length(low.len())?;
        if let Some(high) = high.as_deref() {
            self.check_length(high.len())?;
        }
        if self.config.mode == AgcMode::AdaptiveDigital {
            let gain = self.virtual_gain();
            apply_gain(low, gain);
            if let Some(high) = high.as_deref_mut() {
                apply_gain(high, gain);
            }
        }
        self.analog.analyze(low, high.as_deref());
        Ok(())
    }

    /// Processing hook, run after echo cancellation and noise suppression.
    pub fn process(
        &mut self,
        low: &mut [i16],
        high: Option<&mut [i16]>,
        stream_has_echo: bool,
    ) -> Result<(), AgcError> {
        self.check_length(low.len())?;
        if let Some(high) = high.as_deref() {
            self.check_length(high.len())?;
        }
        let (min, max) = (self.config.analog_level_min, self.config.analog_level_max);
        let target = self.config.adaptive_target_dbfs();
        match self.config.mode {
            AgcMode::AdaptiveAnalog => {
                self.suggested_level = self.analog.update_level(
                    self.stream_level,
                    min,
                    max,
                    target,
                    stream_has_echo,
                );
            }
            AgcMode::AdaptiveDigital => {
                self.virtual_level =
                    self.analog
                        .update_level(self.virtual_level, min, max, target, stream_has_echo);
            }
            AgcMode::FixedDigital => {}
        }
        self.digital.process(low, high);
        Ok(())
    }

    /// Linear gain of the virtual microphone at its current level.
    fn virtual_gain(&self) -> f32 {
        let min = f32::from(self.config.analog_level_min);
        let max = f32::from(self.config.analog_level_max);
        let mid = 0.5 * (min + max);
        let position = (f32::from(self.virtual_level) - mid) / (0.5 * (max - min));
        db_to_ratio(position * VIRTUAL_MIC_RANGE_DB)
    }
}

fn table_for(config: &AgcConfig) -> GainTable {
    GainTable::new(
        config.compression_gain_db,
        config.target_level_dbfs,
        config.limiter,
    )
}

fn midpoint(config: &AgcConfig) -> u16 {
    ((u32::from(config.analog_level_min) + u32::from(config.analog_level_max)) / 2) as u16
}

fn apply_gain(samples: &mut [i16], gain: f32) {
    for s in samples {
        *s = (f32::from(*s) * gain).clamp(-32768.0, 32767.0) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn burst(amplitude: f32, frame: usize) -> Vec<i16> {
        if frame % 15 >= 10 {
            return vec![0; 160];
        }
        (0..160)
            .map(|i| (amplitude * (0.3 * (frame * 160 + i) as f32).sin()) as i16)
            .collect()
    }

    #[test]
    fn rejects_bad_construction() {
        assert!(matches!(
            GainControl::new(44100, AgcConfig::default()),
            Err(AgcError::UnsupportedSampleRate(44100))
        ));
        let config = AgcConfig {
            compression_gain_db: 95,
            ..AgcConfig::default()
        };
        assert!(GainControl::new(16000, config).is_err());
    }

    #[test]
    fn analog_level_must_be_in_range() {
        let mut agc = GainControl::new(16000, AgcConfig::default()).unwrap();
        assert!(agc.set_stream_analog_level(255).is_ok());
        assert_eq!(
            agc.set_stream_analog_level(256),
            Err(AgcError::AnalogLevelOutOfRange {
                level: 256,
                min: 0,
                max: 255
            })
        );
        assert!(agc.set_stream_analog_level(-1).is_err());
    }

    #[test]
    fn adaptive_analog_suggests_higher_level_for_quiet_speech() {
        let mut agc = GainControl::new(16000, AgcConfig::default()).unwrap();
        agc.set_stream_analog_level(100).unwrap();
        for f in 0..100 {
            let mut frame = burst(300.0, f);
            agc.set_stream_analog_level(i32::from(agc.stream_analog_level()))
                .unwrap();
            agc.analyze(&mut frame, None).unwrap();
            agc.process(&mut frame, None, false).unwrap();
        }
        assert!(agc.stream_analog_level() > 100);
    }

    #[test]
    fn adaptive_digital_raises_virtual_level() {
        let config = AgcConfig {
            mode: AgcMode::AdaptiveDigital,
            ..AgcConfig::default()
        };
        let mut agc = GainControl::new(16000, config).unwrap();
        let start = agc.stream_analog_level();
        assert_eq!(start, 127);
        for f in 0..60 {
            let mut frame = burst(300.0, f);
            agc.analyze(&mut frame, None).unwrap();
            agc.process(&mut frame, None, false).unwrap();
        }
        assert!(agc.stream_analog_level() > start);
        assert!(agc.virtual_gain() > 1.0);
    }

    #[test]
    fn saturation_is_reported() {
        let mut agc = GainControl::new(8000, AgcConfig::default()).unwrap();
        let mut frame = [i16::MAX; 80];
        agc.analyze(&mut frame, None).unwrap();
        assert!(agc.stream_is_saturated());
        let mut frame = [0i16; 80];
        agc.analyze(&mut frame, None).unwrap();
        assert!(!agc.stream_is_saturated());
    }

    #[test]
    fn fixed_digital_applies_compression_gain() {
        let config = AgcConfig {
            mode: AgcMode::FixedDigital,
            compression_gain_db: 6,
            ..AgcConfig::default()
        };
        let mut agc = GainControl::new(16000, config).unwrap();
        for _ in 0..5 {
            let mut frame = [200i16; 160];
            agc.analyze(&mut frame, None).unwrap();
            agc.process(&mut frame, None, false).unwrap();
        }
        assert!((agc.compressor_gain_db() - 6.0).abs() < 0.1);
    }

    #[test]
    fn set_config_clamps_levels() {
        let mut agc = GainControl::new(16000, AgcConfig::default()).unwrap();
        agc.set_stream_analog_level(200).unwrap();
        let config = AgcConfig {
            analog_level_max: 150,
            ..AgcConfig::default()
        };
        agc.set_config(config).unwrap();
        assert_eq!(agc.stream_analog_level(), 150);
        let bad = AgcConfig {
            target_level_dbfs: 40,
            ..AgcConfig::default()
        };
        assert!(agc.set_config(bad).is_err());
        assert_eq!(agc.config().analog_level_max, 150);
    }

    #[test]
    fn rejects_wrong_frame_length() {
        let mut agc = GainControl::new(16000, AgcConfig::default()).unwrap();
        let mut frame = [0i16; 80];
        assert!(matches!(
            agc.process(&mut frame, None, false),
            Err(AgcError::BadFrameLength {
                expected: 160,
                actual: 80
            })
        ));
    }
}
