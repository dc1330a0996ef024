//! Gain control component: one controller per capture channel.
//!
//! The analog level the caller reports is handed to every channel; the
//! level reported back is the mean of what the channels suggest.
//!
//! C++ source: `webrtc/modules/audio_processing/gain_control_impl.cc`

use derive_more::Debug;
use parking_lot::Mutex;
use webrtc_agc::config::{MAX_COMPRESSION_GAIN_DB, MAX_TARGET_LEVEL_DBFS};
use webrtc_agc::{AgcConfig, GainControl as AgcHandle};

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing_impl::AudioProcessingImpl;
use crate::config::{GainControlConfig, GainControlMode};
use crate::error::Error;
use crate::handle_bank::HandleBank;
use crate::stream_config::ProcessingConfig;

#[derive(Debug)]
pub(crate) struct GainControlImpl {
    enabled: bool,
    mode: GainControlMode,
    settings: AgcConfig,
    /// Level last reported through `set_stream_analog_level`.
    stream_level: i32,
    stream_is_saturated: bool,
    #[debug(skip)]
    handles: HandleBank<AgcHandle>,
}

impl GainControlImpl {
    pub(crate) fn new() -> Self {
        let settings = AgcConfig::default();
        Self {
            enabled: false,
            mode: GainControlMode::default(),
            settings,
            stream_level: i32::from(settings.analog_level_min),
            stream_is_saturated: false,
            handles: HandleBank::default(),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn mode(&self) -> GainControlMode {
        self.mode
    }

    /// Whether frames need a reported analog level.
    pub(crate) fn requires_analog_level(&self) -> bool {
        self.enabled && self.mode == GainControlMode::AdaptiveAnalog
    }

    pub(crate) fn set_enabled(&mut self, enable: bool, config: &ProcessingConfig) -> Result<(), Error> {
        if enable == self.enabled {
            return Ok(());
        }
        self.enabled = enable;
        if let Err(err) = self.initialize(config) {
            self.enabled = false;
            self.handles.clear();
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn initialize(&mut self, config: &ProcessingConfig) -> Result<(), Error> {
        self.stream_is_saturated = false;
        if !self.enabled {
            self.handles.clear();
            return Ok(());
        }
        let rate = config.input_stream().sample_rate_hz();
        let settings = self.settings;
        let mut handles = HandleBank::build(config.output_stream().num_channels(), 1, || {
            AgcHandle::new(rate, settings)
        })?;
        for handle in handles.iter_mut() {
            handle.set_stream_analog_level(self.stream_level)?;
        }
        self.handles = handles;
        tracing::debug!(handles = self.handles.len(), rate, mode = ?self.mode, "gain control initialized");
        Ok(())
    }

    fn configure(&mut self, settings: AgcConfig) -> Result<(), Error> {
        settings.validate()?;
        for handle in self.handles.iter_mut() {
            handle.set_config(settings)?;
        }
        self.settings = settings;
        self.stream_level = self.stream_level.clamp(
            i32::from(settings.analog_level_min),
            i32::from(settings.analog_level_max),
        );
        Ok(())
    }

    pub(crate) fn set_mode(&mut self, mode: GainControlMode) -> Result<(), Error> {
        self.configure(AgcConfig {
            mode: mode.into(),
            ..self.settings
        })?;
        self.mode = mode;
        Ok(())
    }

    pub(crate) fn set_target_level_dbfs(&mut self, level: i32) -> Result<(), Error> {
        let level = u8::try_from(level)
            .ok()
            .filter(|&l| l <= MAX_TARGET_LEVEL_DBFS)
            .ok_or(Error::BadParameter)?;
        self.configure(AgcConfig {
            target_level_dbfs: level,
            ..self.settings
        })
    }

    pub(crate) fn set_compression_gain_db(&mut self, gain: i32) -> Result<(), Error> {
        let gain = u8::try_from(gain)
            .ok()
            .filter(|&g| g <= MAX_COMPRESSION_GAIN_DB)
            .ok_or(Error::BadParameter)?;
        self.configure(AgcConfig {
            compression_gain_db: gain,
            ..self.settings
        })
    }

    pub(crate) fn enable_limiter(&mut self, enable: bool) -> Result<(), Error> {
        self.configure(AgcConfig {
            limiter: enable,
            ..self.settings
        })
    }

    pub(crate) fn set_analog_level_limits(&mut self, minimum: i32, maximum: i32) -> Result<(), Error> {
        let minimum = u16::try_from(minimum).map_err(|_| Error::BadParameter)?;
        let maximum = u16::try_from(maximum).map_err(|_| Error::BadParameter)?;
        if maximum <= minimum {
            return Err(Error::BadParameter);
        }
        self.configure(AgcConfig {
            analog_level_min: minimum,
            analog_level_max: maximum,
            ..self.settings
        })
    }

    /// Record the capture device level for the coming frame.
    pub(crate) fn set_stream_analog_level(&mut self, level: i32) -> Result<(), Error> {
        let (min, max) = (
            i32::from(self.settings.analog_level_min),
            i32::from(self.settings.analog_level_max),
        );
        if !(min..=max).contains(&level) {
            return Err(Error::BadParameter);
        }
        for handle in self.handles.iter_mut() {
            handle.set_stream_analog_level(level)?;
        }
        self.stream_level = level;
        Ok(())
    }

    /// Mean of the levels the channels suggest, or the last reported level
    /// while disabled.
    pub(crate) fn stream_analog_level(&self) -> i32 {
        if self.handles.is_empty() {
            return self.stream_level;
        }
        let sum: i32 = self
            .handles
            .iter()
            .map(|h| i32::from(h.stream_analog_level()))
            .sum();
        sum / self.handles.len() as i32
    }

    pub(crate) fn stream_is_saturated(&self) -> bool {
        self.stream_is_saturated
    }

    /// Analysis hook, before echo cancellation.
    pub(crate) fn analyze_capture_audio(&mut self, capture: &mut AudioBuffer) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        self.stream_is_saturated = false;
        for i in 0..capture.num_channels() {
            let handle = self.handles.get_mut(i, 0);
            let (low, high) = capture.bands_mut(i);
            handle.analyze(low, high)?;
            self.stream_is_saturated |= handle.stream_is_saturated();
        }
        Ok(())
    }

    /// Level update and compression, after the other components.
    pub(crate) fn process_capture_audio(
        &mut self,
        capture: &mut AudioBuffer,
        stream_has_echo: bool,
    ) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        for i in 0..capture.num_channels() {
            let (low, high) = capture.bands_mut(i);
            self.handles.get_mut(i, 0).process(low, high, stream_has_echo)?;
        }
        Ok(())
    }

    pub(crate) fn config(&self) -> GainControlConfig {
        GainControlConfig {
            enabled: self.enabled,
            mode: self.mode,
            target_level_dbfs: i32::from(self.settings.target_level_dbfs),
            compression_gain_db: i32::from(self.settings.compression_gain_db),
            limiter: self.settings.limiter,
            analog_level_minimum: i32::from(self.settings.analog_level_min),
            analog_level_maximum: i32::from(self.settings.analog_level_max),
        }
    }

    pub(crate) fn apply_settings(&mut self, config: &GainControlConfig) -> Result<(), Error> {
        self.set_mode(config.mode)?;
        self.set_target_level_dbfs(config.target_level_dbfs)?;
        self.set_compression_gain_db(config.compression_gain_db)?;
        self.enable_limiter(config.limiter)?;
        self.set_analog_level_limits(config.analog_level_minimum, config.analog_level_maximum)
    }
}

/// Handle to the gain controller of an
/// [`AudioProcessing`](crate::AudioProcessing) instance.
#[derive(Debug, Clone, Copy)]
pub struct GainControl<'a> {
    #[debug(skip)]
    pub(crate) apm: &'a Mutex<AudioProcessingImpl>,
}

impl GainControl<'_> {
    pub fn enable(&self, enable: bool) -> Result<(), Error> {
        let mut apm = self.apm.lock();
        let apm = &mut *apm;
        apm.agc.set_enabled(enable, &apm.config)
    }

    pub fn is_enabled(&self) -> bool {
        self.apm.lock().agc.is_enabled()
    }

    pub fn set_mode(&self, mode: GainControlMode) -> Result<(), Error> {
        self.apm.lock().agc.set_mode(mode)
    }

    pub fn mode(&self) -> GainControlMode {
        self.apm.lock().agc.mode()
    }

    /// Output target in dB below full scale, `0..=31`.
    pub fn set_target_level_dbfs(&self, level: i32) -> Result<(), Error> {
        self.apm.lock().agc.set_target_level_dbfs(level)
    }

    pub fn target_level_dbfs(&self) -> i32 {
        i32::from(self.apm.lock().agc.settings.target_level_dbfs)
    }

    /// Gain the compressor applies to quiet input, `0..=90` dB.
    pub fn set_compression_gain_db(&self, gain: i32) -> Result<(), Error> {
        self.apm.lock().agc.set_compression_gain_db(gain)
    }

    pub fn compression_gain_db(&self) -> i32 {
        i32::from(self.apm.lock().agc.settings.compression_gain_db)
    }

    pub fn enable_limiter(&self, enable: bool) -> Result<(), Error> {
        self.apm.lock().agc.enable_limiter(enable)
    }

    pub fn is_limiter_enabled(&self) -> bool {
        self.apm.lock().agc.settings.limiter
    }

    /// Range of the capture device volume, `0 <= minimum < maximum <= 65535`.
    pub fn set_analog_level_limits(&self, minimum: i32, maximum: i32) -> Result<(), Error> {
        self.apm.lock().agc.set_analog_level_limits(minimum, maximum)
    }

    pub fn analog_level_minimum(&self) -> i32 {
        i32::from(self.apm.lock().agc.settings.analog_level_min)
    }

    pub fn analog_level_maximum(&self) -> i32 {
        i32::from(self.apm.lock().agc.settings.analog_level_max)
    }

    /// Same as [`AudioProcessing::set_stream_analog_level`](crate::AudioProcessing::set_stream_analog_level).
    pub fn set_stream_analog_level(&self, level: i32) -> Result<(), Error> {
        self.apm.lock().set_stream_analog_level(level)
    }

    /// Suggested capture device volume after the last frame.
    pub fn stream_analog_level(&self) -> i32 {
        self.apm.lock().agc.stream_analog_level()
    }

    /// Whether clipping was found in the last capture frame.
    pub fn stream_is_saturated(&self) -> bool {
        self.apm.lock().agc.stream_is_saturated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_validate_ranges() {
        let mut agc = GainControlImpl::new();
        assert_eq!(agc.set_target_level_dbfs(32), Err(Error::BadParameter));
        assert_eq!(agc.set_target_level_dbfs(-1), Err(Error::BadParameter));
        agc.set_target_level_dbfs(31).unwrap();
        assert_eq!(agc.set_compression_gain_db(91), Err(Error::BadParameter));
        agc.set_compression_gain_db(0).unwrap();
        assert_eq!(agc.set_analog_level_limits(-1, 100), Err(Error::BadParameter));
        assert_eq!(agc.set_analog_level_limits(0, 65536), Err(Error::BadParameter));
        assert_eq!(agc.set_analog_level_limits(100, 100), Err(Error::BadParameter));
        agc.set_analog_level_limits(10, 100).unwrap();

        let config = agc.config();
        assert_eq!(config.target_level_dbfs, 31);
        assert_eq!(config.compression_gain_db, 0);
        assert_eq!((config.analog_level_minimum, config.analog_level_maximum), (10, 100));
    }

    #[test]
    fn analog_level_is_range_checked() {
        let mut agc = GainControlImpl::new();
        agc.set_analog_level_limits(0, 100).unwrap();
        assert_eq!(agc.set_stream_analog_level(101), Err(Error::BadParameter));
        agc.set_stream_analog_level(60).unwrap();
        assert_eq!(agc.stream_analog_level(), 60);
    }

    #[test]
    fn stereo_gets_two_handles_and_saturation_is_any_channel() {
        let cfg = ProcessingConfig::new(16000, 2, 2, 1);
        let mut agc = GainControlImpl::new();
        agc.set_mode(GainControlMode::FixedDigital).unwrap();
        agc.set_enabled(true, &cfg).unwrap();
        assert_eq!(agc.handles.len(), 2);

        let mut frame = crate::AudioFrame::new(16000, 2);
        for (i, s) in frame.data.iter_mut().enumerate() {
            // Left channel clips.
            *s = if i % 2 == 0 { i16::MAX } else { 0 };
        }
        let mut buffer = AudioBuffer::new(cfg.input_stream(), 2);
        buffer.copy_from_interleaved_i16(&frame, 2);
        agc.analyze_capture_audio(&mut buffer).unwrap();
        assert!(agc.stream_is_saturated());
        agc.process_capture_audio(&mut buffer, false).unwrap();
    }
}
