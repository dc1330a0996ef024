//! Wideband echo cancellation component.
//!
//! One [`EchoCanceller`] per (capture channel, render channel) pair. Each
//! render channel is buffered into the handles it feeds; each capture
//! channel runs through its handles in render-channel order.
//!
//! C++ source: `webrtc/modules/audio_processing/echo_cancellation_impl.cc`

use derive_more::Debug;
use parking_lot::Mutex;
use webrtc_aec::config::{MAX_DEVICE_SAMPLE_RATE_HZ, MIN_DEVICE_SAMPLE_RATE_HZ};
use webrtc_aec::{AecConfig, DelayMetrics, EchoCanceller, EchoMetrics};

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing_impl::AudioProcessingImpl;
use crate::config::{EchoCancellationConfig, EchoSuppressionLevel};
use crate::error::Error;
use crate::handle_bank::HandleBank;
use crate::stream_config::ProcessingConfig;

#[derive(Debug)]
pub(crate) struct EchoCancellationImpl {
    enabled: bool,
    suppression_level: EchoSuppressionLevel,
    settings: AecConfig,
    stream_has_echo: bool,
    #[debug(skip)]
    handles: HandleBank<EchoCanceller>,
}

impl EchoCancellationImpl {
    pub(crate) fn new() -> Self {
        Self {
            enabled: false,
            suppression_level: EchoSuppressionLevel::default(),
            settings: AecConfig::default(),
            stream_has_echo: false,
            handles: HandleBank::default(),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
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

    /// Recreate the handles for the current shape, or drop them when
    /// disabled.
    pub(crate) fn initialize(&mut self, config: &ProcessingConfig) -> Result<(), Error> {
        self.stream_has_echo = false;
        if !self.enabled {
            self.handles.clear();
            return Ok(());
        }
        let rate = config.input_stream().sample_rate_hz();
        let settings = self.settings;
        self.handles = HandleBank::build(
            config.output_stream().num_channels(),
            config.reverse_stream().num_channels(),
            || EchoCanceller::new(rate, settings),
        )?;
        tracing::debug!(handles = self.handles.len(), rate, "echo cancellation initialized");
        Ok(())
    }

    fn configure(&mut self, settings: AecConfig) -> Result<(), Error> {
        for handle in self.handles.iter_mut() {
            handle.set_config(settings)?;
        }
        self.settings = settings;
        Ok(())
    }

    pub(crate) fn drift_compensation_enabled(&self) -> bool {
        self.settings.drift_compensation
    }

    pub(crate) fn stream_has_echo(&self) -> bool {
        self.stream_has_echo
    }

    /// Buffer one render frame.
    pub(crate) fn analyze_reverse_stream(&mut self, render: &AudioBuffer) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        for j in 0..render.num_channels() {
            let far = render.low_band(j);
            for handle in self.handles.for_render_mut(j) {
                handle.buffer_far_end(far)?;
            }
        }
        Ok(())
    }

    pub(crate) fn process_capture_stream(
        &mut self,
        capture: &mut AudioBuffer,
        num_render: usize,
        delay_ms: i32,
        drift_samples: i32,
    ) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        self.stream_has_echo = false;
        for i in 0..capture.num_channels() {
            for j in 0..num_render {
                let handle = self.handles.get_mut(i, j);
                let (low, high) = capture.bands_mut(i);
                handle.process(low, high, delay_ms, drift_samples)?;
                self.stream_has_echo |= handle.stream_has_echo();
            }
        }
        Ok(())
    }

    pub(crate) fn metrics(&self) -> Result<EchoMetrics, Error> {
        if !self.enabled || !self.settings.metrics {
            return Err(Error::NotEnabled);
        }
        let handle = self.handles.first().ok_or(Error::NotEnabled)?;
        Ok(handle.metrics()?)
    }

    pub(crate) fn delay_metrics(&mut self) -> Result<DelayMetrics, Error> {
        if !self.enabled || !self.settings.delay_logging {
            return Err(Error::NotEnabled);
        }
        let handle = self.handles.first_mut().ok_or(Error::NotEnabled)?;
        Ok(handle.delay_metrics()?)
    }

    pub(crate) fn set_suppression_level(&mut self, level: EchoSuppressionLevel) -> Result<(), Error> {
        let settings = AecConfig {
            suppression_level: level.into(),
            ..self.settings
        };
        self.configure(settings)?;
        self.suppression_level = level;
        Ok(())
    }

    pub(crate) fn enable_drift_compensation(&mut self, enable: bool) -> Result<(), Error> {
        self.configure(AecConfig {
            drift_compensation: enable,
            ..self.settings
        })
    }

    pub(crate) fn set_device_sample_rate_hz(&mut self, rate: i32) -> Result<(), Error> {
        let rate = u32::try_from(rate).map_err(|_| Error::BadParameter)?;
        if !(MIN_DEVICE_SAMPLE_RATE_HZ..=MAX_DEVICE_SAMPLE_RATE_HZ).contains(&rate) {
            return Err(Error::BadParameter);
        }
        self.configure(AecConfig {
            device_sample_rate_hz: rate,
            ..self.settings
        })
    }

    pub(crate) fn enable_metrics(&mut self, enable: bool) -> Result<(), Error> {
        self.configure(AecConfig {
            metrics: enable,
            ..self.settings
        })
    }

    pub(crate) fn enable_delay_logging(&mut self, enable: bool) -> Result<(), Error> {
        self.configure(AecConfig {
            delay_logging: enable,
            ..self.settings
        })
    }

    pub(crate) fn config(&self) -> EchoCancellationConfig {
        EchoCancellationConfig {
            enabled: self.enabled,
            suppression_level: self.suppression_level,
            drift_compensation: self.settings.drift_compensation,
            device_sample_rate_hz: self.settings.device_sample_rate_hz,
            metrics: self.settings.metrics,
            delay_logging: self.settings.delay_logging,
        }
    }

    /// Apply everything but the enable flag.
    pub(crate) fn apply_settings(&mut self, config: &EchoCancellationConfig) -> Result<(), Error> {
        self.set_suppression_level(config.suppression_level)?;
        self.enable_drift_compensation(config.drift_compensation)?;
        self.set_device_sample_rate_hz(
            i32::try_from(config.device_sample_rate_hz).map_err(|_| Error::BadParameter)?,
        )?;
        self.enable_metrics(config.metrics)?;
        self.enable_delay_logging(config.delay_logging)
    }
}

/// Handle to the wideband echo canceller of an
/// [`AudioProcessing`](crate::AudioProcessing) instance.
///
/// Enabling it while the mobile echo canceller is enabled fails with
/// [`Error::BadParameter`].
#[derive(Debug, Clone, Copy)]
pub struct EchoCancellation<'a> {
    #[debug(skip)]
    pub(crate) apm: &'a Mutex<AudioProcessingImpl>,
}

impl EchoCancellation<'_> {
    pub fn enable(&self, enable: bool) -> Result<(), Error> {
        self.apm.lock().enable_echo_cancellation(enable)
    }

    pub fn is_enabled(&self) -> bool {
        self.apm.lock().aec.is_enabled()
    }

    pub fn set_suppression_level(&self, level: EchoSuppressionLevel) -> Result<(), Error> {
        self.apm.lock().aec.set_suppression_level(level)
    }

    pub fn suppression_level(&self) -> EchoSuppressionLevel {
        self.apm.lock().aec.suppression_level
    }

    /// Require [`AudioProcessing::set_stream_drift_samples`](crate::AudioProcessing::set_stream_drift_samples)
    /// before every capture frame and resample the render signal by it.
    pub fn enable_drift_compensation(&self, enable: bool) -> Result<(), Error> {
        self.apm.lock().aec.enable_drift_compensation(enable)
    }

    pub fn is_drift_compensation_enabled(&self) -> bool {
        self.apm.lock().aec.drift_compensation_enabled()
    }

    /// Rate of the render device clock, in `[8000, 96000]`.
    pub fn set_device_sample_rate_hz(&self, rate: i32) -> Result<(), Error> {
        self.apm.lock().aec.set_device_sample_rate_hz(rate)
    }

    pub fn device_sample_rate_hz(&self) -> u32 {
        self.apm.lock().aec.settings.device_sample_rate_hz
    }

    pub fn enable_metrics(&self, enable: bool) -> Result<(), Error> {
        self.apm.lock().aec.enable_metrics(enable)
    }

    pub fn are_metrics_enabled(&self) -> bool {
        self.apm.lock().aec.settings.metrics
    }

    /// ERL, ERLE, RERL and A-NLP, updated once per second of audio.
    pub fn metrics(&self) -> Result<EchoMetrics, Error> {
        self.apm.lock().aec.metrics()
    }

    pub fn enable_delay_logging(&self, enable: bool) -> Result<(), Error> {
        self.apm.lock().aec.enable_delay_logging(enable)
    }

    pub fn is_delay_logging_enabled(&self) -> bool {
        self.apm.lock().aec.settings.delay_logging
    }

    /// Median and spread of the estimated delay since the last call.
    pub fn delay_metrics(&self) -> Result<DelayMetrics, Error> {
        self.apm.lock().aec.delay_metrics()
    }

    /// Whether echo was found in the last capture frame.
    pub fn stream_has_echo(&self) -> bool {
        self.apm.lock().aec.stream_has_echo()
    }
}
