//! Noise suppression component: one suppressor per capture channel.
//!
//! C++ source: `webrtc/modules/audio_processing/noise_suppression_impl.cc`

use derive_more::Debug;
use parking_lot::Mutex;
use webrtc_ns::{NoiseSuppressor, NsConfig};

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing_impl::AudioProcessingImpl;
use crate::config::{NoiseSuppressionConfig, NoiseSuppressionLevel};
use crate::error::Error;
use crate::handle_bank::HandleBank;
use crate::stream_config::ProcessingConfig;

#[derive(Debug)]
pub(crate) struct NoiseSuppressionImpl {
    enabled: bool,
    level: NoiseSuppressionLevel,
    sample_rate_hz: u32,
    #[debug(skip)]
    handles: HandleBank<NoiseSuppressor>,
}

impl NoiseSuppressionImpl {
    pub(crate) fn new() -> Self {
        Self {
            enabled: false,
            level: NoiseSuppressionLevel::default(),
            sample_rate_hz: 16000,
            handles: HandleBank::default(),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn level(&self) -> NoiseSuppressionLevel {
        self.level
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
        self.sample_rate_hz = config.input_stream().sample_rate_hz();
        self.rebuild(config.output_stream().num_channels())
    }

    fn rebuild(&mut self, num_channels: usize) -> Result<(), Error> {
        if !self.enabled {
            self.handles.clear();
            return Ok(());
        }
        let ns_config = NsConfig {
            target_level: self.level.into(),
            sample_rate_hz: self.sample_rate_hz,
        };
        self.handles = HandleBank::build(num_channels, 1, || NoiseSuppressor::new(ns_config))?;
        tracing::debug!(
            handles = self.handles.len(),
            level = ?self.level,
            "noise suppression initialized"
        );
        Ok(())
    }

    /// Suppressors carry no level setter; a new level means new handles.
    pub(crate) fn set_level(&mut self, level: NoiseSuppressionLevel) -> Result<(), Error> {
        if level == self.level {
            return Ok(());
        }
        let previous = self.level;
        self.level = level;
        let num_channels = self.handles.len();
        if let Err(err) = self.rebuild(num_channels) {
            self.level = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Mean speech probability over the channels for the last frame.
    pub(crate) fn speech_probability(&self) -> Result<f32, Error> {
        if !self.enabled || self.handles.is_empty() {
            return Err(Error::NotEnabled);
        }
        let sum: f32 = self.handles.iter().map(NoiseSuppressor::speech_probability).sum();
        Ok(sum / self.handles.len() as f32)
    }

    pub(crate) fn process_capture_audio(&mut self, capture: &mut AudioBuffer) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        for i in 0..capture.num_channels() {
            let handle = self.handles.get_mut(i, 0);
            handle.analyze(capture.low_band(i))?;
            let (low, high) = capture.bands_mut(i);
            handle.process(low, high)?;
        }
        Ok(())
    }

    pub(crate) fn config(&self) -> NoiseSuppressionConfig {
        NoiseSuppressionConfig {
            enabled: self.enabled,
            level: self.level,
        }
    }
}

/// Handle to the noise suppressor of an
/// [`AudioProcessing`](crate::AudioProcessing) instance.
#[derive(Debug, Clone, Copy)]
pub struct NoiseSuppression<'a> {
    #[debug(skip)]
    pub(crate) apm: &'a Mutex<AudioProcessingImpl>,
}

impl NoiseSuppression<'_> {
    pub fn enable(&self, enable: bool) -> Result<(), Error> {
        let mut apm = self.apm.lock();
        let apm = &mut *apm;
        apm.ns.set_enabled(enable, &apm.config)
    }

    pub fn is_enabled(&self) -> bool {
        self.apm.lock().ns.is_enabled()
    }

    pub fn set_level(&self, level: NoiseSuppressionLevel) -> Result<(), Error> {
        self.apm.lock().ns.set_level(level)
    }

    pub fn level(&self) -> NoiseSuppressionLevel {
        self.apm.lock().ns.level()
    }

    /// Probability that the last frame held speech, averaged over the
    /// channels.
    pub fn speech_probability(&self) -> Result<f32, Error> {
        self.apm.lock().ns.speech_probability()
    }
}
