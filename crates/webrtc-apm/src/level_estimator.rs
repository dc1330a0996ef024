//! Output level estimator.
//!
//! Accumulates the energy of every processed capture frame, all output
//! channels at full band, and reports it in dBFS when read.
//!
//! C++ source: `webrtc/modules/audio_processing/level_estimator_impl.cc`

use derive_more::Debug;
use parking_lot::Mutex;

use crate::audio_frame::AudioFrame;
use crate::audio_processing_impl::AudioProcessingImpl;
use crate::config::LevelEstimatorConfig;
use crate::error::Error;
use crate::rms_level::RmsLevel;

#[derive(Debug, Default)]
pub(crate) struct LevelEstimatorImpl {
    enabled: bool,
    #[debug(skip)]
    rms: RmsLevel,
}

impl LevelEstimatorImpl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enable: bool) {
        if enable != self.enabled {
            self.enabled = enable;
            self.rms.reset();
        }
    }

    pub(crate) fn initialize(&mut self) {
        self.rms.reset();
    }

    pub(crate) fn process_stream(&mut self, frame: &AudioFrame) {
        if self.enabled {
            self.rms.analyze(&frame.data);
        }
    }

    /// Level since the previous read, `0..=127` dBFS (127 is silence).
    pub(crate) fn rms(&mut self) -> Result<i32, Error> {
        if !self.enabled {
            return Err(Error::NotEnabled);
        }
        Ok(self.rms.average())
    }

    pub(crate) fn config(&self) -> LevelEstimatorConfig {
        LevelEstimatorConfig {
            enabled: self.enabled,
        }
    }
}

/// Handle to the level estimator of an
/// [`AudioProcessing`](crate::AudioProcessing) instance.
#[derive(Debug, Clone, Copy)]
pub struct LevelEstimator<'a> {
    #[debug(skip)]
    pub(crate) apm: &'a Mutex<AudioProcessingImpl>,
}

impl LevelEstimator<'_> {
    /// Fails with [`Error::UnsupportedComponent`] when the crate is built
    /// without the `level-estimator` feature.
    pub fn enable(&self, enable: bool) -> Result<(), Error> {
        if !cfg!(feature = "level-estimator") {
            return Err(Error::UnsupportedComponent);
        }
        self.apm.lock().level.set_enabled(enable);
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.apm.lock().level.is_enabled()
    }

    /// RMS level of the output since the previous call, as a positive
    /// dBFS value.
    pub fn rms(&self) -> Result<i32, Error> {
        self.apm.lock().level.rms()
    }
}
