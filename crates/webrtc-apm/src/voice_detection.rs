//! Voice activity detection on the capture stream.
//!
//! Runs the GMM detector on the mono mix of the low band. A caller may
//! supply the decision for a frame instead, in which case the detector
//! skips that frame.
//!
//! C++ source: `webrtc/modules/audio_processing/voice_detection_impl.cc`

use derive_more::Debug;
use parking_lot::Mutex;
use webrtc_vad::Vad;

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing_impl::AudioProcessingImpl;
use crate::config::{Likelihood, VoiceDetectionConfig};
use crate::error::Error;
use crate::stream_config::ProcessingConfig;

/// The only frame size the detector is driven with.
pub const FRAME_SIZE_MS: i32 = 10;

#[derive(Debug)]
pub(crate) struct VoiceDetectionImpl {
    enabled: bool,
    likelihood: Likelihood,
    frame_size_ms: i32,
    /// Rate of the band the detector sees.
    sample_rate_hz: u32,
    stream_has_voice: bool,
    using_external_vad: bool,
    #[debug(skip)]
    vad: Vad,
}

impl VoiceDetectionImpl {
    pub(crate) fn new() -> Self {
        let likelihood = Likelihood::default();
        let mut vad = Vad::new();
        vad.set_aggressiveness(likelihood.into());
        Self {
            enabled: false,
            likelihood,
            frame_size_ms: FRAME_SIZE_MS,
            sample_rate_hz: 16000,
            stream_has_voice: false,
            using_external_vad: false,
            vad,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enable: bool, config: &ProcessingConfig) {
        if enable == self.enabled {
            return;
        }
        self.enabled = enable;
        self.initialize(config);
    }

    pub(crate) fn initialize(&mut self, config: &ProcessingConfig) {
        self.sample_rate_hz = config.input_stream().split_rate_hz();
        self.vad.reset();
        self.using_external_vad = false;
    }

    pub(crate) fn likelihood(&self) -> Likelihood {
        self.likelihood
    }

    pub(crate) fn set_likelihood(&mut self, likelihood: Likelihood) {
        self.likelihood = likelihood;
        self.vad.set_aggressiveness(likelihood.into());
    }

    pub(crate) fn frame_size_ms(&self) -> i32 {
        self.frame_size_ms
    }

    pub(crate) fn set_frame_size_ms(&mut self, size: i32) -> Result<(), Error> {
        if size != FRAME_SIZE_MS {
            return Err(Error::BadParameter);
        }
        self.frame_size_ms = size;
        Ok(())
    }

    pub(crate) fn stream_has_voice(&self) -> bool {
        self.stream_has_voice
    }

    /// Supply the decision for the next processed frame.
    pub(crate) fn set_stream_has_voice(&mut self, has_voice: bool) {
        self.using_external_vad = true;
        self.stream_has_voice = has_voice;
    }

    /// Run the detector unless the caller decided this frame already.
    /// Returns the decision when the component is enabled.
    pub(crate) fn process_capture_audio(&mut self, capture: &mut AudioBuffer) -> Result<Option<bool>, Error> {
        if !self.enabled {
            return Ok(None);
        }
        if self.using_external_vad {
            self.using_external_vad = false;
            return Ok(Some(self.stream_has_voice));
        }
        let mixed = capture.mixed_low_pass_data();
        self.stream_has_voice = self.vad.process(self.sample_rate_hz, mixed)?;
        tracing::trace!(has_voice = self.stream_has_voice, "voice detection");
        Ok(Some(self.stream_has_voice))
    }

    /// Forget an external decision that no frame consumed.
    pub(crate) fn end_frame(&mut self) {
        self.using_external_vad = false;
    }

    pub(crate) fn config(&self) -> VoiceDetectionConfig {
        VoiceDetectionConfig {
            enabled: self.enabled,
            likelihood: self.likelihood,
            frame_size_ms: self.frame_size_ms,
        }
    }

    pub(crate) fn apply_settings(&mut self, config: &VoiceDetectionConfig) -> Result<(), Error> {
        self.set_frame_size_ms(config.frame_size_ms)?;
        self.set_likelihood(config.likelihood);
        Ok(())
    }
}

/// Handle to the voice activity detector of an
/// [`AudioProcessing`](crate::AudioProcessing) instance.
#[derive(Debug, Clone, Copy)]
pub struct VoiceDetection<'a> {
    #[debug(skip)]
    pub(crate) apm: &'a Mutex<AudioProcessingImpl>,
}

impl VoiceDetection<'_> {
    pub fn enable(&self, enable: bool) -> Result<(), Error> {
        let mut apm = self.apm.lock();
        let apm = &mut *apm;
        apm.vad.set_enabled(enable, &apm.config);
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.apm.lock().vad.is_enabled()
    }

    pub fn set_likelihood(&self, likelihood: Likelihood) -> Result<(), Error> {
        self.apm.lock().vad.set_likelihood(likelihood);
        Ok(())
    }

    pub fn likelihood(&self) -> Likelihood {
        self.apm.lock().vad.likelihood()
    }

    /// Only 10 ms frames are supported.
    pub fn set_frame_size_ms(&self, size: i32) -> Result<(), Error> {
        self.apm.lock().vad.set_frame_size_ms(size)
    }

    pub fn frame_size_ms(&self) -> i32 {
        self.apm.lock().vad.frame_size_ms()
    }

    /// Decision for the last processed frame, or the value passed to
    /// [`set_stream_has_voice`](Self::set_stream_has_voice) since.
    pub fn stream_has_voice(&self) -> bool {
        self.apm.lock().vad.stream_has_voice()
    }

    /// Override the detector for the next processed frame.
    pub fn set_stream_has_voice(&self, has_voice: bool) -> Result<(), Error> {
        self.apm.lock().vad.set_stream_has_voice(has_voice);
        Ok(())
    }
}
