//! Public audio processing API.
//!
//! Provides the user-facing [`AudioProcessing`] struct and
//! [`AudioProcessingBuilder`] for constructing configured instances.
//!
//! Ported from `AudioProcessing` in
//! `webrtc/modules/audio_processing/include/audio_processing.h`.

use derive_more::Debug;
use parking_lot::Mutex;

use crate::audio_frame::AudioFrame;
use crate::audio_processing_impl::AudioProcessingImpl;
use crate::config::{Config, EchoMode};
use crate::echo_cancellation::EchoCancellation;
use crate::echo_control_mobile::EchoControlMobile;
use crate::error::Error;
use crate::gain_control::GainControl;
use crate::high_pass_filter::HighPassFilter;
use crate::level_estimator::LevelEstimator;
use crate::noise_suppression::NoiseSuppression;
use crate::stats::AudioProcessingStats;
use crate::voice_detection::VoiceDetection;

// ─── AudioProcessingBuilder ─────────────────────────────────────────

/// Builder for constructing an [`AudioProcessing`] instance.
///
/// # Example
/// ```
/// use webrtc_apm::{AudioProcessing, Config};
///
/// let mut config = Config::default();
/// config.noise_suppression.enabled = true;
/// config.high_pass_filter.enabled = true;
///
/// let apm = AudioProcessing::builder()
///     .sample_rate_hz(32000)
///     .num_channels(2, 2)
///     .config(config)
///     .build()
///     .unwrap();
/// assert!(apm.noise_suppression().is_enabled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AudioProcessingBuilder {
    sample_rate_hz: Option<u32>,
    num_channels: Option<(usize, usize)>,
    num_reverse_channels: Option<usize>,
    config: Option<Config>,
}

impl AudioProcessingBuilder {
    pub fn sample_rate_hz(mut self, rate: u32) -> Self {
        self.sample_rate_hz = Some(rate);
        self
    }

    pub fn num_channels(mut self, input: usize, output: usize) -> Self {
        self.num_channels = Some((input, output));
        self
    }

    pub fn num_reverse_channels(mut self, channels: usize) -> Self {
        self.num_reverse_channels = Some(channels);
        self
    }

    /// Set the initial component settings.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the instance. Fails with the error the matching setter
    /// would return.
    pub fn build(self) -> Result<AudioProcessing, Error> {
        let apm = AudioProcessing::new();
        if let Some(rate) = self.sample_rate_hz {
            apm.set_sample_rate_hz(rate)?;
        }
        if let Some((input, output)) = self.num_channels {
            apm.set_num_channels(input, output)?;
        }
        if let Some(channels) = self.num_reverse_channels {
            apm.set_num_reverse_channels(channels)?;
        }
        if let Some(config) = &self.config {
            apm.apply_config(config)?;
        }
        Ok(apm)
    }
}

// ─── AudioProcessing ────────────────────────────────────────────────

/// Audio processing engine: echo cancellation, gain control, noise
/// suppression and voice detection on 10 ms frames of 16-bit PCM.
///
/// # Usage
///
/// 1. Create an instance with [`AudioProcessing::new()`] or
///    [`AudioProcessing::builder()`].
/// 2. For each 10 ms of audio:
///    - pass the far-end (playout) frame to
///      [`analyze_reverse_stream()`](AudioProcessing::analyze_reverse_stream);
///    - set the stream parameters the enabled components need
///      ([`set_stream_delay_ms()`](AudioProcessing::set_stream_delay_ms),
///      [`set_stream_drift_samples()`](AudioProcessing::set_stream_drift_samples),
///      [`set_stream_analog_level()`](AudioProcessing::set_stream_analog_level));
///    - pass the near-end (microphone) frame to
///      [`process_stream()`](AudioProcessing::process_stream).
///
/// Every method takes `&self`; calls are serialized by an internal mutex,
/// so one instance can be shared between a capture and a playout thread.
#[derive(Debug)]
pub struct AudioProcessing {
    #[debug(skip)]
    inner: Mutex<AudioProcessingImpl>,
}

impl AudioProcessing {
    /// 16 kHz, mono capture in and out, mono reverse, every component
    /// disabled.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AudioProcessingImpl::new()),
        }
    }

    pub fn builder() -> AudioProcessingBuilder {
        AudioProcessingBuilder::default()
    }

    // ─── Shape ───────────────────────────────────────────────────

    /// Reset every component for the current shape. Settings are kept.
    pub fn initialize(&self) -> Result<(), Error> {
        self.inner.lock().initialize()
    }

    /// One of 8000, 16000 or 32000. Reinitializes on success.
    pub fn set_sample_rate_hz(&self, rate: u32) -> Result<(), Error> {
        self.inner.lock().set_sample_rate(rate)
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.inner.lock().config.sample_rate_hz()
    }

    /// Capture channel counts with `1 <= output <= input <= 2`.
    pub fn set_num_channels(&self, input: usize, output: usize) -> Result<(), Error> {
        self.inner.lock().set_num_channels(input, output)
    }

    pub fn num_input_channels(&self) -> usize {
        self.inner.lock().config.input_stream().num_channels()
    }

    pub fn num_output_channels(&self) -> usize {
        self.inner.lock().config.output_stream().num_channels()
    }

    /// Render channel count, 1 or 2.
    pub fn set_num_reverse_channels(&self, channels: usize) -> Result<(), Error> {
        self.inner.lock().set_num_reverse_channels(channels)
    }

    pub fn num_reverse_channels(&self) -> usize {
        self.inner.lock().config.reverse_stream().num_channels()
    }

    // ─── Stream parameters ───────────────────────────────────────

    /// Delay between a far-end frame being analyzed and its echo reaching
    /// the microphone. Required before every capture frame while an echo
    /// canceller is enabled.
    ///
    /// Negative values are rejected. Values above 500 ms (after the
    /// offset) are clamped and reported with
    /// [`Error::BadStreamParameterWarning`]; the delay still counts as set.
    pub fn set_stream_delay_ms(&self, delay: i32) -> Result<(), Error> {
        self.inner.lock().set_stream_delay_ms(delay)
    }

    pub fn stream_delay_ms(&self) -> i32 {
        self.inner.lock().stream_delay_ms()
    }

    /// Constant added to every reported stream delay.
    pub fn set_delay_offset_ms(&self, offset: i32) {
        self.inner.lock().set_delay_offset_ms(offset);
    }

    pub fn delay_offset_ms(&self) -> i32 {
        self.inner.lock().delay_offset_ms()
    }

    /// Clock drift between render and capture devices, in samples at the
    /// device rate. Required while drift compensation is enabled.
    pub fn set_stream_drift_samples(&self, drift: i32) {
        self.inner.lock().set_stream_drift_samples(drift);
    }

    pub fn stream_drift_samples(&self) -> i32 {
        self.inner.lock().stream_drift_samples()
    }

    /// Current capture device volume. Required in adaptive analog mode;
    /// must be within the configured analog level limits.
    pub fn set_stream_analog_level(&self, level: i32) -> Result<(), Error> {
        self.inner.lock().set_stream_analog_level(level)
    }

    /// Volume the gain controller suggests after the last capture frame.
    pub fn stream_analog_level(&self) -> i32 {
        self.inner.lock().agc.stream_analog_level()
    }

    /// Provide the voice decision for the next capture frame, overriding
    /// the detector.
    pub fn set_stream_has_voice(&self, has_voice: bool) -> Result<(), Error> {
        self.voice_detection().set_stream_has_voice(has_voice)
    }

    // ─── Processing ──────────────────────────────────────────────

    /// Process one 10 ms capture frame in place.
    ///
    /// The frame must match the configured rate and input channel count.
    /// On return it carries the output channel count and, when voice
    /// detection is enabled, the voice decision.
    pub fn process_stream(&self, frame: &mut AudioFrame) -> Result<(), Error> {
        self.inner.lock().process_stream(frame)
    }

    /// Analyze one 10 ms render frame. The frame is not modified.
    pub fn analyze_reverse_stream(&self, frame: &AudioFrame) -> Result<(), Error> {
        self.inner.lock().analyze_reverse_stream(frame)
    }

    // ─── Configuration ───────────────────────────────────────────

    /// Apply a full settings snapshot through the validated setters.
    pub fn apply_config(&self, config: &Config) -> Result<(), Error> {
        self.inner.lock().apply_config(config)
    }

    /// Read back every component's settings.
    pub fn config(&self) -> Config {
        self.inner.lock().config()
    }

    pub fn echo_mode(&self) -> EchoMode {
        self.inner.lock().echo_mode()
    }

    /// Flags and echo metrics of the last capture frame.
    pub fn statistics(&self) -> AudioProcessingStats {
        self.inner.lock().statistics()
    }

    // ─── Components ──────────────────────────────────────────────

    pub fn echo_cancellation(&self) -> EchoCancellation<'_> {
        EchoCancellation { apm: &self.inner }
    }

    pub fn echo_control_mobile(&self) -> EchoControlMobile<'_> {
        EchoControlMobile { apm: &self.inner }
    }

    pub fn gain_control(&self) -> GainControl<'_> {
        GainControl { apm: &self.inner }
    }

    pub fn noise_suppression(&self) -> NoiseSuppression<'_> {
        NoiseSuppression { apm: &self.inner }
    }

    pub fn high_pass_filter(&self) -> HighPassFilter<'_> {
        HighPassFilter { apm: &self.inner }
    }

    pub fn voice_detection(&self) -> VoiceDetection<'_> {
        VoiceDetection { apm: &self.inner }
    }

    pub fn level_estimator(&self) -> LevelEstimator<'_> {
        LevelEstimator { apm: &self.inner }
    }
}

impl Default for AudioProcessing {
    fn default() -> Self {
        Self::new()
    }
}
