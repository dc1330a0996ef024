//! Core audio processing implementation.
//!
//! Ported from `AudioProcessingImpl` in
//! `modules/audio_processing/audio_processing_impl.h/cc`.
//!
//! Owns the stream shape, the per-frame stream parameters, both audio
//! buffers and every component, and runs the capture chain in its fixed
//! order. All access goes through the instance mutex held by
//! [`AudioProcessing`](crate::AudioProcessing).

use derive_more::Debug;

use crate::audio_buffer::AudioBuffer;
use crate::audio_frame::{AudioFrame, VadActivity};
use crate::config::{Config, EchoMode};
use crate::echo_cancellation::EchoCancellationImpl;
use crate::echo_control_mobile::EchoControlMobileImpl;
use crate::error::Error;
use crate::gain_control::GainControlImpl;
use crate::high_pass_filter::HighPassFilterImpl;
use crate::level_estimator::LevelEstimatorImpl;
use crate::noise_suppression::NoiseSuppressionImpl;
use crate::stats::AudioProcessingStats;
use crate::stream_config::{MAX_CHANNELS, ProcessingConfig, SPLIT_THRESHOLD_HZ, StreamConfig};
use crate::stream_params::{Requirements, StreamParams};
use crate::submodule_states::{EnabledSubmodules, SubmoduleStates};
use crate::voice_detection::VoiceDetectionImpl;

#[derive(Debug)]
pub(crate) struct AudioProcessingImpl {
    pub(crate) config: ProcessingConfig,
    delay_offset_ms: i32,
    params: StreamParams,
    submodules: SubmoduleStates,
    #[debug(skip)]
    capture: AudioBuffer,
    #[debug(skip)]
    render: AudioBuffer,
    stats: AudioProcessingStats,
    pub(crate) aec: EchoCancellationImpl,
    pub(crate) aecm: EchoControlMobileImpl,
    pub(crate) agc: GainControlImpl,
    pub(crate) ns: NoiseSuppressionImpl,
    pub(crate) hpf: HighPassFilterImpl,
    pub(crate) vad: VoiceDetectionImpl,
    pub(crate) level: LevelEstimatorImpl,
}

impl AudioProcessingImpl {
    /// 16 kHz, mono in and out, mono reverse, every component disabled.
    pub(crate) fn new() -> Self {
        let config = ProcessingConfig::default();
        let mut apm = Self {
            config,
            delay_offset_ms: 0,
            params: StreamParams::default(),
            submodules: SubmoduleStates::new(),
            capture: AudioBuffer::new(config.input_stream(), config.input_stream().num_channels()),
            render: AudioBuffer::new(
                config.reverse_stream(),
                config.reverse_stream().num_channels(),
            ),
            stats: AudioProcessingStats::default(),
            aec: EchoCancellationImpl::new(),
            aecm: EchoControlMobileImpl::new(),
            agc: GainControlImpl::new(),
            ns: NoiseSuppressionImpl::new(),
            hpf: HighPassFilterImpl::new(),
            vad: VoiceDetectionImpl::new(),
            level: LevelEstimatorImpl::new(),
        };
        apm.update_submodule_states();
        apm
    }

    // ─── Shape ───────────────────────────────────────────────────────

    /// Rebuild the buffers and every component's handles for the current
    /// shape. Filter states start over.
    pub(crate) fn initialize(&mut self) -> Result<(), Error> {
        let input = *self.config.input_stream();
        let reverse = *self.config.reverse_stream();
        self.capture = AudioBuffer::new(&input, input.num_channels());
        self.render = AudioBuffer::new(&reverse, reverse.num_channels());

        self.hpf.initialize(&self.config);
        self.agc.initialize(&self.config)?;
        self.aec.initialize(&self.config)?;
        self.ns.initialize(&self.config)?;
        self.aecm.initialize(&self.config)?;
        self.vad.initialize(&self.config);
        self.level.initialize();
        self.update_submodule_states();

        tracing::debug!(
            sample_rate_hz = input.sample_rate_hz(),
            input_channels = input.num_channels(),
            output_channels = self.config.output_stream().num_channels(),
            reverse_channels = reverse.num_channels(),
            "audio processing initialized"
        );
        Ok(())
    }

    /// Switch to `config` and initialize. On failure the previous shape
    /// is restored.
    fn reconfigure(&mut self, config: ProcessingConfig) -> Result<(), Error> {
        config.validate()?;
        let previous = self.config;
        self.config = config;
        if let Err(err) = self.initialize() {
            tracing::warn!(%err, "initialization failed, restoring previous shape");
            self.config = previous;
            if let Err(restore) = self.initialize() {
                tracing::error!(%restore, "failed to restore previous shape");
            }
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn set_sample_rate(&mut self, rate: u32) -> Result<(), Error> {
        let config = ProcessingConfig::new(
            rate,
            self.config.input_stream().num_channels(),
            self.config.output_stream().num_channels(),
            self.config.reverse_stream().num_channels(),
        );
        config.validate()?;
        if self.aecm.is_enabled() && rate == SPLIT_THRESHOLD_HZ {
            return Err(Error::BadSampleRate);
        }
        self.reconfigure(config)
    }

    pub(crate) fn set_num_channels(&mut self, input: usize, output: usize) -> Result<(), Error> {
        self.reconfigure(ProcessingConfig::new(
            self.config.sample_rate_hz(),
            input,
            output,
            self.config.reverse_stream().num_channels(),
        ))
    }

    pub(crate) fn set_num_reverse_channels(&mut self, channels: usize) -> Result<(), Error> {
        self.reconfigure(ProcessingConfig::new(
            self.config.sample_rate_hz(),
            self.config.input_stream().num_channels(),
            self.config.output_stream().num_channels(),
            channels,
        ))
    }

    fn update_submodule_states(&mut self) -> bool {
        self.submodules.update(EnabledSubmodules {
            high_pass_filter: self.hpf.is_enabled(),
            gain_control: self.agc.is_enabled(),
            echo_cancellation: self.aec.is_enabled(),
            echo_control_mobile: self.aecm.is_enabled(),
            noise_suppression: self.ns.is_enabled(),
            voice_detection: self.vad.is_enabled(),
            level_estimator: self.level.is_enabled(),
        })
    }

    // ─── Echo mode ───────────────────────────────────────────────────

    pub(crate) fn echo_mode(&self) -> EchoMode {
        if self.aec.is_enabled() {
            EchoMode::Wideband
        } else if self.aecm.is_enabled() {
            EchoMode::Mobile
        } else {
            EchoMode::Off
        }
    }

    pub(crate) fn enable_echo_cancellation(&mut self, enable: bool) -> Result<(), Error> {
        if enable && self.aecm.is_enabled() {
            return Err(Error::BadParameter);
        }
        self.aec.set_enabled(enable, &self.config)
    }

    /// The mobile canceller runs at 8 and 16 kHz only; the rate is checked
    /// before the exclusion with the wideband canceller.
    pub(crate) fn enable_echo_control_mobile(&mut self, enable: bool) -> Result<(), Error> {
        if enable {
            if self.config.sample_rate_hz() == SPLIT_THRESHOLD_HZ {
                return Err(Error::BadSampleRate);
            }
            if self.aec.is_enabled() {
                return Err(Error::BadParameter);
            }
        }
        self.aecm.set_enabled(enable, &self.config)
    }

    // ─── Stream parameters ───────────────────────────────────────────

    pub(crate) fn set_stream_delay_ms(&mut self, delay_ms: i32) -> Result<(), Error> {
        self.params.set_delay_ms(delay_ms, self.delay_offset_ms)
    }

    pub(crate) fn stream_delay_ms(&self) -> i32 {
        self.params.delay_ms()
    }

    pub(crate) fn set_delay_offset_ms(&mut self, offset_ms: i32) {
        self.delay_offset_ms = offset_ms;
    }

    pub(crate) fn delay_offset_ms(&self) -> i32 {
        self.delay_offset_ms
    }

    pub(crate) fn set_stream_drift_samples(&mut self, drift: i32) {
        self.params.set_drift_samples(drift);
    }

    pub(crate) fn stream_drift_samples(&self) -> i32 {
        self.params.drift_samples()
    }

    pub(crate) fn set_stream_analog_level(&mut self, level: i32) -> Result<(), Error> {
        // A rejected level leaves the frame without one.
        self.params.set_analog_level_valid(false);
        self.agc.set_stream_analog_level(level)?;
        self.params.set_analog_level_valid(true);
        Ok(())
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            delay: self.aec.is_enabled() || self.aecm.is_enabled(),
            drift: self.aec.is_enabled() && self.aec.drift_compensation_enabled(),
            analog_level: self.agc.requires_analog_level(),
        }
    }

    // ─── Processing ──────────────────────────────────────────────────

    /// Run the capture chain on `frame` in place.
    ///
    /// Shape and stream-parameter checks happen before the frame is
    /// touched. A delay that had to be clamped is reported as
    /// [`Error::BadStreamParameterWarning`] after the frame is processed.
    pub(crate) fn process_stream(&mut self, frame: &mut AudioFrame) -> Result<(), Error> {
        self.config.input_stream().check_frame(frame)?;
        self.update_submodule_states();
        self.params.check(self.requirements())?;

        let num_output = self.config.output_stream().num_channels();
        let num_reverse = self.config.reverse_stream().num_channels();
        let delay_ms = self.params.delay_ms();
        let drift = self.params.drift_samples();

        let capture = &mut self.capture;
        capture.copy_from_interleaved_i16(frame, num_output);
        let split = self.config.input_stream().is_split()
            && self.submodules.capture_multi_band_processing_active();
        if split {
            capture.split_into_frequency_bands();
        }

        self.hpf.process_capture_audio(capture);
        self.agc.analyze_capture_audio(capture)?;
        self.aec
            .process_capture_stream(capture, num_reverse, delay_ms, drift)?;
        if self.submodules.low_pass_reference_required() {
            capture.copy_low_pass_reference();
        }
        self.ns.process_capture_audio(capture)?;
        self.aecm
            .process_capture_stream(capture, num_reverse, delay_ms)?;
        let has_voice = self.vad.process_capture_audio(capture)?;
        let has_echo = self.aec.stream_has_echo();
        self.agc.process_capture_audio(capture, has_echo)?;

        if split {
            capture.merge_frequency_bands();
        }
        capture.copy_to_interleaved_i16(frame);
        self.level.process_stream(frame);

        if let Some(voice) = has_voice {
            frame.vad_activity = if voice {
                VadActivity::Active
            } else {
                VadActivity::Passive
            };
        }
        self.update_stats(has_voice.unwrap_or(false));

        let clamped = self.params.delay_clamped();
        self.params.clear();
        self.vad.end_frame();
        if clamped {
            return Err(Error::BadStreamParameterWarning);
        }
        Ok(())
    }

    fn update_stats(&mut self, has_voice: bool) {
        let mut stats = AudioProcessingStats {
            has_echo: self.aec.stream_has_echo(),
            has_voice,
            saturated: self.agc.stream_is_saturated(),
            ..AudioProcessingStats::default()
        };
        if let Ok(metrics) = self.aec.metrics() {
            stats.set_echo_metrics(&metrics);
        }
        self.stats = stats;
    }

    /// Feed a render frame to the echo cancellers. The frame is read only.
    ///
    /// The frame may carry more channels than configured; they are mixed
    /// down.
    pub(crate) fn analyze_reverse_stream(&mut self, frame: &AudioFrame) -> Result<(), Error> {
        let reverse = *self.config.reverse_stream();
        if frame.sample_rate_hz != reverse.sample_rate_hz() {
            return Err(Error::BadSampleRate);
        }
        if frame.num_channels < reverse.num_channels() || frame.num_channels > MAX_CHANNELS {
            return Err(Error::BadNumberChannels);
        }
        StreamConfig::new(frame.sample_rate_hz, frame.num_channels).check_frame(frame)?;
        self.update_submodule_states();

        self.render
            .copy_from_interleaved_i16(frame, reverse.num_channels());
        if reverse.is_split() && self.submodules.render_multi_band_processing_active() {
            self.render.split_into_frequency_bands();
        }
        self.aec.analyze_reverse_stream(&self.render)?;
        self.aecm.analyze_reverse_stream(&self.render)?;
        Ok(())
    }

    // ─── Configuration snapshot ──────────────────────────────────────

    /// Apply a full settings snapshot.
    ///
    /// The echo mode is checked first. Components being switched off go
    /// first, then settings are applied, then components are switched on,
    /// so the echo canceller exclusion holds throughout.
    pub(crate) fn apply_config(&mut self, config: &Config) -> Result<(), Error> {
        let mode = config.echo_mode().ok_or(Error::BadParameter)?;
        if mode == EchoMode::Mobile && self.config.sample_rate_hz() == SPLIT_THRESHOLD_HZ {
            return Err(Error::BadSampleRate);
        }
        if cfg!(not(feature = "level-estimator")) && config.level_estimator.enabled {
            return Err(Error::UnsupportedComponent);
        }

        if !config.echo_cancellation.enabled {
            self.aec.set_enabled(false, &self.config)?;
        }
        if !config.echo_control_mobile.enabled {
            self.aecm.set_enabled(false, &self.config)?;
        }
        if !config.gain_control.enabled {
            self.agc.set_enabled(false, &self.config)?;
        }
        if !config.noise_suppression.enabled {
            self.ns.set_enabled(false, &self.config)?;
        }

        self.aec.apply_settings(&config.echo_cancellation)?;
        self.aecm.apply_settings(&config.echo_control_mobile);
        self.agc.apply_settings(&config.gain_control)?;
        self.ns.set_level(config.noise_suppression.level)?;
        self.vad.apply_settings(&config.voice_detection)?;

        self.enable_echo_cancellation(config.echo_cancellation.enabled)?;
        self.enable_echo_control_mobile(config.echo_control_mobile.enabled)?;
        self.agc.set_enabled(config.gain_control.enabled, &self.config)?;
        self.ns.set_enabled(config.noise_suppression.enabled, &self.config)?;
        self.hpf.set_enabled(config.high_pass_filter.enabled, &self.config);
        self.vad.set_enabled(config.voice_detection.enabled, &self.config);
        self.level.set_enabled(config.level_estimator.enabled);

        if self.update_submodule_states() {
            tracing::debug!(mode = ?self.echo_mode(), "component set changed");
        }
        Ok(())
    }

    pub(crate) fn config(&self) -> Config {
        Config {
            echo_cancellation: self.aec.config(),
            echo_control_mobile: self.aecm.config(),
            gain_control: self.agc.config(),
            noise_suppression: self.ns.config(),
            high_pass_filter: self.hpf.config(),
            voice_detection: self.vad.config(),
            level_estimator: self.level.config(),
        }
    }

    pub(crate) fn statistics(&self) -> AudioProcessingStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_frame_channel_rules() {
        let mut apm = AudioProcessingImpl::new();
        apm.set_num_reverse_channels(2).unwrap();
        assert_eq!(
            apm.analyze_reverse_stream(&AudioFrame::new(16000, 1)),
            Err(Error::BadNumberChannels)
        );
        assert_eq!(apm.analyze_reverse_stream(&AudioFrame::new(16000, 2)), Ok(()));
        assert_eq!(
            apm.analyze_reverse_stream(&AudioFrame::new(8000, 2)),
            Err(Error::BadSampleRate)
        );
        let short = AudioFrame::from_interleaved(16000, 2, vec![0; 100]);
        assert_eq!(apm.analyze_reverse_stream(&short), Err(Error::BadDataLength));
    }

    #[test]
    fn stereo_reverse_is_mixed_to_mono() {
        let mut apm = AudioProcessingImpl::new();
        apm.enable_echo_cancellation(true).unwrap();
        assert_eq!(apm.analyze_reverse_stream(&AudioFrame::new(16000, 2)), Ok(()));
    }

    #[test]
    fn output_channels_follow_configuration() {
        let mut apm = AudioProcessingImpl::new();
        apm.set_num_channels(2, 1).unwrap();
        let mut frame = AudioFrame::from_interleaved(
            16000,
            2,
            (0..320).map(|i| if i % 2 == 0 { 100 } else { 300 }).collect(),
        );
        apm.process_stream(&mut frame).unwrap();
        assert_eq!(frame.num_channels, 1);
        assert_eq!(frame.samples_per_channel, 160);
        assert!(frame.data.iter().all(|&s| s == 200));
    }

    #[test]
    fn failed_precondition_leaves_frame_untouched() {
        let mut apm = AudioProcessingImpl::new();
        apm.set_num_channels(2, 1).unwrap();
        apm.enable_echo_cancellation(true).unwrap();
        let mut frame = AudioFrame::from_interleaved(16000, 2, vec![7; 320]);
        assert_eq!(apm.process_stream(&mut frame), Err(Error::StreamParameterNotSet));
        assert_eq!(frame.num_channels, 2);
        assert!(frame.data.iter().all(|&s| s == 7));
    }

    #[test]
    fn clamped_delay_warns_after_processing() {
        let mut apm = AudioProcessingImpl::new();
        apm.enable_echo_cancellation(true).unwrap();
        assert_eq!(
            apm.set_stream_delay_ms(800),
            Err(Error::BadStreamParameterWarning)
        );
        assert_eq!(apm.stream_delay_ms(), 500);
        let mut frame = AudioFrame::new(16000, 1);
        assert_eq!(
            apm.process_stream(&mut frame),
            Err(Error::BadStreamParameterWarning)
        );
        // The delay has been consumed.
        assert_eq!(apm.process_stream(&mut frame), Err(Error::StreamParameterNotSet));
    }

    #[test]
    fn rejected_analog_level_does_not_count_as_set() {
        let mut apm = AudioProcessingImpl::new();
        let config = apm.config;
        apm.agc.set_enabled(true, &config).unwrap();
        apm.agc.set_analog_level_limits(10, 100).unwrap();
        let mut frame = AudioFrame::new(16000, 1);

        assert_eq!(apm.set_stream_analog_level(50), Ok(()));
        assert_eq!(apm.set_stream_analog_level(500), Err(Error::BadParameter));
        assert_eq!(apm.process_stream(&mut frame), Err(Error::StreamParameterNotSet));

        apm.set_stream_analog_level(60).unwrap();
        assert_eq!(apm.process_stream(&mut frame), Ok(()));
    }

    #[test]
    fn delay_offset_is_added() {
        let mut apm = AudioProcessingImpl::new();
        apm.set_delay_offset_ms(40);
        assert_eq!(apm.set_stream_delay_ms(60), Ok(()));
        assert_eq!(apm.stream_delay_ms(), 100);
        assert_eq!(apm.set_stream_delay_ms(-1), Err(Error::BadParameter));
    }

    #[test]
    fn apply_config_round_trips() {
        let mut apm = AudioProcessingImpl::new();
        let mut config = Config::default();
        config.echo_control_mobile.enabled = true;
        config.noise_suppression.enabled = true;
        config.gain_control.enabled = true;
        config.gain_control.target_level_dbfs = 6;
        config.voice_detection.enabled = true;
        config.high_pass_filter.enabled = true;
        apm.apply_config(&config).unwrap();
        assert_eq!(apm.config(), config);
        assert_eq!(apm.echo_mode(), EchoMode::Mobile);

        // Swap canceller in one snapshot.
        config.echo_control_mobile.enabled = false;
        config.echo_cancellation.enabled = true;
        apm.apply_config(&config).unwrap();
        assert_eq!(apm.echo_mode(), EchoMode::Wideband);
    }

    #[test]
    fn apply_config_rejects_both_cancellers() {
        let mut apm = AudioProcessingImpl::new();
        let mut config = Config::default();
        config.echo_cancellation.enabled = true;
        config.echo_control_mobile.enabled = true;
        assert_eq!(apm.apply_config(&config), Err(Error::BadParameter));
        assert_eq!(apm.echo_mode(), EchoMode::Off);
    }

    #[test]
    fn mobile_canceller_blocks_32khz() {
        let mut apm = AudioProcessingImpl::new();
        apm.enable_echo_control_mobile(true).unwrap();
        assert_eq!(apm.set_sample_rate(32000), Err(Error::BadSampleRate));
        assert_eq!(apm.config.sample_rate_hz(), 16000);
        assert_eq!(apm.set_sample_rate(8000), Ok(()));
    }

    #[test]
    fn full_chain_runs_at_every_rate() {
        for rate in [8000u32, 16000, 32000] {
            let mut apm = AudioProcessingImpl::new();
            apm.set_sample_rate(rate).unwrap();
            apm.enable_echo_cancellation(true).unwrap();
            let mut config = apm.config();
            config.noise_suppression.enabled = true;
            config.high_pass_filter.enabled = true;
            config.voice_detection.enabled = true;
            config.gain_control.enabled = true;
            config.level_estimator.enabled = true;
            apm.apply_config(&config).unwrap();

            let n = rate as usize / 100;
            for k in 0..20 {
                let far: Vec<i16> = (0..n).map(|i| ((i * 37 + k) % 200) as i16 - 100).collect();
                apm.analyze_reverse_stream(&AudioFrame::from_interleaved(rate, 1, far))
                    .unwrap();
                let mut near = AudioFrame::from_interleaved(rate, 1, vec![50; n]);
                apm.set_stream_delay_ms(20).unwrap();
                apm.set_stream_analog_level(128).unwrap();
                apm.process_stream(&mut near).unwrap();
                assert_eq!(near.sample_rate_hz, rate);
                assert_eq!(near.samples_per_channel, n);
                assert_ne!(near.vad_activity, VadActivity::Unknown);
            }
        }
    }
}
