//! Echo canceller handle: far-end buffering, delay alignment, block
//! processing and the high band.
//!
//! C++ source: `webrtc/modules/audio_processing/aec/echo_cancellation.c`,
//!             `webrtc/modules/audio_processing/aec/aec_core.c`

use std::collections::VecDeque;

use derive_more::Debug;
use webrtc_common_audio::audio_util::float_s16_to_s16;
use webrtc_common_audio::delay_estimator::DelayEstimator;
use webrtc_common_audio::frame_blocker::{BlockFramer, FrameBlocker};
use webrtc_common_audio::ring_buffer::RingBuffer;

use crate::config::{
    AecConfig, BLOCK_LEN, DELAY_HISTORY_BLOCKS, MAX_DEVICE_SAMPLE_RATE_HZ,
    MIN_DEVICE_SAMPLE_RATE_HZ, NUM_BINS, NUM_PARTITIONS, frame_length,
};
use crate::error::AecError;
use crate::filter::{AdaptiveFilter, Spectrum};
use crate::metrics::{DelayHistogram, DelayMetrics, EchoMetrics, MetricsAccumulator};
use crate::nlp::NonlinearProcessor;
use crate::resampler::DriftResampler;

/// Frames processed before delay realignment is allowed.
const STARTUP_FRAMES: usize = 10;
/// Far-end lead kept ahead of the reported delay so the echo lands in the
/// early filter partitions.
const ALIGNMENT_MARGIN: usize = 2 * BLOCK_LEN;
/// Far-end buffer capacity in milliseconds.
const FAR_BUFFER_MS: usize = 1000;

/// Delay the high band sees: framer latency plus the NLP overlap.
const HIGH_BAND_DELAY: usize = 2 * BLOCK_LEN;

fn magnitude(spectrum: &Spectrum, out: &mut [f32; NUM_BINS]) {
    for ((m, &r), &i) in out.iter_mut().zip(&spectrum.re).zip(&spectrum.im) {
        *m = (r * r + i * i).sqrt();
    }
}

/// One echo canceller instance, for one near/far channel pair.
///
/// # Example
///
/// ```
/// use webrtc_aec::{AecConfig, EchoCanceller};
///
/// let mut aec = EchoCanceller::new(16000, AecConfig::default()).unwrap();
/// let far = [0i16; 160];
/// let mut near = [0i16; 160];
/// aec.buffer_far_end(&far).unwrap();
/// aec.process(&mut near, None, 40, 0).unwrap();
/// assert!(!aec.stream_has_echo());
/// ```
#[derive(Debug)]
pub struct EchoCanceller {
    config: AecConfig,
    sample_rate_hz: u32,
    split_rate_hz: u32,
    frame_len: usize,

    far_buffer: RingBuffer,
    resampler: DriftResampler,
    #[debug(skip)]
    resampled: Vec<f32>,
    blocker: FrameBlocker,
    framer: BlockFramer,
    filter: AdaptiveFilter,
    nlp: NonlinearProcessor,
    high_band_delay: VecDeque<f32>,
    high_band_gain: f32,

    metrics: MetricsAccumulator,
    delay_estimator: DelayEstimator,
    delay_histogram: DelayHistogram,

    frames_processed: usize,
    last_target: Option<usize>,
    stream_has_echo: bool,
}

impl EchoCanceller {
    /// Create a canceller for a processing rate of 8000, 16000 or 32000 Hz.
    /// At 32000 Hz the low and high bands are passed separately.
    pub fn new(sample_rate_hz: u32, config: AecConfig) -> Result<Self, AecError> {
        let frame_len =
            frame_length(sample_rate_hz).ok_or(AecError::UnsupportedSampleRate(sample_rate_hz))?;
        validate_config(&config)?;
        let split_rate_hz = sample_rate_hz.min(16000);
        tracing::debug!(sample_rate_hz, ?config, "creating echo canceller");
        Ok(Self {
            config,
            sample_rate_hz,
            split_rate_hz,
            frame_len,
            far_buffer: RingBuffer::new(split_rate_hz as usize * FAR_BUFFER_MS / 1000),
            resampler: DriftResampler::new(),
            resampled: Vec::with_capacity(2 * frame_len),
            blocker: FrameBlocker::new(BLOCK_LEN),
            framer: BlockFramer::new(BLOCK_LEN),
            filter: AdaptiveFilter::new(),
            nlp: NonlinearProcessor::new(),
            high_band_delay: std::iter::repeat_n(0.0, HIGH_BAND_DELAY).collect(),
            high_band_gain: 1.0,
            metrics: MetricsAccumulator::new(split_rate_hz),
            delay_estimator: DelayEstimator::new(DELAY_HISTORY_BLOCKS),
            delay_histogram: DelayHistogram::new(DELAY_HISTORY_BLOCKS, split_rate_hz),
            frames_processed: 0,
            last_target: None,
            stream_has_echo: false,
        })
    }

    /// Clear all adaptive state, keeping the configuration.
    pub fn reset(&mut self) {
        self.far_buffer.clear();
        self.resampler.reset();
        self.blocker.reset();
        self.framer.reset();
        self.filter.reset();
        self.nlp.reset();
        self.high_band_delay.iter_mut().for_each(|v| *v = 0.0);
        self.high_band_gain = 1.0;
        self.metrics.reset();
        self.delay_estimator.reset();
        self.delay_histogram.reset();
        self.frames_processed = 0;
        self.last_target = None;
        self.stream_has_echo = false;
    }

    pub fn config(&self) -> AecConfig {
        self.config
    }

    pub fn set_config(&mut self, config: AecConfig) -> Result<(), AecError> {
        validate_config(&config)?;
        if !config.delay_logging {
            self.delay_histogram.reset();
        }
        self.config = config;
        Ok(())
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Samples per band per 10 ms frame.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Buffer one far-end (low band) frame.
    pub fn buffer_far_end(&mut self, far: &[i16]) -> Result<(), AecError> {
        self.check_length(far.len())?;
        let far_f32: Vec<f32> = far.iter().map(|&s| f32::from(s)).collect();
        let dropped = if self.config.drift_compensation {
            self.resampled.clear();
            self.resampler.process(&far_f32, &mut self.resampled);
            self.far_buffer.write(&self.resampled)
        } else {
            self.far_buffer.write(&far_f32)
        };
        if dropped > 0 {
            tracing::warn!(dropped, "far-end buffer overflow; oldest samples dropped");
        }
        Ok(())
    }

    /// Cancel echo in one near-end frame.
    ///
    /// `near_high` is the upper band at 32 kHz. `delay_ms` is the reported
    /// render-to-capture delay; `drift_samples` is only used when drift
    /// compensation is enabled.
    pub fn process(
        &mut self,
        near_low: &mut [i16],
        near_high: Option<&mut [i16]>,
        delay_ms: i32,
        drift_samples: i32,
    ) -> Result<(), AecError> {
        self.check_length(near_low.len())?;
        if let Some(high) = near_high.as_deref() {
            self.check_length(high.len())?;
        }
        if delay_ms < 0 {
            return Err(AecError::BadDelay(delay_ms));
        }
        if self.config.drift_compensation {
            let device_frame_len = self.config.device_sample_rate_hz as usize / 100;
            if drift_samples.unsigned_abs() as usize > device_frame_len {
                return Err(AecError::BadDrift(drift_samples));
            }
            self.resampler.update_skew(drift_samples, device_frame_len);
        }

        self.align_far_end(delay_ms as usize);

        let near_f32: Vec<f32> = near_low.iter().map(|&s| f32::from(s)).collect();
        self.blocker.push_frame(&near_f32);

        let overdrive = self.config.suppression_level.overdrive();
        let mut echo_in_frame = false;
        let mut near = [0.0f32; BLOCK_LEN];
        let mut far = [0.0f32; BLOCK_LEN];
        let mut echo = [0.0f32; BLOCK_LEN];
        let mut error = [0.0f32; BLOCK_LEN];
        let mut output = [0.0f32; BLOCK_LEN];
        let mut far_magnitude = [0.0f32; NUM_BINS];
        let mut near_magnitude = [0.0f32; NUM_BINS];
        while self.blocker.next_block(&mut near) {
            if !self.far_buffer.read_block(&mut far) {
                tracing::trace!("far-end buffer underrun");
            }
            self.filter.push_far(&far);
            self.nlp.push_far(&far);

            self.filter.estimate(&mut echo);
            for i in 0..BLOCK_LEN {
                error[i] = near[i] - echo[i];
            }
            self.filter.adapt(&error);

            let delay_partition = peak_partition(&self.filter.partition_energies());
            let result = self
                .nlp
                .process(&near, &error, delay_partition, overdrive, &mut output);
            echo_in_frame |= result.echo;
            self.high_band_gain = result.high_band_gain;
            self.framer.push_block(&output);

            if self.config.metrics {
                self.metrics.add_block(&far, &near, &error, &output);
            }
            if self.config.delay_logging {
                magnitude(self.filter.latest_far(), &mut far_magnitude);
                magnitude(self.nlp.near_spectrum(), &mut near_magnitude);
                self.delay_estimator.add_far_spectrum(&far_magnitude);
                if let Some(delay) = self.delay_estimator.process_near_spectrum(&near_magnitude) {
                    self.delay_histogram.record(delay);
                }
            }
        }

        let mut out = vec![0.0f32; self.frame_len];
        self.framer.pop_frame(&mut out);
        for (dst, &v) in near_low.iter_mut().zip(&out) {
            *dst = float_s16_to_s16(v);
        }

        if let Some(high) = near_high {
            let gain = self.high_band_gain;
            for s in high.iter_mut() {
                self.high_band_delay.push_back(f32::from(*s));
                let delayed = self.high_band_delay.pop_front().unwrap_or(0.0);
                *s = float_s16_to_s16(delayed * gain);
            }
        }

        self.stream_has_echo = echo_in_frame;
        self.frames_processed += 1;
        Ok(())
    }

    /// Whether the last processed frame contained echo.
    pub fn stream_has_echo(&self) -> bool {
        self.stream_has_echo
    }

    pub fn metrics(&self) -> Result<EchoMetrics, AecError> {
        if !self.config.metrics {
            return Err(AecError::MetricsDisabled);
        }
        Ok(self.metrics.metrics())
    }

    /// Delay median and spread since the previous call.
    pub fn delay_metrics(&mut self) -> Result<DelayMetrics, AecError> {
        if !self.config.delay_logging {
            return Err(AecError::DelayLoggingDisabled);
        }
        Ok(self.delay_histogram.take_metrics())
    }

    fn check_length(&self, len: usize) -> Result<(), AecError> {
        if len != self.frame_len {
            return Err(AecError::BadFrameLength {
                expected: self.frame_len,
                actual: len,
            });
        }
        Ok(())
    }

    /// Move the far-end read cursor so that the buffered far end matches
    /// the reported delay.
    fn align_far_end(&mut self, delay_ms: usize) {
        let delay_samples = delay_ms * self.split_rate_hz as usize / 1000;
        let target = delay_samples
            .saturating_sub(ALIGNMENT_MARGIN)
            .max(self.frame_len)
            .min(self.far_buffer.capacity());
        if self.frames_processed < STARTUP_FRAMES {
            return;
        }
        let available = self.far_buffer.available_read();
        let delay_changed = self
            .last_target
            .is_none_or(|last| last.abs_diff(target) > BLOCK_LEN);
        let drifted = available.abs_diff(target) > 4 * BLOCK_LEN;
        if delay_changed || drifted {
            let moved = self
                .far_buffer
                .move_read_ptr(available as isize - target as isize);
            if self.last_target.is_some() && moved != 0 {
                tracing::warn!(available, target, moved, "realigning far-end buffer");
            }
            self.last_target = Some(target);
        }
    }
}

fn validate_config(config: &AecConfig) -> Result<(), AecError> {
    if !(MIN_DEVICE_SAMPLE_RATE_HZ..=MAX_DEVICE_SAMPLE_RATE_HZ)
        .contains(&config.device_sample_rate_hz)
    {
        return Err(AecError::BadDeviceSampleRate(config.device_sample_rate_hz));
    }
    Ok(())
}

fn peak_partition(energies: &[f32; NUM_PARTITIONS]) -> usize {
    let mut best = 0;
    for (i, &e) in energies.iter().enumerate() {
        if e > energies[best] {
            best = i;
        }
    }
    best
}
