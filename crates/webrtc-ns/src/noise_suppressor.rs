//! Top-level noise suppressor pipeline.
//!
//! Combines windowed FFT analysis, quantile noise estimation, speech
//! probability estimation, Wiener filtering, and overlap-add synthesis.
//! Works on int16 blocks of 80 samples (8 kHz) or 160 samples (16 kHz and
//! the low band of 32 kHz); the optional high band is delayed to stay
//! aligned with the low band and scaled by the low band's upper-bin gain.
//!
//! C++ source: `webrtc/modules/audio_processing/ns/noise_suppression.c`,
//!             `webrtc/modules/audio_processing/ns/ns_core.c`

use derive_more::Debug;
use webrtc_common_audio::audio_util::float_s16_to_s16;
use webrtc_common_audio::real_fft::RealFft;

use crate::config::{FrameGeometry, NsConfig, SuppressionLevel};
use crate::quantile_noise_estimator::QuantileNoiseEstimator;
use crate::speech_probability_estimator::SpeechProbabilityEstimator;
use crate::suppression_params::SuppressionParams;
use crate::wiener_filter::WienerFilter;

/// Errors returned by the noise suppressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NsError {
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("frame of {actual} samples, expected {expected}")]
    BadFrameLength { expected: usize, actual: usize },
}

/// Rising half of the analysis/synthesis window.
///
/// `w[i] = sin(pi * i / (2 * overlap))`. Applied to both ends of the
/// extended frame; the middle `frame_size - overlap + 1` samples are left
/// unwindowed, so squared windows of consecutive frames sum to one.
fn window_ramp(overlap: usize) -> Vec<f32> {
    (0..overlap)
        .map(|i| (std::f32::consts::PI * i as f32 / (2 * overlap) as f32).sin())
        .collect()
}

fn apply_window(x: &mut [f32], ramp: &[f32], frame_size: usize) {
    let overlap = ramp.len();
    for (x_i, &w) in x[..overlap].iter_mut().zip(ramp) {
        *x_i *= w;
    }
    for (x_i, &w) in x[frame_size + 1..].iter_mut().zip(ramp.iter().rev()) {
        *x_i *= w;
    }
}

/// Shift `memory` and append `frame` to form the extended frame.
fn form_extended_frame(frame: &[f32], memory: &mut [f32], extended: &mut [f32]) {
    let m = memory.len();
    extended[..m].copy_from_slice(memory);
    extended[m..].copy_from_slice(frame);
    memory.copy_from_slice(&extended[extended.len() - m..]);
}

fn overlap_and_add(extended: &[f32], overlap_memory: &mut [f32], output: &mut [f32]) {
    let overlap = overlap_memory.len();
    let frame_size = output.len();
    for i in 0..overlap {
        output[i] = overlap_memory[i] + extended[i];
    }
    output[overlap..].copy_from_slice(&extended[overlap..frame_size]);
    overlap_memory.copy_from_slice(&extended[frame_size..]);
}

fn magnitude_spectrum(re: &[f32], im: &[f32], magnitude: &mut [f32]) {
    for ((m, &r), &i) in magnitude.iter_mut().zip(re).zip(im) {
        *m = (r * r + i * i).sqrt() + 1.0;
    }
}

/// Single-channel noise suppressor.
///
/// Call [`analyze`](Self::analyze) before [`process`](Self::process) for
/// each block.
///
/// # Example
///
/// ```
/// use webrtc_ns::config::NsConfig;
/// use webrtc_ns::noise_suppressor::NoiseSuppressor;
///
/// let mut ns = NoiseSuppressor::new(NsConfig::default()).unwrap();
/// let mut frame = [0i16; 160];
/// ns.analyze(&frame).unwrap();
/// ns.process(&mut frame, None).unwrap();
/// ```
#[derive(Debug)]
pub struct NoiseSuppressor {
    geometry: FrameGeometry,
    suppression_params: &'static SuppressionParams,
    fft: RealFft,
    window: Vec<f32>,
    num_analyzed_frames: i32,

    noise_estimator: QuantileNoiseEstimator,
    speech_probability: SpeechProbabilityEstimator,
    wiener_filter: WienerFilter,
    noise_spectrum: Vec<f32>,
    prev_noise_spectrum: Vec<f32>,
    prev_analysis_spectrum: Vec<f32>,

    analysis_memory: Vec<f32>,
    process_memory: Vec<f32>,
    synthesis_memory: Vec<f32>,
    high_band_delay: Vec<i16>,

    // Scratch.
    #[debug(skip)]
    extended: Vec<f32>,
    #[debug(skip)]
    re: Vec<f32>,
    #[debug(skip)]
    im: Vec<f32>,
    #[debug(skip)]
    spectrum: Vec<f32>,
    #[debug(skip)]
    frame_f32: Vec<f32>,
}

impl NoiseSuppressor {
    /// Create a suppressor for `config.sample_rate_hz`.
    pub fn new(config: NsConfig) -> Result<Self, NsError> {
        let geometry = FrameGeometry::for_sample_rate(config.sample_rate_hz)
            .ok_or(NsError::UnsupportedSampleRate(config.sample_rate_hz))?;
        let suppression_params = SuppressionParams::for_level(config.target_level);
        let bins = geometry.num_bins();
        let overlap = geometry.overlap();
        tracing::debug!(
            sample_rate_hz = config.sample_rate_hz,
            level = ?config.target_level,
            "creating noise suppressor"
        );
        Ok(Self {
            geometry,
            suppression_params,
            fft: RealFft::new(geometry.fft_size),
            window: window_ramp(overlap),
            num_analyzed_frames: -1,
            noise_estimator: QuantileNoiseEstimator::new(bins),
            speech_probability: SpeechProbabilityEstimator::new(bins),
            wiener_filter: WienerFilter::new(suppression_params, bins),
            noise_spectrum: vec![0.0; bins],
            prev_noise_spectrum: vec![0.0; bins],
            prev_analysis_spectrum: vec![1.0; bins],
            analysis_memory: vec![0.0; overlap],
            process_memory: vec![0.0; overlap],
            synthesis_memory: vec![0.0; overlap],
            high_band_delay: vec![0; overlap],
            extended: vec![0.0; geometry.fft_size],
            re: vec![0.0; bins],
            im: vec![0.0; bins],
            spectrum: vec![0.0; bins],
            frame_f32: vec![0.0; geometry.frame_size],
        })
    }

    /// Create a suppressor at 16 kHz with the given level.
    pub fn with_level(level: SuppressionLevel) -> Result<Self, NsError> {
        Self::new(NsConfig {
            target_level: level,
            ..NsConfig::default()
        })
    }

    /// Samples per block.
    pub fn frame_size(&self) -> usize {
        self.geometry.frame_size
    }

    /// Smoothed prior probability that the current block holds speech.
    pub fn speech_probability(&self) -> f32 {
        self.speech_probability.prior_probability()
    }

    fn check_length(&self, len: usize) -> Result<(), NsError> {
        if len != self.geometry.frame_size {
            return Err(NsError::BadFrameLength {
                expected: self.geometry.frame_size,
                actual: len,
            });
        }
        Ok(())
    }

    /// Update the noise estimate from an unprocessed block.
    pub fn analyze(&mut self, frame: &[i16]) -> Result<(), NsError> {
        self.check_length(frame.len())?;

        let energy: f32 = self.analysis_memory.iter().map(|v| v * v).sum::<f32>()
            + frame.iter().map(|&s| f32::from(s) * f32::from(s)).sum::<f32>();
        if energy == 0.0 {
            // Keep the analysis memory moving so the next block lines up.
            self.analysis_memory.fill(0.0);
            return Ok(());
        }

        self.num_analyzed_frames = (self.num_analyzed_frames + 1).max(0);

        for (d, &s) in self.frame_f32.iter_mut().zip(frame) {
            *d = f32::from(s);
        }
        form_extended_frame(&self.frame_f32, &mut self.analysis_memory, &mut self.extended);
        apply_window(&mut self.extended, &self.window, self.geometry.frame_size);
        self.fft.forward(&self.extended, &mut self.re, &mut self.im);
        magnitude_spectrum(&self.re, &self.im, &mut self.spectrum);

        self.prev_noise_spectrum.copy_from_slice(&self.noise_spectrum);
        self.noise_estimator
            .estimate(&self.spectrum, &mut self.noise_spectrum);

        let bins = self.spectrum.len();
        let mut prior_snr = vec![0.0f32; bins];
        let mut post_snr = vec![0.0f32; bins];
        let filter = self.wiener_filter.filter();
        for i in 0..bins {
            let prev = self.prev_analysis_spectrum[i] / (self.prev_noise_spectrum[i] + 0.0001)
                * filter[i];
            post_snr[i] = if self.spectrum[i] > self.noise_spectrum[i] {
                self.spectrum[i] / (self.noise_spectrum[i] + 0.0001) - 1.0
            } else {
                0.0
            };
            prior_snr[i] = 0.98 * prev + 0.02 * post_snr[i];
        }
        self.speech_probability.update(&prior_snr, &post_snr);
        self.prev_analysis_spectrum.copy_from_slice(&self.spectrum);
        Ok(())
    }

    /// Suppress noise in `frame` in place. `high_band`, when present, is
    /// delayed to match the low band and scaled by the upper-bin gain.
    pub fn process(
        &mut self,
        frame: &mut [i16],
        high_band: Option<&mut [i16]>,
    ) -> Result<(), NsError> {
        self.check_length(frame.len())?;
        if let Some(high) = high_band.as_deref() {
            self.check_length(high.len())?;
        }
        let frame_size = self.geometry.frame_size;

        for (d, &s) in self.frame_f32.iter_mut().zip(frame.iter()) {
            *d = f32::from(s);
        }
        form_extended_frame(&self.frame_f32, &mut self.process_memory, &mut self.extended);
        apply_window(&mut self.extended, &self.window, frame_size);
        let energy_before: f32 = self.extended.iter().map(|v| v * v).sum();

        self.fft.forward(&self.extended, &mut self.re, &mut self.im);
        magnitude_spectrum(&self.re, &self.im, &mut self.spectrum);

        self.wiener_filter.update(
            self.num_analyzed_frames,
            &self.noise_spectrum,
            &self.prev_noise_spectrum,
            &self.spectrum,
        );
        let filter = self.wiener_filter.filter();
        for ((r, i), &g) in self.re.iter_mut().zip(self.im.iter_mut()).zip(filter) {
            *r *= g;
            *i *= g;
        }
        self.fft.inverse(&self.re, &self.im, &mut self.extended);
        let energy_after: f32 = self.extended.iter().map(|v| v * v).sum();

        apply_window(&mut self.extended, &self.window, frame_size);
        let scale = self.wiener_filter.compute_overall_scaling_factor(
            self.num_analyzed_frames,
            self.speech_probability.prior_probability(),
            energy_before,
            energy_after,
        );
        for v in self.extended.iter_mut() {
            *v *= scale;
        }
        overlap_and_add(&self.extended, &mut self.synthesis_memory, &mut self.frame_f32);
        for (d, &v) in frame.iter_mut().zip(self.frame_f32.iter()) {
            *d = float_s16_to_s16(v);
        }

        if let Some(high) = high_band {
            let bins = self.spectrum.len();
            let gain = (self.wiener_filter.mean_gain(bins / 2..bins) * scale)
                .clamp(self.suppression_params.minimum_attenuating_gain, 1.0);
            self.process_high_band(high, gain);
        }
        Ok(())
    }

    fn process_high_band(&mut self, high: &mut [i16], gain: f32) {
        let delay = self.high_band_delay.len();
        let mut delayed = Vec::with_capacity(high.len());
        delayed.extend_from_slice(&self.high_band_delay);
        delayed.extend_from_slice(high);
        self.high_band_delay
            .copy_from_slice(&delayed[delayed.len() - delay..]);
        let n = high.len();
        for (d, &s) in high.iter_mut().zip(&delayed[..n]) {
            *d = float_s16_to_s16(f32::from(s) * gain);
        }
    }
}
