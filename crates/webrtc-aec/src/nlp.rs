//! Coherence-driven nonlinear processor.
//!
//! Works on sqrt-Hann windowed 128-point spectra of two consecutive blocks
//! and reconstructs by overlap-add, so its output lags its input by one
//! block. The per-bin gain is the smaller of the near/error coherence and
//! one minus the near/far coherence, raised to the level's overdrive.
//! Suppressed bins are filled with comfort noise at the near-end noise
//! floor.
//!
//! C++ source: `webrtc/modules/audio_processing/aec/aec_core.c`
//!             (`NonLinearProcessing`, `ComfortNoise`)

use derive_more::Debug;
use webrtc_common_audio::real_fft::RealFft;

use crate::config::{BLOCK_LEN, FFT_LEN, NUM_BINS, NUM_PARTITIONS};
use crate::filter::Spectrum;

/// Smoothing of the auto and cross power spectra.
const PSD_SMOOTHING: f32 = 0.9;
/// Bins averaged for the echo decision (roughly 300 Hz to 3.4 kHz at 16 kHz).
const PREF_BAND: std::ops::Range<usize> = 3..28;
/// Mean far-end power per bin above which the far end counts as active.
pub const FAR_ACTIVE_POWER: f32 = 6.0e4;
/// Echo is declared when the mean near/far coherence exceeds this.
const ECHO_COHERENCE: f32 = 0.25;
/// Per-block growth factor of the noise floor.
const NOISE_FLOOR_RAMP: f32 = 1.0005;
/// Initial noise floor, a white signal of amplitude 10 under the window.
const NOISE_FLOOR_INIT: f32 = 6400.0;
const NOISE_FLOOR_MIN: f32 = 1.0;

/// Result of processing one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NlpOutput {
    /// Mean gain over the upper half of the band, applied to the high band.
    pub high_band_gain: f32,
    /// Whether echo was detected in the block.
    pub echo: bool,
}

fn sqrt_hann() -> [f32; FFT_LEN] {
    std::array::from_fn(|n| {
        (0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / FFT_LEN as f32).cos())).sqrt()
    })
}

#[derive(Debug)]
pub struct NonlinearProcessor {
    #[debug(skip)]
    fft: RealFft,
    #[debug(skip)]
    window: [f32; FFT_LEN],

    prev_near: [f32; BLOCK_LEN],
    prev_error: [f32; BLOCK_LEN],
    prev_far: [f32; BLOCK_LEN],
    /// Windowed far spectra, `far[far_position]` newest.
    far: Vec<Spectrum>,
    far_position: usize,

    near_spectrum: Spectrum,
    s_d: [f32; NUM_BINS],
    s_e: [f32; NUM_BINS],
    s_x: [f32; NUM_BINS],
    s_de: Spectrum,
    s_xd: Spectrum,
    noise_floor: [f32; NUM_BINS],
    overlap: [f32; BLOCK_LEN],
    seed: u32,

    #[debug(skip)]
    scratch: [f32; FFT_LEN],
}

impl Default for NonlinearProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl NonlinearProcessor {
    pub fn new() -> Self {
        Self {
            fft: RealFft::new(FFT_LEN),
            window: sqrt_hann(),
            prev_near: [0.0; BLOCK_LEN],
            prev_error: [0.0; BLOCK_LEN],
            prev_far: [0.0; BLOCK_LEN],
            far: vec![Spectrum::default(); NUM_PARTITIONS],
            far_position: 0,
            near_spectrum: Spectrum::default(),
            s_d: [0.0; NUM_BINS],
            s_e: [0.0; NUM_BINS],
            s_x: [0.0; NUM_BINS],
            s_de: Spectrum::default(),
            s_xd: Spectrum::default(),
            noise_floor: [NOISE_FLOOR_INIT; NUM_BINS],
            overlap: [0.0; BLOCK_LEN],
            seed: 777,
            scratch: [0.0; FFT_LEN],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn windowed_spectrum(
        &mut self,
        prev: &[f32; BLOCK_LEN],
        cur: &[f32; BLOCK_LEN],
        out: &mut Spectrum,
    ) {
        for (i, s) in self.scratch.iter_mut().enumerate() {
            let v = if i < BLOCK_LEN { prev[i] } else { cur[i - BLOCK_LEN] };
            *s = v * self.window[i];
        }
        self.fft.forward(&self.scratch, &mut out.re, &mut out.im);
    }

    /// Push one far-end block into the windowed history.
    pub fn push_far(&mut self, block: &[f32; BLOCK_LEN]) {
        self.far_position = (self.far_position + NUM_PARTITIONS - 1) % NUM_PARTITIONS;
        let prev = self.prev_far;
        let mut spectrum = std::mem::take(&mut self.far[self.far_position]);
        self.windowed_spectrum(&prev, block, &mut spectrum);
        self.far[self.far_position] = spectrum;
        self.prev_far = *block;
    }

    /// Windowed spectrum of the most recent near block.
    pub fn near_spectrum(&self) -> &Spectrum {
        &self.near_spectrum
    }

    /// Suppress residual echo in `error`, writing the block lagging by one
    /// block into `output`. `delay_partition` selects the far spectrum
    /// aligned with the echo, `overdrive` sets the aggressiveness.
    pub fn process(
        &mut self,
        near: &[f32; BLOCK_LEN],
        error: &[f32; BLOCK_LEN],
        delay_partition: usize,
        overdrive: f32,
        output: &mut [f32; BLOCK_LEN],
    ) -> NlpOutput {
        let prev_near = self.prev_near;
        let prev_error = self.prev_error;
        let mut d = std::mem::take(&mut self.near_spectrum);
        self.windowed_spectrum(&prev_near, near, &mut d);
        let mut e = Spectrum::default();
        self.windowed_spectrum(&prev_error, error, &mut e);
        self.prev_near = *near;
        self.prev_error = *error;

        let far_index = (self.far_position + delay_partition.min(NUM_PARTITIONS - 1)) % NUM_PARTITIONS;
        let x = &self.far[far_index];

        let a = PSD_SMOOTHING;
        for k in 0..NUM_BINS {
            let d2 = d.re[k] * d.re[k] + d.im[k] * d.im[k];
            let e2 = e.re[k] * e.re[k] + e.im[k] * e.im[k];
            let x2 = x.re[k] * x.re[k] + x.im[k] * x.im[k];
            self.s_d[k] = a * self.s_d[k] + (1.0 - a) * d2;
            self.s_e[k] = a * self.s_e[k] + (1.0 - a) * e2;
            // Keep the far PSD from collapsing during far-end silence.
            self.s_x[k] = a * self.s_x[k] + (1.0 - a) * x2.max(1.0);

            // D * conj(E)
            let de_re = d.re[k] * e.re[k] + d.im[k] * e.im[k];
            let de_im = d.im[k] * e.re[k] - d.re[k] * e.im[k];
            self.s_de.re[k] = a * self.s_de.re[k] + (1.0 - a) * de_re;
            self.s_de.im[k] = a * self.s_de.im[k] + (1.0 - a) * de_im;
            // X * conj(D)
            let xd_re = x.re[k] * d.re[k] + x.im[k] * d.im[k];
            let xd_im = x.im[k] * d.re[k] - x.re[k] * d.im[k];
            self.s_xd.re[k] = a * self.s_xd.re[k] + (1.0 - a) * xd_re;
            self.s_xd.im[k] = a * self.s_xd.im[k] + (1.0 - a) * xd_im;

            self.noise_floor[k] = self.s_d[k]
                .min(self.noise_floor[k] * NOISE_FLOOR_RAMP)
                .max(NOISE_FLOOR_MIN);
        }

        let sum_d: f32 = self.s_d.iter().sum();
        let sum_e: f32 = self.s_e.iter().sum();
        // A diverged filter adds echo; fall back to the unfiltered near end.
        let diverged = sum_e > 1.05 * sum_d;
        if diverged {
            e = d.clone();
        }

        let far_power = self.s_x[PREF_BAND].iter().sum::<f32>() / PREF_BAND.len() as f32;
        let far_active = far_power > FAR_ACTIVE_POWER;

        let mut gain = [1.0f32; NUM_BINS];
        let mut coh_xd_sum = 0.0;
        if far_active {
            for k in 0..NUM_BINS {
                let coh_de = if diverged {
                    1.0
                } else {
                    (self.s_de.re[k].powi(2) + self.s_de.im[k].powi(2))
                        / (self.s_d[k] * self.s_e[k] + 1e-10)
                };
                let coh_xd = (self.s_xd.re[k].powi(2) + self.s_xd.im[k].powi(2))
                    / (self.s_x[k] * self.s_d[k] + 1e-10);
                if PREF_BAND.contains(&k) {
                    coh_xd_sum += coh_xd.min(1.0);
                }
                let h_nl = coh_de.min(1.0 - coh_xd).clamp(0.0, 1.0);
                gain[k] = h_nl.powf(overdrive);
            }
        }
        let echo = far_active && coh_xd_sum / PREF_BAND.len() as f32 > ECHO_COHERENCE;

        for k in 0..NUM_BINS {
            e.re[k] *= gain[k];
            e.im[k] *= gain[k];
        }
        if far_active {
            self.add_comfort_noise(&gain, &mut e);
        }

        self.fft.inverse(&e.re, &e.im, &mut self.scratch);
        for (i, out) in output.iter_mut().enumerate() {
            *out = self.overlap[i] + self.scratch[i] * self.window[i];
            self.overlap[i] = self.scratch[BLOCK_LEN + i] * self.window[BLOCK_LEN + i];
        }
        self.near_spectrum = d;

        let upper = &gain[NUM_BINS / 2..];
        NlpOutput {
            high_band_gain: upper.iter().sum::<f32>() / upper.len() as f32,
            echo,
        }
    }

    fn add_comfort_noise(&mut self, gain: &[f32; NUM_BINS], spectrum: &mut Spectrum) {
        for k in 1..NUM_BINS - 1 {
            self.seed = self.seed.wrapping_mul(69069).wrapping_add(1) & 0x7fff_ffff;
            let phase = 2.0 * std::f32::consts::PI * (self.seed >> 8) as f32 / (1u32 << 23) as f32;
            let amplitude = (self.noise_floor[k] * (1.0 - gain[k] * gain[k]).max(0.0)).sqrt();
            spectrum.re[k] += amplitude * phase.cos();
            spectrum.im[k] += amplitude * phase.sin();
        }
    }
}
