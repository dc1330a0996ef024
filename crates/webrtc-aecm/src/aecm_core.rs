//! Block-level AECM core.
//!
//! Per 64-sample block: magnitude spectra of the far end and the noisy
//! near end, delay lookup in the far-end spectrum history, echo estimate
//! from the stored echo path, NLMS adaptation of a second (adaptive) echo
//! path that replaces the stored one when it fits better, and a Q14
//! suppression gain applied to the clean near-end spectrum.
//!
//! C++ source: `webrtc/modules/audio_processing/aecm/aecm_core.c`

use std::collections::VecDeque;

use derive_more::Debug;
use webrtc_common_audio::audio_util::float_s16_to_s16;
use webrtc_common_audio::delay_estimator::DelayEstimator;
use webrtc_common_audio::real_fft::RealFft;

use crate::config::{AecmConfig, MAX_DELAY_BLOCKS, PART_LEN, PART_LEN1, PART_LEN2};

/// Unity gain in Q14.
pub const ONE_Q14: u32 = 1 << 14;
/// Q format of the stored echo path.
pub const CHANNEL_Q: u32 = 8;
/// Q format of the adaptive echo path.
const CHANNEL_ADAPT_Q: u32 = 16;
/// NLMS step as a right shift (mu = 1/8).
const MU_SHIFT: u32 = 3;
/// Largest echo path gain, 4.0 in the adaptive Q format.
const MAX_CHANNEL_ADAPT: i64 = 4 << CHANNEL_ADAPT_Q;
/// Far-end bin magnitude below which a bin is not adapted.
const MIN_ADAPT_MAGNITUDE: i64 = 64;
/// Blocks over which the stored and adaptive paths are compared.
const MSE_BLOCKS: u32 = 16;
/// Far-end magnitude sum below which the far end is considered silent.
const FAR_ACTIVE_MAGNITUDE_SUM: u64 = 65 * 2000;
/// Per-block noise floor growth, Q15 (1.0005).
const NOISE_RAMP_Q15: u64 = 32_784;
const NOISE_FLOOR_INIT: u32 = 80;

/// Default echo path, Q8, falling from 0.625 at DC to 0.25 at Nyquist.
pub fn default_echo_path() -> [i16; PART_LEN1] {
    std::array::from_fn(|k| (160 - (k * 96) / PART_LEN) as i16)
}

fn sqrt_hann() -> [f32; PART_LEN2] {
    std::array::from_fn(|n| {
        (0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / PART_LEN2 as f32).cos())).sqrt()
    })
}

#[derive(Debug)]
pub struct AecmCore {
    #[debug(skip)]
    fft: RealFft,
    #[debug(skip)]
    window: [f32; PART_LEN2],

    prev_far: [f32; PART_LEN],
    prev_noisy: [f32; PART_LEN],
    prev_clean: [f32; PART_LEN],
    overlap: [f32; PART_LEN],

    /// Far-end magnitudes, newest first.
    #[debug(skip)]
    far_history: VecDeque<[u32; PART_LEN1]>,
    delay_estimator: DelayEstimator,
    delay_blocks: usize,

    channel_stored: [i16; PART_LEN1],
    channel_adapt: [i64; PART_LEN1],
    mse_stored: u64,
    mse_adapt: u64,
    mse_blocks: u32,

    noise_floor: [u32; PART_LEN1],
    seed: u32,

    #[debug(skip)]
    re: [f32; PART_LEN1],
    #[debug(skip)]
    im: [f32; PART_LEN1],
    #[debug(skip)]
    scratch: [f32; PART_LEN2],
}

impl Default for AecmCore {
    fn default() -> Self {
        Self::new()
    }
}

impl AecmCore {
    pub fn new() -> Self {
        let channel = default_echo_path();
        Self {
            fft: RealFft::new(PART_LEN2),
            window: sqrt_hann(),
            prev_far: [0.0; PART_LEN],
            prev_noisy: [0.0; PART_LEN],
            prev_clean: [0.0; PART_LEN],
            overlap: [0.0; PART_LEN],
            far_history: VecDeque::from(vec![[0; PART_LEN1]; MAX_DELAY_BLOCKS]),
            delay_estimator: DelayEstimator::new(MAX_DELAY_BLOCKS),
            delay_blocks: 0,
            channel_stored: channel,
            channel_adapt: channel.map(|c| i64::from(c) << (CHANNEL_ADAPT_Q - CHANNEL_Q)),
            mse_stored: 0,
            mse_adapt: 0,
            mse_blocks: 0,
            noise_floor: [NOISE_FLOOR_INIT; PART_LEN1],
            seed: 0x5eed,
            re: [0.0; PART_LEN1],
            im: [0.0; PART_LEN1],
            scratch: [0.0; PART_LEN2],
        }
    }

    /// Clear all adaptive state. The echo path is kept.
    pub fn reset(&mut self) {
        let channel = self.channel_stored;
        *self = Self::new();
        self.set_echo_path(&channel);
    }

    pub fn echo_path(&self) -> [i16; PART_LEN1] {
        self.channel_stored
    }

    /// Replace both echo paths.
    pub fn set_echo_path(&mut self, path: &[i16; PART_LEN1]) {
        self.channel_stored = *path;
        self.channel_adapt = path.map(|c| i64::from(c) << (CHANNEL_ADAPT_Q - CHANNEL_Q));
        self.mse_stored = 0;
        self.mse_adapt = 0;
        self.mse_blocks = 0;
    }

    /// Far-end delay, in blocks, used for the last block.
    pub fn delay_blocks(&self) -> usize {
        self.delay_blocks
    }

    fn windowed_fft(&mut self, prev: &[f32; PART_LEN], cur: &[f32; PART_LEN]) {
        for (i, s) in self.scratch.iter_mut().enumerate() {
            let v = if i < PART_LEN { prev[i] } else { cur[i - PART_LEN] };
            *s = v * self.window[i];
        }
        self.fft.forward(&self.scratch, &mut self.re, &mut self.im);
    }

    fn magnitudes(&self) -> [u32; PART_LEN1] {
        std::array::from_fn(|k| {
            let m = (self.re[k] * self.re[k] + self.im[k] * self.im[k]).sqrt();
            m.min(u32::MAX as f32) as u32
        })
    }

    /// Process one block. `noisy` drives the echo estimate; the gain is
    /// applied to `clean`. Writes the output lagging by one block.
    pub fn process_block(
        &mut self,
        config: &AecmConfig,
        far: &[f32; PART_LEN],
        noisy: &[f32; PART_LEN],
        clean: &[f32; PART_LEN],
        output: &mut [f32; PART_LEN],
    ) {
        let prev = self.prev_far;
        self.windowed_fft(&prev, far);
        self.prev_far = *far;
        let far_mag = self.magnitudes();
        self.far_history.pop_back();
        self.far_history.push_front(far_mag);
        let far_f32 = far_mag.map(|m| m as f32);
        self.delay_estimator.add_far_spectrum(&far_f32);

        let prev = self.prev_noisy;
        self.windowed_fft(&prev, noisy);
        self.prev_noisy = *noisy;
        let near_mag = self.magnitudes();
        let near_f32 = near_mag.map(|m| m as f32);
        if let Some(delay) = self.delay_estimator.process_near_spectrum(&near_f32) {
            self.delay_blocks = delay.min(MAX_DELAY_BLOCKS - 1);
        }
        let aligned = self.far_history[self.delay_blocks];

        self.update_noise_floor(&near_mag);

        let far_sum: u64 = aligned.iter().map(|&m| u64::from(m)).sum();
        let far_active = far_sum > FAR_ACTIVE_MAGNITUDE_SUM;

        let echo_stored: [u64; PART_LEN1] = std::array::from_fn(|k| {
            (u64::from(aligned[k]) * self.channel_stored[k].max(0) as u64) >> CHANNEL_Q
        });
        if far_active {
            self.adapt_channel(&aligned, &near_mag, &echo_stored);
        }

        let suppression_q4 = u64::from(config.routing_mode.suppression_q4());
        let gains: [u32; PART_LEN1] = std::array::from_fn(|k| {
            if !far_active {
                return ONE_Q14;
            }
            let near = u64::from(near_mag[k]).max(1);
            let echo = (echo_stored[k] * suppression_q4) >> 4;
            let ratio_q14 = ((echo << 14) / near).min(u64::from(ONE_Q14));
            ONE_Q14 - ratio_q14 as u32
        });

        let prev = self.prev_clean;
        self.windowed_fft(&prev, clean);
        self.prev_clean = *clean;
        for k in 0..PART_LEN1 {
            let g = gains[k] as f32 / ONE_Q14 as f32;
            self.re[k] *= g;
            self.im[k] *= g;
        }
        if config.comfort_noise && far_active {
            self.add_comfort_noise(&gains);
        }

        self.fft.inverse(&self.re, &self.im, &mut self.scratch);
        for (i, out) in output.iter_mut().enumerate() {
            *out = self.overlap[i] + self.scratch[i] * self.window[i];
            self.overlap[i] = self.scratch[PART_LEN + i] * self.window[PART_LEN + i];
        }
    }

    fn update_noise_floor(&mut self, near_mag: &[u32; PART_LEN1]) {
        for (n, &m) in self.noise_floor.iter_mut().zip(near_mag) {
            let ramped = ((u64::from(*n) * NOISE_RAMP_Q15) >> 15).max(u64::from(*n) + 1);
            *n = (u64::from(m).min(ramped)).max(1) as u32;
        }
    }

    fn adapt_channel(
        &mut self,
        far: &[u32; PART_LEN1],
        near: &[u32; PART_LEN1],
        echo_stored: &[u64; PART_LEN1],
    ) {
        let mut err_stored = 0u64;
        let mut err_adapt = 0u64;
        for k in 0..PART_LEN1 {
            let f = i64::from(far[k]);
            let n = i64::from(near[k]);
            let echo_adapt = (f * self.channel_adapt[k]) >> CHANNEL_ADAPT_Q;
            let err = n - echo_adapt;
            if f >= MIN_ADAPT_MAGNITUDE {
                let step = (err << CHANNEL_ADAPT_Q) / f;
                self.channel_adapt[k] =
                    (self.channel_adapt[k] + (step >> MU_SHIFT)).clamp(0, MAX_CHANNEL_ADAPT);
            }
            err_adapt += err.unsigned_abs();
            err_stored += (n - echo_stored[k] as i64).unsigned_abs();
        }

        self.mse_stored += err_stored;
        self.mse_adapt += err_adapt;
        self.mse_blocks += 1;
        if self.mse_blocks < MSE_BLOCKS {
            return;
        }
        if self.mse_adapt * 8 < self.mse_stored * 7 {
            for (s, &a) in self.channel_stored.iter_mut().zip(&self.channel_adapt) {
                *s = (a >> (CHANNEL_ADAPT_Q - CHANNEL_Q)).min(i64::from(i16::MAX)) as i16;
            }
            tracing::trace!("stored echo path replaced by adaptive path");
        } else if self.mse_adapt > 2 * self.mse_stored {
            self.channel_adapt = self
                .channel_stored
                .map(|c| i64::from(c) << (CHANNEL_ADAPT_Q - CHANNEL_Q));
        }
        self.mse_stored = 0;
        self.mse_adapt = 0;
        self.mse_blocks = 0;
    }

    fn add_comfort_noise(&mut self, gains: &[u32; PART_LEN1]) {
        for k in 1..PART_LEN1 - 1 {
            self.seed = self.seed.wrapping_mul(69069).wrapping_add(1) & 0x7fff_ffff;
            let phase = 2.0 * std::f32::consts::PI * (self.seed >> 8) as f32 / (1u32 << 23) as f32;
            let g = gains[k] as f32 / ONE_Q14 as f32;
            let amplitude = self.noise_floor[k] as f32 * (1.0 - g * g).max(0.0).sqrt();
            self.re[k] += amplitude * phase.cos();
            self.im[k] += amplitude * phase.sin();
        }
    }
}

/// Convert a block of processed samples to int16.
pub fn block_to_i16(block: &[f32], out: &mut [i16]) {
    for (o, &v) in out.iter_mut().zip(block) {
        *o = float_s16_to_s16(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_is_decreasing() {
        let path = default_echo_path();
        assert_eq!(path[0], 160);
        assert_eq!(path[PART_LEN], 64);
        assert!(path.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn echo_path_survives_reset() {
        let mut core = AecmCore::new();
        let path = [100i16; PART_LEN1];
        core.set_echo_path(&path);
        core.reset();
        assert_eq!(core.echo_path(), path);
    }

    #[test]
    fn silent_far_end_is_transparent() {
        let mut core = AecmCore::new();
        let config = AecmConfig::default();
        let blocks: Vec<[f32; PART_LEN]> = (0..6)
            .map(|b| std::array::from_fn(|i| ((b * PART_LEN + i) as f32 * 0.2).sin() * 4000.0))
            .collect();
        let mut outputs = Vec::new();
        for block in &blocks {
            let mut out = [0.0; PART_LEN];
            core.process_block(&config, &[0.0; PART_LEN], block, block, &mut out);
            outputs.push(out);
        }
        for b in 1..blocks.len() {
            for i in 0..PART_LEN {
                assert!((outputs[b][i] - blocks[b - 1][i]).abs() < 0.5);
            }
        }
    }

    #[test]
    fn adaptive_path_converges_to_echo_gain() {
        let mut core = AecmCore::new();
        let config = AecmConfig {
            comfort_noise: false,
            ..AecmConfig::default()
        };
        let mut seed = 11u64;
        for _ in 0..400 {
            let far: [f32; PART_LEN] = std::array::from_fn(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                (seed % 16001) as f32 - 8000.0
            });
            let near = far.map(|v| v * 0.5);
            let mut out = [0.0; PART_LEN];
            core.process_block(&config, &far, &near, &near, &mut out);
        }
        assert_eq!(core.delay_blocks(), 0);
        // Magnitude gain 0.5 is 128 in Q8.
        let path = core.echo_path();
        let mean = path.iter().map(|&c| i32::from(c)).sum::<i32>() / PART_LEN1 as i32;
        assert!((mean - 128).abs() < 16, "mean path {mean}");
    }
}
