//! Partitioned frequency-domain NLMS filter.
//!
//! The far-end spectrum history holds one 128-point spectrum per block
//! (previous and current block, overlap-save). The echo estimate is the
//! sum over partitions of `W[p] * X[p]`; adaptation adds the constrained
//! gradient `conj(X[p]) * mu * E / P_x` to each partition.
//!
//! C++ source: `webrtc/modules/audio_processing/aec/aec_core.c`
//!             (`FilterFar`, `ScaleErrorSignal`, `FilterAdaptation`)

use derive_more::Debug;
use webrtc_common_audio::real_fft::RealFft;

use crate::config::{BLOCK_LEN, FFT_LEN, NUM_BINS, NUM_PARTITIONS};

/// NLMS step size.
const MU: f32 = 0.5;
/// Smoothing of the far-end power used for normalization.
const FAR_POWER_SMOOTHING: f32 = 0.9;
/// Floor added to the far-end power, in the unnormalized FFT domain.
const REGULARIZATION: f32 = 1.0e6;

/// One complex spectrum.
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub re: [f32; NUM_BINS],
    pub im: [f32; NUM_BINS],
}

impl Default for Spectrum {
    fn default() -> Self {
        Self {
            re: [0.0; NUM_BINS],
            im: [0.0; NUM_BINS],
        }
    }
}

impl Spectrum {
    pub fn clear(&mut self) {
        self.re.fill(0.0);
        self.im.fill(0.0);
    }

    pub fn power(&self, out: &mut [f32; NUM_BINS]) {
        for ((o, &r), &i) in out.iter_mut().zip(&self.re).zip(&self.im) {
            *o = r * r + i * i;
        }
    }
}

#[derive(Debug)]
pub struct AdaptiveFilter {
    #[debug(skip)]
    fft: RealFft,
    weights: Vec<Spectrum>,
    /// Far-end spectra, `far[position]` is the newest.
    far: Vec<Spectrum>,
    position: usize,
    prev_far_block: [f32; BLOCK_LEN],
    far_power: [f32; NUM_BINS],
    #[debug(skip)]
    scratch: [f32; FFT_LEN],
}

impl Default for AdaptiveFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveFilter {
    pub fn new() -> Self {
        Self {
            fft: RealFft::new(FFT_LEN),
            weights: vec![Spectrum::default(); NUM_PARTITIONS],
            far: vec![Spectrum::default(); NUM_PARTITIONS],
            position: 0,
            prev_far_block: [0.0; BLOCK_LEN],
            far_power: [0.0; NUM_BINS],
            scratch: [0.0; FFT_LEN],
        }
    }

    pub fn reset(&mut self) {
        for w in &mut self.weights {
            w.clear();
        }
        for x in &mut self.far {
            x.clear();
        }
        self.position = 0;
        self.prev_far_block = [0.0; BLOCK_LEN];
        self.far_power = [0.0; NUM_BINS];
    }

    /// Newest far-end spectrum.
    pub fn latest_far(&self) -> &Spectrum {
        &self.far[self.position]
    }

    /// Smoothed far-end power per bin.
    pub fn far_power(&self) -> &[f32; NUM_BINS] {
        &self.far_power
    }

    /// Push one far-end block.
    pub fn push_far(&mut self, block: &[f32; BLOCK_LEN]) {
        self.position = (self.position + NUM_PARTITIONS - 1) % NUM_PARTITIONS;
        self.scratch[..BLOCK_LEN].copy_from_slice(&self.prev_far_block);
        self.scratch[BLOCK_LEN..].copy_from_slice(block);
        self.prev_far_block = *block;
        let x = &mut self.far[self.position];
        self.fft.forward(&self.scratch, &mut x.re, &mut x.im);

        for ((p, &r), &i) in self.far_power.iter_mut().zip(&x.re).zip(&x.im) {
            let power = NUM_PARTITIONS as f32 * (r * r + i * i);
            *p = FAR_POWER_SMOOTHING * *p + (1.0 - FAR_POWER_SMOOTHING) * power;
        }
    }

    /// Linear echo estimate for the current block.
    pub fn estimate(&mut self, echo: &mut [f32; BLOCK_LEN]) {
        let mut y = Spectrum::default();
        for p in 0..NUM_PARTITIONS {
            let x = &self.far[(self.position + p) % NUM_PARTITIONS];
            let w = &self.weights[p];
            for k in 0..NUM_BINS {
                y.re[k] += x.re[k] * w.re[k] - x.im[k] * w.im[k];
                y.im[k] += x.re[k] * w.im[k] + x.im[k] * w.re[k];
            }
        }
        self.fft.inverse(&y.re, &y.im, &mut self.scratch);
        echo.copy_from_slice(&self.scratch[BLOCK_LEN..]);
    }

    /// Adapt the partitions towards cancelling `error` (near minus echo
    /// estimate for the current block).
    pub fn adapt(&mut self, error: &[f32; BLOCK_LEN]) {
        self.scratch[..BLOCK_LEN].fill(0.0);
        self.scratch[BLOCK_LEN..].copy_from_slice(error);
        let mut e = Spectrum::default();
        self.fft.forward(&self.scratch, &mut e.re, &mut e.im);
        for k in 0..NUM_BINS {
            let scale = MU / (self.far_power[k] + REGULARIZATION);
            e.re[k] *= scale;
            e.im[k] *= scale;
        }

        let mut gradient = Spectrum::default();
        for p in 0..NUM_PARTITIONS {
            let x = &self.far[(self.position + p) % NUM_PARTITIONS];
            for k in 0..NUM_BINS {
                // conj(X) * E
                gradient.re[k] = x.re[k] * e.re[k] + x.im[k] * e.im[k];
                gradient.im[k] = x.re[k] * e.im[k] - x.im[k] * e.re[k];
            }
            // Constrain the update to a causal block-length response.
            self.fft.inverse(&gradient.re, &gradient.im, &mut self.scratch);
            self.scratch[BLOCK_LEN..].fill(0.0);
            self.fft.forward(&self.scratch, &mut gradient.re, &mut gradient.im);

            let w = &mut self.weights[p];
            for k in 0..NUM_BINS {
                w.re[k] += gradient.re[k];
                w.im[k] += gradient.im[k];
            }
        }
    }

    /// Energy of each partition's weights; the peak locates the echo path
    /// delay within the filter.
    pub fn partition_energies(&self) -> [f32; NUM_PARTITIONS] {
        let mut energies = [0.0; NUM_PARTITIONS];
        for (e, w) in energies.iter_mut().zip(&self.weights) {
            *e = w
                .re
                .iter()
                .zip(&w.im)
                .map(|(r, i)| r * r + i * i)
                .sum();
        }
        energies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(seed: &mut u64) -> f32 {
        *seed ^= *seed << 13;
        *seed ^= *seed >> 7;
        *seed ^= *seed << 17;
        (*seed % 20001) as f32 - 10000.0
    }

    fn run_echo_path(delay: usize, gain: f32, blocks: usize) -> (f32, f32, AdaptiveFilter) {
        let mut filter = AdaptiveFilter::new();
        let mut seed = 42u64;
        let total = blocks * BLOCK_LEN + delay;
        let far: Vec<f32> = (0..total).map(|_| noise(&mut seed)).collect();
        let mut near_energy = 0.0;
        let mut error_energy = 0.0;
        for b in 0..blocks {
            let mut far_block = [0.0; BLOCK_LEN];
            let mut near_block = [0.0; BLOCK_LEN];
            for i in 0..BLOCK_LEN {
                let n = b * BLOCK_LEN + i;
                far_block[i] = far[n];
                near_block[i] = if n >= delay { gain * far[n - delay] } else { 0.0 };
            }
            filter.push_far(&far_block);
            let mut echo = [0.0; BLOCK_LEN];
            filter.estimate(&mut echo);
            let mut error = [0.0; BLOCK_LEN];
            for i in 0..BLOCK_LEN {
                error[i] = near_block[i] - echo[i];
            }
            filter.adapt(&error);
            if b >= blocks - 50 {
                near_energy += near_block.iter().map(|v| v * v).sum::<f32>();
                error_energy += error.iter().map(|v| v * v).sum::<f32>();
            }
        }
        (near_energy, error_energy, filter)
    }

    #[test]
    fn starts_silent() {
        let mut filter = AdaptiveFilter::new();
        filter.push_far(&[1000.0; BLOCK_LEN]);
        let mut echo = [1.0; BLOCK_LEN];
        filter.estimate(&mut echo);
        assert!(echo.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn converges_on_pure_delay() {
        let (near, error, _) = run_echo_path(10, 0.5, 600);
        assert!(error < near * 0.01, "ERLE too low: {near} / {error}");
    }

    #[test]
    fn peak_partition_tracks_delay() {
        let (_, _, filter) = run_echo_path(5 * BLOCK_LEN + 3, 0.5, 800);
        let energies = filter.partition_energies();
        let peak = energies
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(5));
    }

    #[test]
    fn reset_clears_weights() {
        let (_, _, mut filter) = run_echo_path(0, 0.5, 50);
        filter.reset();
        assert!(filter.partition_energies().iter().all(|&e| e == 0.0));
    }
}
