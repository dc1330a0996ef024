//! Quantile-based noise spectrum estimation.
//!
//! Tracks the 25th percentile of each bin's log magnitude with three
//! staggered estimators; whichever one completes its window publishes its
//! estimate as the noise spectrum.
//!
//! C++ source: `webrtc/modules/audio_processing/ns/ns_core.c` (`NoiseEstimation`)

use crate::config::LONG_STARTUP_PHASE_BLOCKS;

/// Number of simultaneous quantile estimates.
const SIMULT: usize = 3;

const DENSITY_WIDTH: f32 = 0.01;

/// Quantile-based noise spectrum estimator for a runtime bin count.
#[derive(Debug, Clone)]
pub struct QuantileNoiseEstimator {
    num_bins: usize,
    /// Density estimates, `SIMULT` rows of `num_bins`.
    density: Vec<f32>,
    /// Log-domain quantiles, `SIMULT` rows of `num_bins`.
    log_quantile: Vec<f32>,
    /// Published noise spectrum (linear magnitude).
    quantile: Vec<f32>,
    counter: [i32; SIMULT],
    num_updates: i32,
}

impl QuantileNoiseEstimator {
    pub fn new(num_bins: usize) -> Self {
        let counter = std::array::from_fn(|i| {
            (LONG_STARTUP_PHASE_BLOCKS as f32 * (i as f32 + 1.0) / SIMULT as f32).floor() as i32
        });
        Self {
            num_bins,
            density: vec![0.3; SIMULT * num_bins],
            log_quantile: vec![8.0; SIMULT * num_bins],
            quantile: vec![0.0; num_bins],
            counter,
            num_updates: 1,
        }
    }

    /// Update the trackers with `signal_spectrum` and write the current
    /// noise estimate into `noise_spectrum`.
    pub fn estimate(&mut self, signal_spectrum: &[f32], noise_spectrum: &mut [f32]) {
        debug_assert_eq!(signal_spectrum.len(), self.num_bins);
        debug_assert_eq!(noise_spectrum.len(), self.num_bins);

        let mut publish_row: Option<usize> = None;
        for s in 0..SIMULT {
            let row = s * self.num_bins;
            let one_by_counter_plus_1 = 1.0 / (self.counter[s] as f32 + 1.0);

            for (i, &magnitude) in signal_spectrum.iter().enumerate() {
                let log_spec = magnitude.max(1e-10).ln();
                let j = row + i;
                let delta = if self.density[j] > 1.0 {
                    40.0 / self.density[j]
                } else {
                    40.0
                };
                let step = delta * one_by_counter_plus_1;
                if log_spec > self.log_quantile[j] {
                    self.log_quantile[j] += 0.25 * step;
                } else {
                    self.log_quantile[j] -= 0.75 * step;
                }
                if (log_spec - self.log_quantile[j]).abs() < DENSITY_WIDTH {
                    self.density[j] = (self.counter[s] as f32 * self.density[j]
                        + 1.0 / (2.0 * DENSITY_WIDTH))
                        * one_by_counter_plus_1;
                }
            }

            if self.counter[s] >= LONG_STARTUP_PHASE_BLOCKS {
                self.counter[s] = 0;
                if self.num_updates >= LONG_STARTUP_PHASE_BLOCKS {
                    publish_row = Some(row);
                }
            }
            self.counter[s] += 1;
        }

        // During startup publish the fastest-moving tracker every block.
        if self.num_updates < LONG_STARTUP_PHASE_BLOCKS {
            publish_row = Some(self.num_bins * (SIMULT - 1));
            self.num_updates += 1;
        }

        if let Some(row) = publish_row {
            for (q, &lq) in self
                .quantile
                .iter_mut()
                .zip(&self.log_quantile[row..row + self.num_bins])
            {
                *q = lq.exp();
            }
        }
        noise_spectrum.copy_from_slice(&self.quantile);
    }
}
