//! Frame-level speech probability from the averaged likelihood ratio.
//!
//! C++ source: `webrtc/modules/audio_processing/ns/ns_core.c` (`SpeechNoiseProb`)

use crate::config::LRT_FEATURE_THR;

/// Sharpness of the sigmoid mapping the LRT feature to a probability.
const LRT_WIDTH: f32 = 4.0;
/// Temporal smoothing of the prior speech probability.
const PRIOR_SMOOTHING: f32 = 0.9;
/// Temporal smoothing of the per-bin log LRT.
const LOG_LRT_SMOOTHING: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct SpeechProbabilityEstimator {
    avg_log_lrt: Vec<f32>,
    lrt_feature: f32,
    prior_probability: f32,
}

impl SpeechProbabilityEstimator {
    pub fn new(num_bins: usize) -> Self {
        Self {
            avg_log_lrt: vec![LRT_FEATURE_THR; num_bins],
            lrt_feature: LRT_FEATURE_THR,
            prior_probability: 0.5,
        }
    }

    /// Update with this frame's prior and posterior SNRs.
    pub fn update(&mut self, prior_snr: &[f32], post_snr: &[f32]) {
        let mut sum = 0.0f32;
        for ((avg, &xi), &gamma_minus_1) in
            self.avg_log_lrt.iter_mut().zip(prior_snr).zip(post_snr)
        {
            let xi = xi.max(0.0);
            let gamma = gamma_minus_1 + 1.0;
            let log_lrt = gamma * xi / (1.0 + xi) - (1.0 + xi).ln();
            *avg += LOG_LRT_SMOOTHING * (log_lrt - *avg);
            sum += *avg;
        }
        self.lrt_feature = sum / self.avg_log_lrt.len().max(1) as f32;

        let indicator = 0.5 * ((LRT_WIDTH * (self.lrt_feature - LRT_FEATURE_THR)).tanh() + 1.0);
        self.prior_probability += (1.0 - PRIOR_SMOOTHING) * (indicator - self.prior_probability);
    }

    pub fn prior_probability(&self) -> f32 {
        self.prior_probability
    }

    pub fn lrt_feature(&self) -> f32 {
        self.lrt_feature
    }
}
