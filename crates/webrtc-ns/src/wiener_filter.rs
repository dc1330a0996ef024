//! Wiener filter for frequency-domain noise reduction.
//!
//! Estimates a per-bin gain from signal and noise spectra using a
//! decision-directed prior SNR. During the short startup phase the gain
//! is blended with a spectral-subtraction estimate built from the
//! accumulated signal spectrum.
//!
//! C++ source: `webrtc/modules/audio_processing/ns/ns_core.c` (`ComputeDdBasedWienerFilter`)

use crate::config::{LONG_STARTUP_PHASE_BLOCKS, SHORT_STARTUP_PHASE_BLOCKS};
use crate::suppression_params::SuppressionParams;

/// Decision-directed smoothing of the prior SNR.
const DD_SMOOTHING: f32 = 0.98;

/// Wiener filter for noise suppression.
#[derive(Debug, Clone)]
pub struct WienerFilter {
    suppression_params: &'static SuppressionParams,
    spectrum_prev_process: Vec<f32>,
    initial_spectral_estimate: Vec<f32>,
    filter: Vec<f32>,
}

impl WienerFilter {
    pub fn new(suppression_params: &'static SuppressionParams, num_bins: usize) -> Self {
        Self {
            suppression_params,
            spectrum_prev_process: vec![0.0; num_bins],
            initial_spectral_estimate: vec![0.0; num_bins],
            filter: vec![1.0; num_bins],
        }
    }

    /// Update the filter estimate from current signal and noise spectra.
    pub fn update(
        &mut self,
        num_analyzed_frames: i32,
        noise_spectrum: &[f32],
        prev_noise_spectrum: &[f32],
        signal_spectrum: &[f32],
    ) {
        let over_sub = self.suppression_params.over_subtraction_factor;
        let min_gain = self.suppression_params.minimum_attenuating_gain;

        for i in 0..self.filter.len() {
            let prev_tsa =
                self.spectrum_prev_process[i] / (prev_noise_spectrum[i] + 0.0001) * self.filter[i];
            let current_tsa = if signal_spectrum[i] > noise_spectrum[i] {
                signal_spectrum[i] / (noise_spectrum[i] + 0.0001) - 1.0
            } else {
                0.0
            };
            let snr_prior = DD_SMOOTHING * prev_tsa + (1.0 - DD_SMOOTHING) * current_tsa;
            self.filter[i] = (snr_prior / (over_sub + snr_prior)).clamp(min_gain, 1.0);
        }

        if (0..SHORT_STARTUP_PHASE_BLOCKS).contains(&num_analyzed_frames) {
            let frames = num_analyzed_frames as f32;
            let remaining = (SHORT_STARTUP_PHASE_BLOCKS - num_analyzed_frames) as f32;
            for i in 0..self.filter.len() {
                self.initial_spectral_estimate[i] += signal_spectrum[i];
                let average = self.initial_spectral_estimate[i] / (frames + 1.0);
                let filter_initial = ((average - over_sub * noise_spectrum[i])
                    / (average + 0.0001))
                    .clamp(min_gain, 1.0);
                self.filter[i] = (self.filter[i] * frames + filter_initial * remaining)
                    / SHORT_STARTUP_PHASE_BLOCKS as f32;
            }
        }

        self.spectrum_prev_process.copy_from_slice(signal_spectrum);
    }

    /// Overall gain correction from the energy ratio before and after
    /// filtering, weighted by the prior speech probability. Returns 1.0
    /// during startup or when attenuation adjustment is disabled.
    pub fn compute_overall_scaling_factor(
        &self,
        num_analyzed_frames: i32,
        prior_speech_probability: f32,
        energy_before_filtering: f32,
        energy_after_filtering: f32,
    ) -> f32 {
        if !self.suppression_params.use_attenuation_adjustment
            || num_analyzed_frames <= LONG_STARTUP_PHASE_BLOCKS
        {
            return 1.0;
        }

        let mut gain = (energy_after_filtering / (energy_before_filtering + 1.0)).sqrt();
        const B_LIM: f32 = 0.5;
        let mut scale_factor1 = 1.0f32;
        if gain > B_LIM {
            scale_factor1 = 1.0 + 1.3 * (gain - B_LIM);
            if gain * scale_factor1 > 1.0 {
                scale_factor1 = 1.0 / gain;
            }
        }
        let mut scale_factor2 = 1.0f32;
        if gain < B_LIM {
            // Pauses are floored by the filter; only a mild extra cut here.
            gain = gain.max(self.suppression_params.minimum_attenuating_gain);
            scale_factor2 = 1.0 - 0.3 * (B_LIM - gain);
        }
        prior_speech_probability * scale_factor1 + (1.0 - prior_speech_probability) * scale_factor2
    }

    /// Per-bin filter gains.
    pub fn filter(&self) -> &[f32] {
        &self.filter
    }

    /// Mean gain over `bins`, used to carry suppression into the upper band.
    pub fn mean_gain(&self, bins: std::ops::Range<usize>) -> f32 {
        let slice = &self.filter[bins];
        if slice.is_empty() {
            return 1.0;
        }
        slice.iter().sum::<f32>() / slice.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuppressionLevel;

    fn filter(level: SuppressionLevel) -> WienerFilter {
        WienerFilter::new(SuppressionParams::for_level(level), 65)
    }

    #[test]
    fn starts_transparent() {
        let f = filter(SuppressionLevel::K12dB);
        assert!(f.filter().iter().all(|&g| g == 1.0));
        assert_eq!(f.mean_gain(0..65), 1.0);
    }

    #[test]
    fn pure_noise_is_floored() {
        let mut f = filter(SuppressionLevel::K18dB);
        let noise = vec![100.0f32; 65];
        for frame in 0..300 {
            f.update(frame, &noise, &noise, &noise);
        }
        for &g in f.filter() {
            assert!((g - 0.125).abs() < 1e-3, "gain {g}");
        }
    }

    #[test]
    fn strong_signal_passes() {
        let mut f = filter(SuppressionLevel::K12dB);
        let noise = vec![1.0f32; 65];
        let signal = vec![1000.0f32; 65];
        for frame in 0..300 {
            f.update(frame, &noise, &noise, &signal);
        }
        assert!(f.filter().iter().all(|&g| g > 0.95));
    }

    #[test]
    fn scaling_is_neutral_without_adjustment() {
        let f = filter(SuppressionLevel::K6dB);
        assert_eq!(f.compute_overall_scaling_factor(500, 0.5, 10.0, 1.0), 1.0);
        let f = filter(SuppressionLevel::K12dB);
        assert_eq!(f.compute_overall_scaling_factor(10, 0.5, 10.0, 1.0), 1.0);
        assert!(f.compute_overall_scaling_factor(500, 0.0, 100.0, 1.0) < 1.0);
    }
}
