//! Two-component Gaussian mixtures for the noise and speech classes.
//!
//! C++ source: `webrtc/common_audio/vad/vad_gmm.c`,
//!             `webrtc/common_audio/vad/vad_core.c`

use crate::filter_bank::NUM_CHANNELS;

/// Gaussian components per class and band.
pub const NUM_GAUSSIANS: usize = 2;

const LN_SQRT_2PI: f32 = 0.918_938_5;

/// Initial noise means (dB per sample) per band and component.
const NOISE_MEANS: [[f32; NUM_GAUSSIANS]; NUM_CHANNELS] = [
    [18.0, 30.0],
    [17.0, 29.0],
    [16.0, 28.0],
    [15.0, 27.0],
    [14.0, 26.0],
    [13.0, 25.0],
];
/// Initial speech means (dB per sample) per band and component.
const SPEECH_MEANS: [[f32; NUM_GAUSSIANS]; NUM_CHANNELS] = [
    [45.0, 60.0],
    [46.0, 62.0],
    [46.0, 62.0],
    [44.0, 60.0],
    [40.0, 56.0],
    [36.0, 52.0],
];

const NOISE_STD: f32 = 6.0;
const SPEECH_STD: f32 = 10.0;

const NOISE_UPDATE_RATE: f32 = 0.02;
/// Faster tracking when a feature falls below the noise model.
const NOISE_DOWNWARD_RATE: f32 = 0.1;
const SPEECH_UPDATE_RATE: f32 = 0.01;

/// Minimum distance between the speech and noise model centers.
const MIN_MODEL_SEPARATION_DB: f32 = 8.0;
const MIN_NOISE_MEAN: f32 = -20.0;
const MAX_NOISE_MEAN: f32 = 80.0;
const MAX_SPEECH_MEAN: f32 = 100.0;

#[inline]
fn log_gaussian(x: f32, mean: f32, std: f32) -> f32 {
    let z = (x - mean) / std;
    -0.5 * z * z - std.ln() - LN_SQRT_2PI
}

/// `log(0.5 * e^a + 0.5 * e^b)` without overflow.
#[inline]
fn log_mix(a: f32, b: f32) -> f32 {
    let m = a.max(b);
    m + (0.5 * (a - m).exp() + 0.5 * (b - m).exp()).ln()
}

/// Mixture log likelihoods and component responsibilities for one band.
#[derive(Debug, Clone, Copy)]
pub struct BandLikelihood {
    pub log_noise: f32,
    pub log_speech: f32,
    noise_resp: [f32; NUM_GAUSSIANS],
    speech_resp: [f32; NUM_GAUSSIANS],
}

impl BandLikelihood {
    /// Log likelihood ratio speech over noise.
    pub fn llr(&self) -> f32 {
        self.log_speech - self.log_noise
    }
}

/// Adaptive speech and noise models over all bands.
#[derive(Debug, Clone)]
pub struct GmmModel {
    noise_means: [[f32; NUM_GAUSSIANS]; NUM_CHANNELS],
    speech_means: [[f32; NUM_GAUSSIANS]; NUM_CHANNELS],
}

impl Default for GmmModel {
    fn default() -> Self {
        Self {
            noise_means: NOISE_MEANS,
            speech_means: SPEECH_MEANS,
        }
    }
}

impl GmmModel {
    pub fn likelihood(&self, band: usize, feature: f32) -> BandLikelihood {
        let noise = self.noise_means[band].map(|m| log_gaussian(feature, m, NOISE_STD));
        let speech = self.speech_means[band].map(|m| log_gaussian(feature, m, SPEECH_STD));
        let log_noise = log_mix(noise[0], noise[1]);
        let log_speech = log_mix(speech[0], speech[1]);
        BandLikelihood {
            log_noise,
            log_speech,
            noise_resp: noise.map(|l| 0.5 * (l - log_noise).exp()),
            speech_resp: speech.map(|l| 0.5 * (l - log_speech).exp()),
        }
    }

    /// Adapt the models toward the current features. `is_speech` is the raw
    /// decision, before hangover.
    pub fn update(
        &mut self,
        features: &[f32; NUM_CHANNELS],
        likelihoods: &[BandLikelihood; NUM_CHANNELS],
        is_speech: bool,
    ) {
        for band in 0..NUM_CHANNELS {
            let x = features[band];
            let lk = &likelihoods[band];
            for k in 0..NUM_GAUSSIANS {
                let mean = &mut self.noise_means[band][k];
                if x < *mean {
                    // Minimum tracking pulls every component down.
                    *mean += NOISE_DOWNWARD_RATE * (x - *mean);
                } else if !is_speech {
                    *mean += NOISE_UPDATE_RATE * lk.noise_resp[k] * (x - *mean);
                }
                *mean = mean.clamp(MIN_NOISE_MEAN, MAX_NOISE_MEAN);

                if is_speech {
                    let mean = &mut self.speech_means[band][k];
                    *mean += SPEECH_UPDATE_RATE * lk.speech_resp[k] * (x - *mean);
                }
            }
            self.enforce_separation(band);
        }
    }

    fn enforce_separation(&mut self, band: usize) {
        let noise_center = self.noise_means[band].iter().sum::<f32>() / NUM_GAUSSIANS as f32;
        let speech_center = self.speech_means[band].iter().sum::<f32>() / NUM_GAUSSIANS as f32;
        let shortfall = noise_center + MIN_MODEL_SEPARATION_DB - speech_center;
        if shortfall > 0.0 {
            for m in &mut self.speech_means[band] {
                *m = (*m + shortfall).min(MAX_SPEECH_MEAN);
            }
        }
    }

    pub fn noise_center(&self, band: usize) -> f32 {
        self.noise_means[band].iter().sum::<f32>() / NUM_GAUSSIANS as f32
    }

    pub fn speech_center(&self, band: usize) -> f32 {
        self.speech_means[band].iter().sum::<f32>() / NUM_GAUSSIANS as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loud_feature_favours_speech() {
        let model = GmmModel::default();
        assert!(model.likelihood(2, 70.0).llr() > 5.0);
        assert!(model.likelihood(2, 15.0).llr() < 0.0);
    }

    #[test]
    fn noise_model_tracks_quiet_floor() {
        let mut model = GmmModel::default();
        let features = [0.0f32; NUM_CHANNELS];
        for _ in 0..500 {
            let likelihoods = std::array::from_fn(|b| model.likelihood(b, features[b]));
            model.update(&features, &likelihoods, false);
        }
        for band in 0..NUM_CHANNELS {
            assert!(model.noise_center(band) < 10.0);
        }
    }

    #[test]
    fn separation_is_enforced() {
        let mut model = GmmModel::default();
        let features = [75.0f32; NUM_CHANNELS];
        for _ in 0..2000 {
            let likelihoods = std::array::from_fn(|b| model.likelihood(b, features[b]));
            model.update(&features, &likelihoods, false);
        }
        for band in 0..NUM_CHANNELS {
            assert!(model.speech_center(band) - model.noise_center(band) >= MIN_MODEL_SEPARATION_DB - 1e-3);
        }
    }

    #[test]
    fn log_mix_is_stable_for_large_negatives() {
        let v = log_mix(-1000.0, -1001.0);
        assert!(v.is_finite());
        assert!(v < -999.0);
    }
}
