//! Binary-spectrum delay estimator.
//!
//! Each block's magnitude spectrum is reduced to a 32-bit word: bit `k` is
//! set when band `k` exceeds its running mean. The near-end word is
//! compared (Hamming distance) against a history of far-end words, the
//! distances are smoothed over time, and the history position with the
//! clearly smallest smoothed distance is the delay estimate in blocks.
//!
//! Ported from `modules/audio_processing/utility/delay_estimator.c` and
//! `delay_estimator_wrapper.c`.

/// Number of bands packed into one binary spectrum.
pub const BINARY_SPECTRUM_BANDS: usize = 32;

/// First spectrum bin used for the binary spectrum.
const BAND_FIRST: usize = 12;

/// Smoothing factor of the per-band running mean.
const MEAN_SMOOTHING: f32 = 1.0 / 64.0;

/// Smoothing factor of the per-delay bit count.
const BIT_COUNT_SMOOTHING: f32 = 1.0 / 8.0;

/// Required gap, in bits, between the best and worst smoothed distances
/// before a candidate is trusted.
const MIN_CONTRAST_BITS: f32 = 3.0;

/// Number of consecutive blocks the same candidate must win.
const CANDIDATE_HITS_REQUIRED: usize = 3;

/// Running per-band mean used to binarize one side's spectra.
#[derive(Debug, Clone)]
struct BinarySpectrumState {
    mean: [f32; BINARY_SPECTRUM_BANDS],
    initialized: bool,
}

impl BinarySpectrumState {
    fn new() -> Self {
        Self {
            mean: [0.0; BINARY_SPECTRUM_BANDS],
            initialized: false,
        }
    }

    fn binarize(&mut self, spectrum: &[f32]) -> u32 {
        let bands = band_range(spectrum.len());
        if !self.initialized {
            for (m, &s) in self.mean.iter_mut().zip(&spectrum[bands.clone()]) {
                *m = s;
            }
            self.initialized = true;
        }
        let mut word = 0u32;
        for (k, &s) in spectrum[bands].iter().enumerate() {
            self.mean[k] += (s - self.mean[k]) * MEAN_SMOOTHING;
            if s > self.mean[k] {
                word |= 1 << k;
            }
        }
        word
    }
}

fn band_range(spectrum_len: usize) -> std::ops::Range<usize> {
    let first = BAND_FIRST.min(spectrum_len.saturating_sub(BINARY_SPECTRUM_BANDS));
    let last = (first + BINARY_SPECTRUM_BANDS).min(spectrum_len);
    first..last
}

/// Estimates the delay, in blocks, between a far-end and a near-end
/// spectrum stream.
#[derive(Debug, Clone)]
pub struct DelayEstimator {
    far: BinarySpectrumState,
    near: BinarySpectrumState,
    /// Far-end binary spectra, newest first.
    far_history: Vec<u32>,
    far_history_filled: usize,
    mean_bit_counts: Vec<f32>,
    candidate: Option<usize>,
    candidate_hits: usize,
    last_delay: Option<usize>,
    last_contrast: f32,
}

impl DelayEstimator {
    /// Create an estimator able to find delays in `0..history_size` blocks.
    pub fn new(history_size: usize) -> Self {
        let history_size = history_size.max(1);
        Self {
            far: BinarySpectrumState::new(),
            near: BinarySpectrumState::new(),
            far_history: vec![0; history_size],
            far_history_filled: 0,
            mean_bit_counts: vec![(BINARY_SPECTRUM_BANDS / 2) as f32; history_size],
            candidate: None,
            candidate_hits: 0,
            last_delay: None,
            last_contrast: 0.0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.far_history.len());
    }

    /// Maximum delay (exclusive) the estimator can report.
    pub fn history_size(&self) -> usize {
        self.far_history.len()
    }

    /// Push one far-end magnitude spectrum.
    pub fn add_far_spectrum(&mut self, spectrum: &[f32]) {
        let word = self.far.binarize(spectrum);
        self.far_history.rotate_right(1);
        self.far_history[0] = word;
        self.far_history_filled = (self.far_history_filled + 1).min(self.far_history.len());
    }

    /// Match one near-end magnitude spectrum against the far-end history.
    ///
    /// Returns the current delay estimate in blocks, or `None` while no
    /// estimate has been established.
    pub fn process_near_spectrum(&mut self, spectrum: &[f32]) -> Option<usize> {
        let near_word = self.near.binarize(spectrum);
        if self.far_history_filled == 0 {
            return self.last_delay;
        }

        let filled = self.far_history_filled;
        for (mean, &far_word) in self.mean_bit_counts[..filled]
            .iter_mut()
            .zip(&self.far_history[..filled])
        {
            let bit_count = (near_word ^ far_word).count_ones() as f32;
            *mean += (bit_count - *mean) * BIT_COUNT_SMOOTHING;
        }

        let mut best = 0;
        let mut min_value = f32::MAX;
        let mut max_value = f32::MIN;
        for (i, &value) in self.mean_bit_counts[..filled].iter().enumerate() {
            if value < min_value {
                min_value = value;
                best = i;
            }
            max_value = max_value.max(value);
        }
        self.last_contrast = max_value - min_value;

        if self.last_contrast < MIN_CONTRAST_BITS {
            self.candidate_hits = 0;
            return self.last_delay;
        }
        if self.candidate == Some(best) {
            self.candidate_hits += 1;
        } else {
            self.candidate = Some(best);
            self.candidate_hits = 1;
        }
        if self.candidate_hits >= CANDIDATE_HITS_REQUIRED {
            self.last_delay = Some(best);
        }
        self.last_delay
    }

    /// Most recent delay estimate in blocks.
    pub fn last_delay(&self) -> Option<usize> {
        self.last_delay
    }

    /// Estimate quality in [0, 1], from the contrast between the best and
    /// worst history positions.
    pub fn quality(&self) -> f32 {
        (self.last_contrast / (BINARY_SPECTRUM_BANDS / 2) as f32).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_spectra(seed: u64, count: usize, bins: usize) -> Vec<Vec<f32>> {
        let mut state = seed;
        let mut next = || -> f32 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 10_000) as f32
        };
        (0..count)
            .map(|_| (0..bins).map(|_| next()).collect())
            .collect()
    }

    #[test]
    fn no_estimate_without_far_end() {
        let mut estimator = DelayEstimator::new(20);
        let spectra = random_spectra(7, 10, 65);
        for s in &spectra {
            assert_eq!(estimator.process_near_spectrum(s), None);
        }
    }

    #[test]
    fn finds_known_delay() {
        let delay = 7;
        let mut estimator = DelayEstimator::new(20);
        let spectra = random_spectra(42, 300, 65);
        let mut estimate = None;
        for i in 0..spectra.len() {
            estimator.add_far_spectrum(&spectra[i]);
            if i >= delay {
                estimate = estimator.process_near_spectrum(&spectra[i - delay]);
            }
        }
        assert_eq!(estimate, Some(delay));
        assert!(estimator.quality() > 0.2);
    }

    #[test]
    fn tracks_delay_change() {
        let mut estimator = DelayEstimator::new(30);
        let spectra = random_spectra(99, 600, 65);
        for i in 0..300 {
            estimator.add_far_spectrum(&spectra[i]);
            if i >= 4 {
                estimator.process_near_spectrum(&spectra[i - 4]);
            }
        }
        assert_eq!(estimator.last_delay(), Some(4));
        for i in 300..600 {
            estimator.add_far_spectrum(&spectra[i]);
            estimator.process_near_spectrum(&spectra[i - 12]);
        }
        assert_eq!(estimator.last_delay(), Some(12));
    }

    #[test]
    fn reset_forgets_estimate() {
        let mut estimator = DelayEstimator::new(10);
        let spectra = random_spectra(3, 200, 65);
        for i in 2..200 {
            estimator.add_far_spectrum(&spectra[i]);
            estimator.process_near_spectrum(&spectra[i - 2]);
        }
        assert!(estimator.last_delay().is_some());
        estimator.reset();
        assert_eq!(estimator.last_delay(), None);
        assert_eq!(estimator.history_size(), 10);
    }
}
