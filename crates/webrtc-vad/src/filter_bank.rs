//! Sub-band log energy features.
//!
//! The 8 kHz signal is analyzed in 10 ms chunks with a zero-padded
//! 128-point FFT; power is accumulated into six bands covering
//! 80-4000 Hz and converted to dB per sample.
//!
//! C++ source: `webrtc/common_audio/vad/vad_filterbank.c`

use webrtc_common_audio::real_fft::RealFft;

/// Number of feature bands.
pub const NUM_CHANNELS: usize = 6;

/// Samples in a 10 ms chunk at 8 kHz.
pub const CHUNK_LENGTH: usize = 80;

const FFT_SIZE: usize = 128;

/// FFT bin ranges of the six bands (62.5 Hz per bin).
const BAND_BINS: [(usize, usize); NUM_CHANNELS] =
    [(1, 4), (4, 8), (8, 16), (16, 32), (32, 48), (48, 65)];

/// Power floor in FloatS16 units squared, keeps `log10` finite.
const POWER_FLOOR: f32 = 1e-2;

/// Computes per-band log energies and the total frame energy.
#[derive(Debug)]
pub struct FilterBank {
    fft: RealFft,
    fft_input: [f32; FFT_SIZE],
    re: [f32; FFT_SIZE / 2 + 1],
    im: [f32; FFT_SIZE / 2 + 1],
}

impl Default for FilterBank {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterBank {
    pub fn new() -> Self {
        Self {
            fft: RealFft::new(FFT_SIZE),
            fft_input: [0.0; FFT_SIZE],
            re: [0.0; FFT_SIZE / 2 + 1],
            im: [0.0; FFT_SIZE / 2 + 1],
        }
    }

    /// Compute band features of an 8 kHz frame whose length is a multiple
    /// of [`CHUNK_LENGTH`]. Returns the mean per-sample power of the frame.
    pub fn calculate_features(
        &mut self,
        frame: &[i16],
        features: &mut [f32; NUM_CHANNELS],
    ) -> f32 {
        debug_assert!(!frame.is_empty() && frame.len().is_multiple_of(CHUNK_LENGTH));
        let mut band_power = [0.0f32; NUM_CHANNELS];
        let mut total_power = 0.0f32;

        for chunk in frame.chunks_exact(CHUNK_LENGTH) {
            for (dst, &s) in self.fft_input.iter_mut().zip(chunk) {
                *dst = f32::from(s);
            }
            self.fft_input[CHUNK_LENGTH..].fill(0.0);
            total_power += chunk.iter().map(|&s| f32::from(s) * f32::from(s)).sum::<f32>();

            self.fft.forward(&self.fft_input, &mut self.re, &mut self.im);
            for (power, &(first, last)) in band_power.iter_mut().zip(BAND_BINS.iter()) {
                for k in first..last {
                    *power += self.re[k] * self.re[k] + self.im[k] * self.im[k];
                }
            }
        }

        // Two-sided Parseval scaling back to per-sample power.
        let scale = 2.0 / (FFT_SIZE as f32 * frame.len() as f32);
        for (f, &p) in features.iter_mut().zip(band_power.iter()) {
            *f = 10.0 * (p * scale + POWER_FLOOR).log10();
        }
        total_power / frame.len() as f32
    }
}

/// Decimate a 16 kHz signal to 8 kHz with a `[1 2 1] / 4` half-band
/// smoother. `state` holds the last odd input sample.
pub fn downsample_by_two(input: &[i16], output: &mut [i16], state: &mut i16) {
    debug_assert_eq!(input.len(), output.len() * 2);
    for (out, pair) in output.iter_mut().zip(input.chunks_exact(2)) {
        let sum = i32::from(*state) + 2 * i32::from(pair[0]) + i32::from(pair[1]);
        *out = (sum / 4) as i16;
        *state = pair[1];
    }
}
