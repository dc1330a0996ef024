//! Radix-2 real FFT used by the echo cancellers and the noise suppressor.
//!
//! Forward transforms produce the `n / 2 + 1` non-redundant bins as split
//! real and imaginary arrays with the usual `e^{-j2πkn/N}` sign
//! convention. The inverse is scaled by `1 / n`, so a forward/inverse
//! pair reproduces the input.

use derive_more::Debug;

/// Real-input FFT of a fixed power-of-two size.
#[derive(Debug)]
pub struct RealFft {
    size: usize,
    #[debug(skip)]
    cos_table: Vec<f32>,
    #[debug(skip)]
    sin_table: Vec<f32>,
    #[debug(skip)]
    bit_reversed: Vec<usize>,
    #[debug(skip)]
    scratch_re: Vec<f32>,
    #[debug(skip)]
    scratch_im: Vec<f32>,
}

impl RealFft {
    /// Create a transform of `size` points.
    ///
    /// # Panics
    ///
    /// Panics if `size` is not a power of two of at least 2.
    pub fn new(size: usize) -> Self {
        assert!(size >= 2 && size.is_power_of_two(), "size must be a power of two");
        let bits = size.trailing_zeros();
        let cos_table = (0..size / 2)
            .map(|m| (2.0 * std::f64::consts::PI * m as f64 / size as f64).cos() as f32)
            .collect();
        let sin_table = (0..size / 2)
            .map(|m| (2.0 * std::f64::consts::PI * m as f64 / size as f64).sin() as f32)
            .collect();
        let bit_reversed = (0..size)
            .map(|i| i.reverse_bits() >> (usize::BITS - bits))
            .collect();
        Self {
            size,
            cos_table,
            sin_table,
            bit_reversed,
            scratch_re: vec![0.0; size],
            scratch_im: vec![0.0; size],
        }
    }

    /// Transform size in points.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of output bins (`size / 2 + 1`).
    pub fn num_bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Forward transform of `input` into `re`/`im` bins.
    ///
    /// # Panics
    ///
    /// Panics if `input` is not `size` long or the outputs are shorter
    /// than [`num_bins`](Self::num_bins).
    pub fn forward(&mut self, input: &[f32], re: &mut [f32], im: &mut [f32]) {
        assert_eq!(input.len(), self.size);
        let bins = self.num_bins();
        assert!(re.len() >= bins && im.len() >= bins);

        let mut scratch_re = std::mem::take(&mut self.scratch_re);
        let mut scratch_im = std::mem::take(&mut self.scratch_im);
        scratch_re.copy_from_slice(input);
        scratch_im.fill(0.0);
        self.transform(&mut scratch_re, &mut scratch_im, false);
        re[..bins].copy_from_slice(&scratch_re[..bins]);
        im[..bins].copy_from_slice(&scratch_im[..bins]);
        self.scratch_re = scratch_re;
        self.scratch_im = scratch_im;
    }

    /// Inverse transform of `re`/`im` bins into `output`, scaled by
    /// `1 / size`. The imaginary parts of DC and Nyquist are ignored.
    ///
    /// # Panics
    ///
    /// Panics if `output` is not `size` long or the inputs are shorter
    /// than [`num_bins`](Self::num_bins).
    pub fn inverse(&mut self, re: &[f32], im: &[f32], output: &mut [f32]) {
        assert_eq!(output.len(), self.size);
        let bins = self.num_bins();
        assert!(re.len() >= bins && im.len() >= bins);

        let n = self.size;
        let mut scratch_re = std::mem::take(&mut self.scratch_re);
        let mut scratch_im = std::mem::take(&mut self.scratch_im);
        scratch_re[0] = re[0];
        scratch_im[0] = 0.0;
        scratch_re[n / 2] = re[n / 2];
        scratch_im[n / 2] = 0.0;
        for k in 1..n / 2 {
            scratch_re[k] = re[k];
            scratch_im[k] = im[k];
            scratch_re[n - k] = re[k];
            scratch_im[n - k] = -im[k];
        }
        self.transform(&mut scratch_re, &mut scratch_im, true);
        let scale = 1.0 / n as f32;
        for (o, &r) in output.iter_mut().zip(scratch_re.iter()) {
            *o = r * scale;
        }
        self.scratch_re = scratch_re;
        self.scratch_im = scratch_im;
    }

    fn transform(&self, re: &mut [f32], im: &mut [f32], inverse: bool) {
        let n = self.size;
        for i in 0..n {
            let j = self.bit_reversed[i];
            if j > i {
                re.swap(i, j);
                im.swap(i, j);
            }
        }

        let sign = if inverse { 1.0 } else { -1.0 };
        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let step = n / len;
            for start in (0..n).step_by(len) {
                for k in 0..half {
                    let wr = self.cos_table[k * step];
                    let wi = sign * self.sin_table[k * step];
                    let a = start + k;
                    let b = a + half;
                    let tr = re[b] * wr - im[b] * wi;
                    let ti = re[b] * wi + im[b] * wr;
                    re[b] = re[a] - tr;
                    im[b] = im[a] - ti;
                    re[a] += tr;
                    im[a] += ti;
                }
            }
            len <<= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;
    use proptest::collection::vec as pvec;
    use test_strategy::proptest;

    fn naive_dft(input: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let n = input.len();
        let bins = n / 2 + 1;
        let mut re = vec![0.0f32; bins];
        let mut im = vec![0.0f32; bins];
        for k in 0..bins {
            let mut sr = 0.0f64;
            let mut si = 0.0f64;
            for (t, &x) in input.iter().enumerate() {
                let angle = -2.0 * std::f64::consts::PI * (k * t) as f64 / n as f64;
                sr += f64::from(x) * angle.cos();
                si += f64::from(x) * angle.sin();
            }
            re[k] = sr as f32;
            im[k] = si as f32;
        }
        (re, im)
    }

    #[test]
    fn impulse_is_flat() {
        let mut fft = RealFft::new(16);
        let mut input = [0.0f32; 16];
        input[0] = 1.0;
        let mut re = [0.0f32; 9];
        let mut im = [0.0f32; 9];
        fft.forward(&input, &mut re, &mut im);
        for k in 0..9 {
            assert!((re[k] - 1.0).abs() < 1e-6);
            assert!(im[k].abs() < 1e-6);
        }
    }

    #[test]
    fn cosine_hits_single_bin() {
        let n = 128;
        let mut fft = RealFft::new(n);
        let input: Vec<f32> = (0..n)
            .map(|t| (2.0 * std::f32::consts::PI * 5.0 * t as f32 / n as f32).cos())
            .collect();
        let mut re = vec![0.0f32; n / 2 + 1];
        let mut im = vec![0.0f32; n / 2 + 1];
        fft.forward(&input, &mut re, &mut im);
        assert!((re[5] - n as f32 / 2.0).abs() < 1e-3);
        for k in (0..=n / 2).filter(|&k| k != 5) {
            assert!(re[k].abs() < 1e-3 && im[k].abs() < 1e-3, "bin {k}");
        }
    }

    #[proptest]
    fn forward_matches_naive_dft(#[strategy(pvec(-1.0f32..1.0, 64))] input: Vec<f32>) {
        let mut fft = RealFft::new(64);
        let mut re = vec![0.0f32; 33];
        let mut im = vec![0.0f32; 33];
        fft.forward(&input, &mut re, &mut im);
        let (expected_re, expected_im) = naive_dft(&input);
        for k in 0..33 {
            assert!((re[k] - expected_re[k]).abs() < 1e-3);
            assert!((im[k] - expected_im[k]).abs() < 1e-3);
        }
    }

    #[proptest]
    fn inverse_restores_input(#[strategy(pvec(-1000.0f32..1000.0, 256))] input: Vec<f32>) {
        let mut fft = RealFft::new(256);
        let mut re = vec![0.0f32; 129];
        let mut im = vec![0.0f32; 129];
        let mut output = vec![0.0f32; 256];
        fft.forward(&input, &mut re, &mut im);
        fft.inverse(&re, &im, &mut output);
        for (o, i) in output.iter().zip(input.iter()) {
            assert!((o - i).abs() < 1e-2);
        }
    }
}
