//! Fixed-point two-band QMF analysis and synthesis.
//!
//! Splits a 32 kHz 10 ms frame (320 samples) into a 0-8 kHz low band and
//! an 8-16 kHz high band of 160 samples each, and merges them back. Each
//! branch is a cascade of three first-order allpass sections working in
//! Q10 with Q16 coefficients, so the composite analysis/synthesis path is
//! itself allpass: magnitude is preserved and only a short delay is added.
//!
//! Ported from `common_audio/signal_processing/splitting_filter.c`.

use crate::audio_util::saturate_i16;

/// Number of 32-bit state words for one allpass cascade.
pub const QMF_STATE_SIZE: usize = 6;

/// Samples in a full-band 32 kHz 10 ms frame.
pub const FULL_BAND_FRAME_LENGTH: usize = 320;

/// Samples per band after the split.
pub const BAND_FRAME_LENGTH: usize = FULL_BAND_FRAME_LENGTH / 2;

/// Allpass coefficients (Q16) for the odd branch in analysis and the
/// difference branch in synthesis.
const ALL_PASS_FILTER_1: [u16; 3] = [6418, 36982, 57261];
/// Allpass coefficients (Q16) for the even branch in analysis and the sum
/// branch in synthesis.
const ALL_PASS_FILTER_2: [u16; 3] = [21333, 49062, 63010];

/// `c + a * b` with a Q16 unsigned coefficient.
#[inline]
fn scale_diff(coefficient: u16, diff: i32, c: i32) -> i32 {
    let product = (i64::from(diff) * i64::from(coefficient)) >> 16;
    c.wrapping_add(product as i32)
}

/// One first-order section `y[n] = x[n-1] + a * (x[n] - y[n-1])`.
fn allpass_section(
    input: &[i32],
    output: &mut [i32],
    coefficient: u16,
    state: &mut [i32],
) {
    let n = input.len();
    let diff = input[0].saturating_sub(state[1]);
    output[0] = scale_diff(coefficient, diff, state[0]);
    for k in 1..n {
        let diff = input[k].saturating_sub(output[k - 1]);
        output[k] = scale_diff(coefficient, diff, input[k - 1]);
    }
    state[0] = input[n - 1];
    state[1] = output[n - 1];
}

/// Three cascaded sections, alternating between the two buffers. The
/// result ends up in `out_data`; `in_data` is used as scratch.
fn allpass_qmf(
    in_data: &mut [i32],
    out_data: &mut [i32],
    coefficients: &[u16; 3],
    state: &mut [i32; QMF_STATE_SIZE],
) {
    debug_assert_eq!(in_data.len(), out_data.len());
    debug_assert!(!in_data.is_empty());
    allpass_section(in_data, out_data, coefficients[0], &mut state[0..2]);
    allpass_section(out_data, in_data, coefficients[1], &mut state[2..4]);
    allpass_section(in_data, out_data, coefficients[2], &mut state[4..6]);
}

/// Split `in_data` into `low_band` and `high_band`.
///
/// # Panics
///
/// Panics if the band slices are not half the length of `in_data`, or if
/// `in_data` is longer than [`FULL_BAND_FRAME_LENGTH`].
pub fn analysis_qmf(
    in_data: &[i16],
    low_band: &mut [i16],
    high_band: &mut [i16],
    filter_state1: &mut [i32; QMF_STATE_SIZE],
    filter_state2: &mut [i32; QMF_STATE_SIZE],
) {
    let band_length = in_data.len() / 2;
    assert!(band_length <= BAND_FRAME_LENGTH);
    assert_eq!(low_band.len(), band_length);
    assert_eq!(high_band.len(), band_length);

    let mut half_in1 = [0i32; BAND_FRAME_LENGTH];
    let mut half_in2 = [0i32; BAND_FRAME_LENGTH];
    let mut filter1 = [0i32; BAND_FRAME_LENGTH];
    let mut filter2 = [0i32; BAND_FRAME_LENGTH];

    // Even samples feed branch 2, odd samples branch 1, both in Q10.
    for (i, pair) in in_data.chunks_exact(2).enumerate() {
        half_in2[i] = i32::from(pair[0]) << 10;
        half_in1[i] = i32::from(pair[1]) << 10;
    }

    allpass_qmf(
        &mut half_in1[..band_length],
        &mut filter1[..band_length],
        &ALL_PASS_FILTER_1,
        filter_state1,
    );
    allpass_qmf(
        &mut half_in2[..band_length],
        &mut filter2[..band_length],
        &ALL_PASS_FILTER_2,
        filter_state2,
    );

    for i in 0..band_length {
        let low = (filter1[i].wrapping_add(filter2[i]).wrapping_add(1024)) >> 11;
        let high = (filter1[i].wrapping_sub(filter2[i]).wrapping_add(1024)) >> 11;
        low_band[i] = saturate_i16(low);
        high_band[i] = saturate_i16(high);
    }
}

/// Merge `low_band` and `high_band` into `out_data`.
///
/// # Panics
///
/// Panics if `out_data` is not twice the band length, or the bands are
/// longer than [`BAND_FRAME_LENGTH`].
pub fn synthesis_qmf(
    low_band: &[i16],
    high_band: &[i16],
    out_data: &mut [i16],
    filter_state1: &mut [i32; QMF_STATE_SIZE],
    filter_state2: &mut [i32; QMF_STATE_SIZE],
) {
    let band_length = low_band.len();
    assert!(band_length <= BAND_FRAME_LENGTH);
    assert_eq!(high_band.len(), band_length);
    assert_eq!(out_data.len(), band_length * 2);

    let mut half_in1 = [0i32; BAND_FRAME_LENGTH];
    let mut half_in2 = [0i32; BAND_FRAME_LENGTH];
    let mut filter1 = [0i32; BAND_FRAME_LENGTH];
    let mut filter2 = [0i32; BAND_FRAME_LENGTH];

    for i in 0..band_length {
        let low = i32::from(low_band[i]);
        let high = i32::from(high_band[i]);
        half_in1[i] = (low + high) << 10;
        half_in2[i] = (low - high) << 10;
    }

    allpass_qmf(
        &mut half_in1[..band_length],
        &mut filter1[..band_length],
        &ALL_PASS_FILTER_2,
        filter_state1,
    );
    allpass_qmf(
        &mut half_in2[..band_length],
        &mut filter2[..band_length],
        &ALL_PASS_FILTER_1,
        filter_state2,
    );

    for (i, pair) in out_data.chunks_exact_mut(2).enumerate() {
        pair[0] = saturate_i16(filter2[i].wrapping_add(512) >> 10);
        pair[1] = saturate_i16(filter1[i].wrapping_add(512) >> 10);
    }
}

/// Persistent analysis and synthesis state for one channel.
#[derive(Debug, Clone, Default)]
pub struct TwoBandsStates {
    pub analysis_state1: [i32; QMF_STATE_SIZE],
    pub analysis_state2: [i32; QMF_STATE_SIZE],
    pub synthesis_state1: [i32; QMF_STATE_SIZE],
    pub synthesis_state2: [i32; QMF_STATE_SIZE],
}

impl TwoBandsStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Split one channel's frame, advancing the analysis state.
    pub fn analysis(&mut self, in_data: &[i16], low_band: &mut [i16], high_band: &mut [i16]) {
        analysis_qmf(
            in_data,
            low_band,
            high_band,
            &mut self.analysis_state1,
            &mut self.analysis_state2,
        );
    }

    /// Merge one channel's bands, advancing the synthesis state.
    pub fn synthesis(&mut self, low_band: &[i16], high_band: &[i16], out_data: &mut [i16]) {
        synthesis_qmf(
            low_band,
            high_band,
            out_data,
            &mut self.synthesis_state1,
            &mut self.synthesis_state2,
        );
    }
}
