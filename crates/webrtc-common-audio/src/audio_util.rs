//! Integer sample helpers shared by the fixed-point and float DSP crates.
//!
//! # Format conventions
//!
//! | Name      | Type    | Range                          |
//! |-----------|---------|--------------------------------|
//! | S16       | `i16`   | \[-32768, 32767\]              |
//! | FloatS16  | `f32`   | \[-32768.0, 32768.0\]          |
//! | Q-format  | `i32`   | S16 scaled by `1 << q`         |

// ── Scalar conversions ──────────────────────────────────────────────

/// Saturate a 32-bit value into the S16 range.
#[inline]
pub fn saturate_i16(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Saturate a 64-bit value into the 32-bit range.
#[inline]
pub fn saturate_i32(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Convert a single FloatS16 sample to S16, rounding to nearest.
#[inline]
pub fn float_s16_to_s16(v: f32) -> i16 {
    let v = v.clamp(-32768.0, 32767.0);
    (v + f32::copysign(0.5, v)) as i16
}

/// Convert a dB value to a linear ratio.
#[inline]
pub fn db_to_ratio(v: f32) -> f32 {
    10.0_f32.powf(v / 20.0)
}

/// Number of left shifts needed to normalize `v` so that bit 30 is the
/// most significant non-sign bit. Zero normalizes to 0.
#[inline]
pub fn norm_w32(v: i32) -> u32 {
    if v == 0 {
        return 0;
    }
    let magnitude = if v < 0 { !v } else { v };
    magnitude.leading_zeros() - 1
}

/// Number of left shifts needed to normalize an unsigned value so that
/// bit 31 is set. Zero normalizes to 0.
#[inline]
pub fn norm_u32(v: u32) -> u32 {
    if v == 0 { 0 } else { v.leading_zeros() }
}

// ── Slice helpers ───────────────────────────────────────────────────

/// Largest absolute sample value, saturated to `i16::MAX`.
pub fn max_abs_i16(data: &[i16]) -> i16 {
    data.iter()
        .map(|&s| i32::from(s).abs())
        .max()
        .map_or(0, saturate_i16)
}

/// Sum of squares of `data`.
pub fn energy_i16(data: &[i16]) -> i64 {
    data.iter().map(|&s| i64::from(s) * i64::from(s)).sum()
}

/// Copy channel `channel` of an interleaved buffer into `dest`.
///
/// # Panics
///
/// Panics if `interleaved` holds fewer than `dest.len() * num_channels`
/// samples.
pub fn deinterleave_channel<T: Copy>(
    interleaved: &[T],
    num_channels: usize,
    channel: usize,
    dest: &mut [T],
) {
    debug_assert!(channel < num_channels);
    assert!(interleaved.len() >= dest.len() * num_channels);
    for (d, frame) in dest.iter_mut().zip(interleaved.chunks_exact(num_channels)) {
        *d = frame[channel];
    }
}

/// Write `src` into channel `channel` of an interleaved buffer.
///
/// # Panics
///
/// Panics if `interleaved` holds fewer than `src.len() * num_channels`
/// samples.
pub fn interleave_channel<T: Copy>(
    src: &[T],
    num_channels: usize,
    channel: usize,
    interleaved: &mut [T],
) {
    debug_assert!(channel < num_channels);
    assert!(interleaved.len() >= src.len() * num_channels);
    for (frame, &s) in interleaved.chunks_exact_mut(num_channels).zip(src) {
        frame[channel] = s;
    }
}

/// Average interleaved int16 channels into a mono buffer.
pub fn downmix_interleaved_to_mono_i16(
    interleaved: &[i16],
    num_channels: usize,
    mono: &mut [i16],
) {
    debug_assert!(num_channels > 0);
    if num_channels == 1 {
        let len = mono.len().min(interleaved.len());
        mono[..len].copy_from_slice(&interleaved[..len]);
        return;
    }
    let n = num_channels as i32;
    for (m, frame) in mono.iter_mut().zip(interleaved.chunks_exact(num_channels)) {
        let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
        *m = (sum / n) as i16;
    }
}

/// Average deinterleaved int16 channels into `mono`.
pub fn downmix_channels_to_mono_i16(channels: &[&[i16]], mono: &mut [i16]) {
    debug_assert!(!channels.is_empty());
    let n = channels.len() as i32;
    for (i, m) in mono.iter_mut().enumerate() {
        let sum: i32 = channels.iter().map(|c| i32::from(c[i])).sum();
        *m = (sum / n) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturate_i16_clamps() {
        assert_eq!(saturate_i16(40000), i16::MAX);
        assert_eq!(saturate_i16(-40000), i16::MIN);
        assert_eq!(saturate_i16(-5), -5);
    }

    #[test]
    fn float_s16_to_s16_known_values() {
        assert_eq!(float_s16_to_s16(0.4), 0);
        assert_eq!(float_s16_to_s16(0.6), 1);
        assert_eq!(float_s16_to_s16(-0.6), -1);
        assert_eq!(float_s16_to_s16(40000.0), i16::MAX);
        assert_eq!(float_s16_to_s16(-40000.0), i16::MIN);
    }

    #[test]
    fn norm_w32_known_values() {
        assert_eq!(norm_w32(0), 0);
        assert_eq!(norm_w32(1), 30);
        assert_eq!(norm_w32(-1), 31);
        assert_eq!(norm_w32(0x4000_0000), 0);
        assert_eq!(norm_w32(i32::MIN), 0);
        assert_eq!(norm_w32(32767), 16);
    }

    #[test]
    fn norm_u32_known_values() {
        assert_eq!(norm_u32(0), 0);
        assert_eq!(norm_u32(1), 31);
        assert_eq!(norm_u32(u32::MAX), 0);
    }

    #[test]
    fn max_abs_saturates_min() {
        assert_eq!(max_abs_i16(&[1, -3, 2]), 3);
        assert_eq!(max_abs_i16(&[i16::MIN]), i16::MAX);
        assert_eq!(max_abs_i16(&[]), 0);
    }

    #[test]
    fn interleaving_stereo() {
        let interleaved = [1i16, 10, 2, 20, 3, 30];
        let mut left = [0i16; 3];
        let mut right = [0i16; 3];
        deinterleave_channel(&interleaved, 2, 0, &mut left);
        deinterleave_channel(&interleaved, 2, 1, &mut right);
        assert_eq!(left, [1, 2, 3]);
        assert_eq!(right, [10, 20, 30]);

        let mut out = [0i16; 6];
        interleave_channel(&left, 2, 0, &mut out);
        interleave_channel(&right, 2, 1, &mut out);
        assert_eq!(out, interleaved);
    }

    #[test]
    fn downmix_stereo() {
        let interleaved = [100i16, 200, -100, -300];
        let mut mono = [0i16; 2];
        downmix_interleaved_to_mono_i16(&interleaved, 2, &mut mono);
        assert_eq!(mono, [150, -200]);
    }

    #[test]
    fn downmix_channels() {
        let a = [10i16, 20];
        let b = [30i16, -20];
        let mut mono = [0i16; 2];
        downmix_channels_to_mono_i16(&[&a, &b], &mut mono);
        assert_eq!(mono, [20, 0]);
    }

    #[test]
    fn energy_sums_squares() {
        assert_eq!(energy_i16(&[3, -4]), 25);
    }
}
