//! PCM comparison utilities for verifying processed output.

use std::fmt;

/// Result of comparing two sample buffers.
#[derive(Debug)]
pub struct ComparisonResult {
    pub max_abs_diff: i32,
    pub max_abs_diff_index: usize,
    pub mean_abs_diff: f64,
    pub mismatches: usize,
    pub total: usize,
}

impl fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_abs_diff={} (at index {}), mean_abs_diff={:.3}, mismatches={}/{}",
            self.max_abs_diff,
            self.max_abs_diff_index,
            self.mean_abs_diff,
            self.mismatches,
            self.total,
        )
    }
}

/// Compare two i16 slices, returning detailed statistics.
pub fn compare_i16(actual: &[i16], expected: &[i16], tolerance: i32) -> ComparisonResult {
    assert_eq!(actual.len(), expected.len(), "Length mismatch");
    let total = actual.len();
    let mut max_abs_diff = 0;
    let mut max_abs_diff_index = 0;
    let mut sum_abs_diff = 0i64;
    let mut mismatches = 0;

    for (i, (&a, &e)) in actual.iter().zip(expected.iter()).enumerate() {
        let diff = (i32::from(a) - i32::from(e)).abs();
        sum_abs_diff += i64::from(diff);
        if diff > max_abs_diff {
            max_abs_diff = diff;
            max_abs_diff_index = i;
        }
        if diff > tolerance {
            mismatches += 1;
        }
    }

    ComparisonResult {
        max_abs_diff,
        max_abs_diff_index,
        mean_abs_diff: if total > 0 {
            sum_abs_diff as f64 / total as f64
        } else {
            0.0
        },
        mismatches,
        total,
    }
}

/// Assert two i16 slices are equal within an absolute tolerance.
pub fn assert_i16_near(actual: &[i16], expected: &[i16], tolerance: i32) {
    let result = compare_i16(actual, expected, tolerance);
    assert!(
        result.mismatches == 0,
        "i16 comparison failed: {result}\n  actual[{}]={}, expected[{}]={}",
        result.max_abs_diff_index,
        actual[result.max_abs_diff_index],
        result.max_abs_diff_index,
        expected[result.max_abs_diff_index],
    );
}

/// Assert two i16 slices are bit-exact.
pub fn assert_i16_exact(actual: &[i16], expected: &[i16]) {
    assert_eq!(actual.len(), expected.len(), "Length mismatch");
    for (i, (&a, &e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(a, e, "Mismatch at index {i}: actual={a}, expected={e}");
    }
}

/// Every sample of `samples` within `tolerance` of `value`.
pub fn assert_all_near(samples: &[i16], value: i16, tolerance: i32) {
    for (i, &s) in samples.iter().enumerate() {
        let diff = (i32::from(s) - i32::from(value)).abs();
        assert!(
            diff <= tolerance,
            "Sample {i} out of range: actual={s}, expected={value}±{tolerance}",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_identical_passes() {
        let a = [1i16, 2, 3];
        assert_i16_near(&a, &a, 0);
    }

    #[test]
    fn near_within_tolerance_passes() {
        let a = [100i16, -200, 300];
        let b = [102i16, -199, 297];
        assert_i16_near(&a, &b, 3);
    }

    #[test]
    #[should_panic(expected = "i16 comparison failed")]
    fn near_beyond_tolerance_fails() {
        let a = [1i16, 2, 3];
        let b = [1i16, 9, 3];
        assert_i16_near(&a, &b, 4);
    }

    #[test]
    fn compare_i16_statistics() {
        let a = [10i16, 20, 30, 40];
        let b = [14i16, 20, 32, 40];
        let result = compare_i16(&a, &b, 3);
        assert_eq!(result.max_abs_diff, 4);
        assert_eq!(result.max_abs_diff_index, 0);
        assert_eq!(result.mismatches, 1);
        assert_eq!(result.total, 4);
        assert!((result.mean_abs_diff - 1.5).abs() < 1e-9);
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let result = compare_i16(&[i16::MIN], &[i16::MAX], 0);
        assert_eq!(result.max_abs_diff, 65535);
    }

    #[test]
    fn i16_exact_passes() {
        let a = [0i16, 1000, -1000, i16::MAX, i16::MIN];
        assert_i16_exact(&a, &a);
    }

    #[test]
    #[should_panic(expected = "Mismatch at index 1")]
    fn i16_exact_detects_diff() {
        assert_i16_exact(&[0i16, 1000], &[0i16, 1001]);
    }

    #[test]
    #[should_panic(expected = "Sample 2 out of range")]
    fn all_near_reports_first_outlier() {
        assert_all_near(&[100, 98, 90], 100, 4);
    }

    #[test]
    fn empty_slices_pass() {
        assert_i16_near(&[], &[], 0);
        assert_i16_exact(&[], &[]);
        assert_all_near(&[], 0, 0);
    }
}
