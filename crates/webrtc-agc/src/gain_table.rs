//! Compressor gain table.
//!
//! The digital compressor looks gains up by the log2 of the signal
//! envelope (peak power per 1 ms sub-frame, full scale at 2^30). Entry `i`
//! holds the Q16 gain for an envelope of `2^(31 - i)`, that is an input
//! level of about `3.01 * (1 - i)` dBFS, so 32 entries span +3 to -90 dBFS.
//!
//! Up to the knee the gain is the compression gain; above it the output
//! is held at the target level with the limiter, or compressed 3:1
//! without it.
//!
//! C++ source: `webrtc/modules/audio_processing/agc/legacy/digital_agc.c`
//!             (`WebRtcAgc_CalculateGainTable`)

/// Number of table entries.
pub const GAIN_TABLE_LEN: usize = 32;
/// Unity gain.
pub const UNITY_Q16: u32 = 1 << 16;
/// Level step between table entries, in dB.
const DB_PER_ENTRY: f32 = 3.0103;
/// Slope above the knee when the limiter is off.
const COMPRESSION_RATIO: f32 = 3.0;

/// Input level of table entry `index`, in dBFS.
pub fn entry_level_dbfs(index: usize) -> f32 {
    DB_PER_ENTRY * (1.0 - index as f32)
}

/// Static compressor curve: gain in dB for an input level in dBFS.
pub fn compressor_gain_db(
    input_dbfs: f32,
    compression_gain_db: f32,
    target_level_dbfs: f32,
    limiter: bool,
) -> f32 {
    let knee = -target_level_dbfs - compression_gain_db;
    if input_dbfs <= knee {
        compression_gain_db
    } else if limiter {
        -target_level_dbfs - input_dbfs
    } else {
        -target_level_dbfs + (input_dbfs - knee) / COMPRESSION_RATIO - input_dbfs
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GainTable {
    gains_q16: [u32; GAIN_TABLE_LEN],
}

impl GainTable {
    pub fn new(compression_gain_db: u8, target_level_dbfs: u8, limiter: bool) -> Self {
        let gains_q16 = std::array::from_fn(|i| {
            let gain_db = compressor_gain_db(
                entry_level_dbfs(i),
                f32::from(compression_gain_db),
                f32::from(target_level_dbfs),
                limiter,
            );
            let linear = 10f64.powf(f64::from(gain_db) / 20.0) * f64::from(UNITY_Q16);
            linear.round().clamp(0.0, f64::from(u32::MAX)) as u32
        });
        Self { gains_q16 }
    }

    pub fn gains_q16(&self) -> &[u32; GAIN_TABLE_LEN] {
        &self.gains_q16
    }

    /// Gain for an envelope value, interpolated between the two entries
    /// that bracket it using the mantissa below its leading one.
    pub fn lookup(&self, envelope: u32) -> u32 {
        if envelope == 0 {
            return self.gains_q16[GAIN_TABLE_LEN - 1];
        }
        let zeros = envelope.leading_zeros() as usize;
        if zeros == 0 {
            return self.gains_q16[0];
        }
        let mantissa = u64::from((envelope << zeros) & 0x7fff_ffff);
        let quieter = i64::from(self.gains_q16[zeros]);
        let louder = i64::from(self.gains_q16[zeros - 1]);
        let gain = quieter + (((louder - quieter) * mantissa as i64) >> 31);
        gain.clamp(0, i64::from(u32::MAX)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_db(gain_q16: u32) -> f32 {
        20.0 * (gain_q16 as f32 / UNITY_Q16 as f32).log10()
    }

    #[test]
    fn quiet_input_gets_full_compression_gain() {
        let table = GainTable::new(9, 3, true);
        assert!((to_db(table.gains_q16()[GAIN_TABLE_LEN - 1]) - 9.0).abs() < 0.01);
        assert!((to_db(table.lookup(0)) - 9.0).abs() < 0.01);
    }

    #[test]
    fn gain_never_rises_with_level() {
        for limiter in [false, true] {
            let table = GainTable::new(20, 6, limiter);
            let gains = table.gains_q16();
            assert!(gains.windows(2).all(|w| w[0] <= w[1]), "limiter {limiter}");
        }
    }

    #[test]
    fn limiter_holds_target() {
        let table = GainTable::new(9, 3, true);
        // 0 dBFS input (entry 1) comes out at -3 dBFS.
        assert!((to_db(table.gains_q16()[1]) + 3.0).abs() < 0.01);
        let soft = GainTable::new(9, 3, false);
        assert!(soft.gains_q16()[1] > table.gains_q16()[1]);
    }

    #[test]
    fn zero_gain_is_unity_below_target() {
        let table = GainTable::new(0, 3, true);
        assert_eq!(table.gains_q16()[GAIN_TABLE_LEN - 1], UNITY_Q16);
    }

    #[test]
    fn lookup_interpolates_between_entries() {
        let table = GainTable::new(9, 3, true);
        let gains = table.gains_q16();
        // Exactly on an entry.
        assert_eq!(table.lookup(1 << 20), gains[11]);
        // Halfway in the mantissa lands between the neighbours.
        let mid = table.lookup((1 << 20) + (1 << 19));
        assert!(mid >= gains[10].min(gains[11]) && mid <= gains[10].max(gains[11]));
    }
}
