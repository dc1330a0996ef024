//! Digital compressor: envelope tracking per 1 ms sub-frame, gain lookup
//! and per-sample gain interpolation.
//!
//! C++ source: `webrtc/modules/audio_processing/agc/legacy/digital_agc.c`
//! (`WebRtcAgc_ProcessDigital`); sub-frame interpolation as in
//! `agc2/limiter.cc`.

use derive_more::Debug;

use crate::gain_table::{GainTable, UNITY_Q16};

/// Sub-frames per 10 ms frame.
pub const SUB_FRAMES: usize = 10;
/// Envelope release per sub-frame, Q15 (about 0.99).
const ENVELOPE_RELEASE_Q15: u64 = 32_440;

fn apply_gain(sample: i16, gain_q16: u32) -> i16 {
    let scaled = (i64::from(sample) * i64::from(gain_q16)) >> 16;
    scaled.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}

#[derive(Debug)]
pub struct DigitalAgc {
    #[debug(skip)]
    table: GainTable,
    envelope: u32,
    last_gain_q16: u32,
    #[debug(skip)]
    per_sample_gain: Vec<u32>,
}

impl DigitalAgc {
    pub fn new(table: GainTable) -> Self {
        Self {
            table,
            envelope: 0,
            last_gain_q16: UNITY_Q16,
            per_sample_gain: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.envelope = 0;
        self.last_gain_q16 = UNITY_Q16;
    }

    pub fn set_table(&mut self, table: GainTable) {
        self.table = table;
    }

    pub fn table(&self) -> &GainTable {
        &self.table
    }

    /// Gain applied at the end of the last frame, Q16.
    pub fn last_gain_q16(&self) -> u32 {
        self.last_gain_q16
    }

    /// Compress one frame. The gains computed on the low band are applied
    /// to the high band too.
    ///
    /// The frame length must be a multiple of [`SUB_FRAMES`].
    pub fn process(&mut self, low: &mut [i16], high: Option<&mut [i16]>) {
        let sub_len = low.len() / SUB_FRAMES;
        if sub_len == 0 {
            return;
        }
        self.per_sample_gain.clear();
        for sub in low.chunks(sub_len).take(SUB_FRAMES) {
            let peak_power = sub
                .iter()
                .map(|&s| (i32::from(s) * i32::from(s)) as u32)
                .max()
                .unwrap_or(0);
            let released = ((u64::from(self.envelope) * ENVELOPE_RELEASE_Q15) >> 15) as u32;
            self.envelope = peak_power.max(released);

            let start = self.last_gain_q16;
            let end = self.table.lookup(self.envelope);
            if end < start {
                // Attack: take the lower gain over the whole sub-frame.
                self.per_sample_gain.extend(std::iter::repeat_n(end, sub_len));
            } else {
                let step = i64::from(end - start);
                self.per_sample_gain.extend(
                    (0..sub_len).map(|j| (i64::from(start) + step * j as i64 / sub_len as i64) as u32),
                );
            }
            self.last_gain_q16 = end;
        }

        for (s, &g) in low.iter_mut().zip(&self.per_sample_gain) {
            *s = apply_gain(*s, g);
        }
        if let Some(high) = high {
            for (s, &g) in high.iter_mut().zip(&self.per_sample_gain) {
                *s = apply_gain(*s, g);
            }
        }
    }
}
