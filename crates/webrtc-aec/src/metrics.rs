//! Echo quality metrics: ERL, ERLE, RERL and A-NLP, plus delay statistics.
//!
//! Block energies are accumulated over one second of audio; at the end of
//! each second with an active far end the four levels are turned into dB
//! ratios and folded into running statistics.
//!
//! C++ source: `webrtc/modules/audio_processing/aec/aec_core.c`
//!             (`UpdateMetrics`, `WebRtcAec_GetDelayMetricsCore`)

use crate::config::BLOCK_LEN;

/// Value reported for statistics with no data yet.
pub const NO_DATA_DB: f32 = -100.0;

/// Mean far-end power per sample below which a second is not measured.
const FAR_ACTIVE_LEVEL: f32 = 100.0;

/// Instant, average, maximum and minimum of a dB quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistic {
    pub instant: f32,
    pub average: f32,
    pub maximum: f32,
    pub minimum: f32,
}

impl Default for Statistic {
    fn default() -> Self {
        Self {
            instant: NO_DATA_DB,
            average: NO_DATA_DB,
            maximum: NO_DATA_DB,
            minimum: NO_DATA_DB,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RunningStatistic {
    stat: Statistic,
    sum: f64,
    count: u32,
}

impl RunningStatistic {
    fn update(&mut self, value: f32) {
        self.sum += f64::from(value);
        self.count += 1;
        let first = self.count == 1;
        self.stat.instant = value;
        self.stat.average = (self.sum / f64::from(self.count)) as f32;
        self.stat.maximum = if first { value } else { self.stat.maximum.max(value) };
        self.stat.minimum = if first { value } else { self.stat.minimum.min(value) };
    }
}

/// Echo metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EchoMetrics {
    /// Residual echo return loss (ERL + ERLE).
    pub residual_echo_return_loss: Statistic,
    /// Echo return loss: far-end level over near-end level.
    pub echo_return_loss: Statistic,
    /// Echo return loss enhancement: near-end level over output level.
    pub echo_return_loss_enhancement: Statistic,
    /// Attenuation by the nonlinear processor alone.
    pub a_nlp: Statistic,
}

/// Delay statistics relative to the reported stream delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayMetrics {
    pub median_ms: i32,
    pub std_ms: i32,
}

impl DelayMetrics {
    /// Reported when no delay estimate has been made.
    pub const UNKNOWN: Self = Self {
        median_ms: -1,
        std_ms: -1,
    };
}

fn to_db(energy_per_sample: f32) -> f32 {
    10.0 * (energy_per_sample + 1e-10).log10()
}

/// Accumulates per-block energies and publishes metrics once per second.
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    blocks_per_second: usize,
    block_count: usize,
    far: f64,
    near: f64,
    linear_out: f64,
    output: f64,
    erl: RunningStatistic,
    erle: RunningStatistic,
    rerl: RunningStatistic,
    a_nlp: RunningStatistic,
}

impl MetricsAccumulator {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            blocks_per_second: (sample_rate_hz as usize / BLOCK_LEN).max(1),
            block_count: 0,
            far: 0.0,
            near: 0.0,
            linear_out: 0.0,
            output: 0.0,
            erl: RunningStatistic::default(),
            erle: RunningStatistic::default(),
            rerl: RunningStatistic::default(),
            a_nlp: RunningStatistic::default(),
        }
    }

    pub fn reset(&mut self) {
        let blocks_per_second = self.blocks_per_second;
        *self = Self::new(0);
        self.blocks_per_second = blocks_per_second;
    }

    /// Add one block of far, near, linear-filter output and final output.
    pub fn add_block(&mut self, far: &[f32], near: &[f32], linear_out: &[f32], output: &[f32]) {
        let energy = |x: &[f32]| x.iter().map(|&v| f64::from(v) * f64::from(v)).sum::<f64>();
        self.far += energy(far);
        self.near += energy(near);
        self.linear_out += energy(linear_out);
        self.output += energy(output);
        self.block_count += 1;
        if self.block_count < self.blocks_per_second {
            return;
        }

        let samples = (self.block_count * BLOCK_LEN) as f64;
        let far = (self.far / samples) as f32;
        if far > FAR_ACTIVE_LEVEL {
            let far_db = to_db(far);
            let near_db = to_db((self.near / samples) as f32);
            let linear_db = to_db((self.linear_out / samples) as f32);
            let output_db = to_db((self.output / samples) as f32);
            let erl = far_db - near_db;
            let erle = near_db - output_db;
            self.erl.update(erl);
            self.erle.update(erle);
            self.rerl.update(erl + erle);
            self.a_nlp.update(linear_db - output_db);
        }
        self.block_count = 0;
        self.far = 0.0;
        self.near = 0.0;
        self.linear_out = 0.0;
        self.output = 0.0;
    }

    pub fn metrics(&self) -> EchoMetrics {
        EchoMetrics {
            residual_echo_return_loss: self.rerl.stat,
            echo_return_loss: self.erl.stat,
            echo_return_loss_enhancement: self.erle.stat,
            a_nlp: self.a_nlp.stat,
        }
    }
}

/// Histogram of delay estimates, in blocks.
#[derive(Debug, Clone)]
pub struct DelayHistogram {
    counts: Vec<u32>,
    ms_per_block: f32,
}

impl DelayHistogram {
    pub fn new(num_blocks: usize, sample_rate_hz: u32) -> Self {
        Self {
            counts: vec![0; num_blocks.max(1)],
            ms_per_block: BLOCK_LEN as f32 * 1000.0 / sample_rate_hz.max(1) as f32,
        }
    }

    pub fn reset(&mut self) {
        self.counts.fill(0);
    }

    pub fn record(&mut self, delay_blocks: usize) {
        let last = self.counts.len() - 1;
        self.counts[delay_blocks.min(last)] += 1;
    }

    /// Median and standard deviation since the last call, then clear.
    pub fn take_metrics(&mut self) -> DelayMetrics {
        let total: u32 = self.counts.iter().sum();
        if total == 0 {
            return DelayMetrics::UNKNOWN;
        }
        let mut cumulative = 0;
        let mut median = 0;
        for (i, &c) in self.counts.iter().enumerate() {
            cumulative += c;
            if 2 * cumulative >= total {
                median = i;
                break;
            }
        }
        let variance = self
            .counts
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let d = i as f32 - median as f32;
                c as f32 * d * d
            })
            .sum::<f32>()
            / total as f32;
        self.reset();
        DelayMetrics {
            median_ms: (median as f32 * self.ms_per_block).round() as i32,
            std_ms: (variance.sqrt() * self.ms_per_block).round() as i32,
        }
    }
}
