//! High-pass filter for removing DC and low-frequency noise.
//!
//! A second-order IIR in Q12 fixed point with the feedback path split
//! into high and low 16-bit halves, run on the low band of each capture
//! channel.
//!
//! Ported from `modules/audio_processing/high_pass_filter_impl.cc`.

use derive_more::Debug;
use parking_lot::Mutex;

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing_impl::AudioProcessingImpl;
use crate::config::HighPassFilterConfig;
use crate::stream_config::ProcessingConfig;

/// `[b0, b1, b2, -a1, -a2]` in Q12 (feedback in Q14 halves).
const FILTER_COEFFICIENTS_8KHZ: [i16; 5] = [3798, -7596, 3798, 7807, -3733];
const FILTER_COEFFICIENTS: [i16; 5] = [4012, -8024, 4012, 8002, -3913];

const SATURATION_MAX: i32 = (1 << 27) - 1;
const SATURATION_MIN: i32 = -(1 << 27);

fn choose_coefficients(sample_rate_hz: u32) -> &'static [i16; 5] {
    if sample_rate_hz == 8000 {
        &FILTER_COEFFICIENTS_8KHZ
    } else {
        &FILTER_COEFFICIENTS
    }
}

/// State of one channel's filter.
#[derive(Debug, Clone)]
struct FilterState {
    /// `[y[n-1] hi, y[n-1] lo, y[n-2] hi, y[n-2] lo]`.
    y: [i16; 4],
    x: [i16; 2],
    ba: &'static [i16; 5],
}

impl FilterState {
    fn new(sample_rate_hz: u32) -> Self {
        Self {
            y: [0; 4],
            x: [0; 2],
            ba: choose_coefficients(sample_rate_hz),
        }
    }

    fn filter(&mut self, data: &mut [i16]) {
        let ba = self.ba.map(i32::from);
        for sample in data.iter_mut() {
            let y = self.y.map(i32::from);
            let x = self.x.map(i32::from);
            let input = i32::from(*sample);

            let mut tmp = (y[1] * ba[3]).wrapping_add(y[3] * ba[4]) >> 15;
            tmp = tmp.wrapping_add(y[0] * ba[3]).wrapping_add(y[2] * ba[4]);
            tmp = tmp.wrapping_shl(1);
            tmp = tmp
                .wrapping_add(input * ba[0])
                .wrapping_add(x[0] * ba[1])
                .wrapping_add(x[1] * ba[2]);

            self.x[1] = self.x[0];
            self.x[0] = *sample;

            self.y[2] = self.y[0];
            self.y[3] = self.y[1];
            self.y[0] = (tmp >> 13) as i16;
            self.y[1] = (tmp.wrapping_sub(i32::from(self.y[0]) << 13) << 2) as i16;

            let rounded = tmp.wrapping_add(2048).clamp(SATURATION_MIN, SATURATION_MAX);
            *sample = (rounded >> 12) as i16;
        }
    }
}

#[derive(Debug)]
pub(crate) struct HighPassFilterImpl {
    enabled: bool,
    #[debug(skip)]
    filters: Vec<FilterState>,
}

impl HighPassFilterImpl {
    pub(crate) fn new() -> Self {
        Self {
            enabled: false,
            filters: Vec::new(),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enable: bool, config: &ProcessingConfig) {
        if enable == self.enabled {
            return;
        }
        self.enabled = enable;
        self.initialize(config);
    }

    pub(crate) fn initialize(&mut self, config: &ProcessingConfig) {
        self.filters.clear();
        if self.enabled {
            let rate = config.input_stream().sample_rate_hz();
            self.filters
                .resize(config.output_stream().num_channels(), FilterState::new(rate));
        }
    }

    pub(crate) fn process_capture_audio(&mut self, capture: &mut AudioBuffer) {
        if !self.enabled {
            return;
        }
        for (ch, filter) in self.filters.iter_mut().enumerate().take(capture.num_channels()) {
            let (low, _) = capture.bands_mut(ch);
            filter.filter(low);
        }
    }

    pub(crate) fn config(&self) -> HighPassFilterConfig {
        HighPassFilterConfig {
            enabled: self.enabled,
        }
    }
}

/// Handle to the high-pass filter of an
/// [`AudioProcessing`](crate::AudioProcessing) instance.
#[derive(Debug, Clone, Copy)]
pub struct HighPassFilter<'a> {
    #[debug(skip)]
    pub(crate) apm: &'a Mutex<AudioProcessingImpl>,
}

impl HighPassFilter<'_> {
    pub fn enable(&self, enable: bool) -> Result<(), crate::Error> {
        let mut apm = self.apm.lock();
        let apm = &mut *apm;
        apm.hpf.set_enabled(enable, &apm.config);
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.apm.lock().hpf.is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudioFrame;

    fn run(rate: u32, input: &[i16], frames: usize) -> Vec<i16> {
        let cfg = ProcessingConfig::new(rate, 1, 1, 1);
        let mut hpf = HighPassFilterImpl::new();
        hpf.set_enabled(true, &cfg);
        let mut buffer = AudioBuffer::new(cfg.input_stream(), 1);
        let mut out = AudioFrame::new(rate, 1);
        for _ in 0..frames {
            let frame = AudioFrame::from_interleaved(rate, 1, input.to_vec());
            buffer.copy_from_interleaved_i16(&frame, 1);
            hpf.process_capture_audio(&mut buffer);
            buffer.copy_to_interleaved_i16(&mut out);
        }
        out.data
    }

    #[test]
    fn removes_dc() {
        for rate in [8000, 16000] {
            let input = vec![1000i16; rate as usize / 100];
            let out = run(rate, &input, 100);
            for s in out {
                assert!(s.abs() < 20, "rate {rate}: residual {s}");
            }
        }
    }

    #[test]
    fn silence_stays_silent() {
        let out = run(16000, &[0; 160], 3);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn passes_mid_band_tone() {
        let rate = 16000u32;
        let input: Vec<i16> = (0..160)
            .map(|n| {
                let t = n as f64 / rate as f64;
                (8000.0 * (2.0 * std::f64::consts::PI * 1000.0 * t).sin()) as i16
            })
            .collect();
        let out = run(rate, &input, 20);
        let peak = out.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        assert!(peak > 7000, "peak {peak}");
    }

    #[test]
    fn coefficient_choice() {
        assert_eq!(choose_coefficients(8000), &FILTER_COEFFICIENTS_8KHZ);
        assert_eq!(choose_coefficients(16000), &FILTER_COEFFICIENTS);
        assert_eq!(choose_coefficients(32000), &FILTER_COEFFICIENTS);
    }

    #[test]
    fn disabled_filter_is_bypassed() {
        let cfg = ProcessingConfig::new(16000, 1, 1, 1);
        let mut hpf = HighPassFilterImpl::new();
        let mut buffer = AudioBuffer::new(cfg.input_stream(), 1);
        let frame = AudioFrame::from_interleaved(16000, 1, vec![500; 160]);
        buffer.copy_from_interleaved_i16(&frame, 1);
        hpf.process_capture_audio(&mut buffer);
        assert!(buffer.channel(0).iter().all(|&s| s == 500));
    }
}
