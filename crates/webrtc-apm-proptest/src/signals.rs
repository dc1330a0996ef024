//! Deterministic far-end and near-end PCM for scenario tests.
//!
//! The far end is a syllabic, speech-like signal: a few harmonics of a
//! slowly gliding pitch under an on/off envelope, plus low noise. The
//! near end carries a delayed and attenuated copy of the far end (the
//! echo), its own talker in a separate time slot, background noise, and
//! occasional clipped bursts so that saturation detection has something
//! to find. Everything is driven by a seeded xorshift generator, so the
//! same parameters always give the same samples.

use std::collections::VecDeque;
use std::f64::consts::PI;

/// Seeded xorshift32.
#[derive(Debug, Clone)]
pub struct Xorshift {
    state: u32,
}

impl Xorshift {
    pub fn new(seed: u32) -> Self {
        Self { state: seed.max(1) }
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in `[-amplitude, amplitude]`.
    pub fn noise(&mut self, amplitude: i32) -> i32 {
        if amplitude <= 0 {
            return 0;
        }
        let span = (2 * amplitude + 1) as u32;
        (self.next_u32() % span) as i32 - amplitude
    }
}

/// Harmonic voice with a 4 Hz syllable envelope that is silent outside
/// its active windows.
#[derive(Debug, Clone)]
struct Talker {
    sample_rate_hz: f64,
    pitch_hz: f64,
    amplitude: f64,
    phase: f64,
    /// Active during `[on, on + len)` of every `period` samples.
    period: usize,
    on: usize,
    len: usize,
}

impl Talker {
    fn sample(&mut self, n: usize) -> f64 {
        let pos = n % self.period;
        if pos < self.on || pos >= self.on + self.len {
            return 0.0;
        }
        let t = n as f64 / self.sample_rate_hz;
        let pitch = self.pitch_hz * (1.0 + 0.1 * (2.0 * PI * 0.7 * t).sin());
        self.phase += 2.0 * PI * pitch / self.sample_rate_hz;
        let envelope = (PI * 4.0 * t).sin().abs();
        let voice = [1.0, 0.5, 0.3, 0.15]
            .iter()
            .enumerate()
            .map(|(k, a)| a * ((k + 1) as f64 * self.phase).sin())
            .sum::<f64>();
        self.amplitude * envelope * voice
    }
}

fn saturate(x: f64) -> i16 {
    x.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Generator of matched 10 ms far/near frame pairs.
#[derive(Debug, Clone)]
pub struct SignalPair {
    sample_rate_hz: u32,
    far_channels: usize,
    near_channels: usize,
    far_talker: Talker,
    near_talker: Talker,
    rng: Xorshift,
    echo_path: VecDeque<f64>,
    echo_gain: f64,
    /// Samples produced so far, per channel.
    position: usize,
}

impl SignalPair {
    /// Echo delay of the generated near end.
    pub const ECHO_DELAY_MS: usize = 60;

    pub fn new(sample_rate_hz: u32, far_channels: usize, near_channels: usize, seed: u32) -> Self {
        let rate = f64::from(sample_rate_hz);
        let samples_per_second = sample_rate_hz as usize;
        let delay = Self::ECHO_DELAY_MS * samples_per_second / 1000;
        Self {
            sample_rate_hz,
            far_channels,
            near_channels,
            far_talker: Talker {
                sample_rate_hz: rate,
                pitch_hz: 140.0,
                amplitude: 7000.0,
                phase: 0.0,
                period: 4 * samples_per_second,
                on: 0,
                len: 2 * samples_per_second,
            },
            near_talker: Talker {
                sample_rate_hz: rate,
                pitch_hz: 210.0,
                amplitude: 5000.0,
                phase: 0.0,
                period: 4 * samples_per_second,
                on: 2 * samples_per_second + samples_per_second / 4,
                len: samples_per_second + samples_per_second / 2,
            },
            rng: Xorshift::new(seed),
            echo_path: std::iter::repeat_n(0.0, delay).collect(),
            echo_gain: 0.5,
            position: 0,
        }
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Samples per channel in one frame.
    pub fn frame_size(&self) -> usize {
        self.sample_rate_hz as usize / 100
    }

    /// The next far and near frames, interleaved.
    pub fn next_frames(&mut self) -> (Vec<i16>, Vec<i16>) {
        let n = self.frame_size();
        let samples_per_second = self.sample_rate_hz as usize;
        let mut far = Vec::with_capacity(n * self.far_channels);
        let mut near = Vec::with_capacity(n * self.near_channels);
        for _ in 0..n {
            let k = self.position;
            let far_sample = self.far_talker.sample(k) + f64::from(self.rng.noise(30));
            self.echo_path.push_back(far_sample);
            let echo = self.echo_path.pop_front().unwrap_or(0.0) * self.echo_gain;

            // A 20 ms burst every 3 s drives the microphone into clipping.
            let burst = if k % (3 * samples_per_second) < samples_per_second / 50 {
                40000.0 * if (k / 8) % 2 == 0 { 1.0 } else { -1.0 }
            } else {
                0.0
            };
            let near_sample = echo
                + self.near_talker.sample(k)
                + burst
                + f64::from(self.rng.noise(60));

            let far_i16 = saturate(far_sample);
            far.extend(std::iter::repeat_n(far_i16, self.far_channels));
            let near_i16 = saturate(near_sample);
            for ch in 0..self.near_channels {
                // Keep channels distinct but correlated.
                let offset = if ch == 0 { 0 } else { self.rng.noise(20) };
                near.push(near_i16.saturating_add(offset as i16));
            }
            self.position += 1;
        }
        (far, near)
    }
}
