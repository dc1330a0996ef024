//! Interleaved 10 ms PCM frame exchanged with [`AudioProcessing`](crate::AudioProcessing).
//!
//! C++ source: `webrtc/modules/interface/module_common_types.h` (`AudioFrame`)

/// Voice activity attached to a frame by voice detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VadActivity {
    Active,
    Passive,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub sample_rate_hz: u32,
    pub num_channels: usize,
    pub samples_per_channel: usize,
    /// Interleaved samples, `num_channels * samples_per_channel` long.
    pub data: Vec<i16>,
    pub vad_activity: VadActivity,
}

impl AudioFrame {
    /// A silent 10 ms frame.
    pub fn new(sample_rate_hz: u32, num_channels: usize) -> Self {
        let samples_per_channel = sample_rate_hz as usize / 100;
        Self {
            sample_rate_hz,
            num_channels,
            samples_per_channel,
            data: vec![0; samples_per_channel * num_channels],
            vad_activity: VadActivity::Unknown,
        }
    }

    /// Wrap interleaved samples. `samples_per_channel` is derived from the
    /// data length.
    pub fn from_interleaved(sample_rate_hz: u32, num_channels: usize, data: Vec<i16>) -> Self {
        let samples_per_channel = data.len() / num_channels.max(1);
        Self {
            sample_rate_hz,
            num_channels,
            samples_per_channel,
            data,
            vad_activity: VadActivity::Unknown,
        }
    }

    /// Copy `samples` into every channel.
    pub fn fill_channels(&mut self, samples: &[i16]) {
        let channels = self.num_channels.max(1);
        for (frame, &s) in self.data.chunks_exact_mut(channels).zip(samples) {
            frame.fill(s);
        }
    }

    /// Samples of one channel.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = i16> + '_ {
        self.data
            .iter()
            .skip(channel)
            .step_by(self.num_channels.max(1))
            .copied()
    }
}
