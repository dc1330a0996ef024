//! Shape of one audio direction: rate and channel count, 10 ms frames.
//!
//! Ported from `api/audio/audio_processing.h` (StreamConfig class).

use crate::audio_frame::AudioFrame;
use crate::error::Error;

/// Rates the processing chain accepts.
pub const SUPPORTED_SAMPLE_RATES: [u32; 3] = [8000, 16000, 32000];
/// Rate at which the signal is split into two bands.
pub const SPLIT_THRESHOLD_HZ: u32 = 32000;
pub const MAX_CHANNELS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    sample_rate_hz: u32,
    num_channels: usize,
}

impl StreamConfig {
    pub fn new(sample_rate_hz: u32, num_channels: usize) -> Self {
        Self {
            sample_rate_hz,
            num_channels,
        }
    }

    #[inline]
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Samples per channel in a 10 ms frame.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.sample_rate_hz as usize / 100
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.num_channels * self.num_frames()
    }

    /// Whether the stream is processed as two half-rate bands.
    #[inline]
    pub fn is_split(&self) -> bool {
        self.sample_rate_hz == SPLIT_THRESHOLD_HZ
    }

    /// Rate of the band the components run on.
    #[inline]
    pub fn split_rate_hz(&self) -> u32 {
        if self.is_split() {
            self.sample_rate_hz / 2
        } else {
            self.sample_rate_hz
        }
    }

    /// Samples per channel in the band the components run on.
    #[inline]
    pub fn num_band_frames(&self) -> usize {
        self.split_rate_hz() as usize / 100
    }

    /// Check a frame against this shape: rate, then channel count, then
    /// length. Nothing is modified.
    pub fn check_frame(&self, frame: &AudioFrame) -> Result<(), Error> {
        if frame.sample_rate_hz != self.sample_rate_hz {
            return Err(Error::BadSampleRate);
        }
        if frame.num_channels != self.num_channels {
            return Err(Error::BadNumberChannels);
        }
        if frame.samples_per_channel != self.num_frames()
            || frame.data.len() != frame.samples_per_channel * frame.num_channels
        {
            return Err(Error::BadDataLength);
        }
        Ok(())
    }
}

/// Shapes of the three streams one processing instance handles.
///
/// Input and output share the capture rate. The output may carry fewer
/// channels than the input; the reverse stream is always mixed to mono
/// or kept stereo at the capture rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingConfig {
    input: StreamConfig,
    output: StreamConfig,
    reverse: StreamConfig,
}

impl ProcessingConfig {
    pub fn new(
        sample_rate_hz: u32,
        num_input_channels: usize,
        num_output_channels: usize,
        num_reverse_channels: usize,
    ) -> Self {
        Self {
            input: StreamConfig::new(sample_rate_hz, num_input_channels),
            output: StreamConfig::new(sample_rate_hz, num_output_channels),
            reverse: StreamConfig::new(sample_rate_hz, num_reverse_channels),
        }
    }

    #[inline]
    pub fn sample_rate_hz(&self) -> u32 {
        self.input.sample_rate_hz()
    }

    #[inline]
    pub fn input_stream(&self) -> &StreamConfig {
        &self.input
    }

    #[inline]
    pub fn output_stream(&self) -> &StreamConfig {
        &self.output
    }

    #[inline]
    pub fn reverse_stream(&self) -> &StreamConfig {
        &self.reverse
    }

    /// Validate the shape: a supported rate, 1..=2 input channels, an
    /// output count between one and the input count, 1..=2 reverse
    /// channels. Any violation is [`Error::BadParameter`].
    pub fn validate(&self) -> Result<(), Error> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate_hz()) {
            return Err(Error::BadParameter);
        }
        let input = self.input.num_channels();
        let output = self.output.num_channels();
        let reverse = self.reverse.num_channels();
        if !(1..=MAX_CHANNELS).contains(&input)
            || !(1..=input).contains(&output)
            || !(1..=MAX_CHANNELS).contains(&reverse)
        {
            return Err(Error::BadParameter);
        }
        Ok(())
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self::new(16000, 1, 1, 1)
    }
}
