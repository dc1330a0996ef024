//! Audio frame generators for property-based testing.
//!
//! Provides both strategy functions (for use with `#[strategy(...)]`) and
//! `Arbitrary`-deriving structs for common audio test inputs. Rates and
//! channel counts are limited to what the processing module accepts.

use proptest::prelude::*;
use test_strategy::Arbitrary;

/// A sample rate the processing module accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum SampleRate {
    #[weight(1)]
    Hz8000,
    #[weight(1)]
    Hz16000,
    #[weight(1)]
    Hz32000,
}

impl SampleRate {
    pub const ALL: [Self; 3] = [Self::Hz8000, Self::Hz16000, Self::Hz32000];

    pub fn hz(self) -> u32 {
        match self {
            Self::Hz8000 => 8000,
            Self::Hz16000 => 16000,
            Self::Hz32000 => 32000,
        }
    }

    /// Number of samples in a 10ms frame at this rate.
    pub fn frame_size(self) -> usize {
        (self.hz() / 100) as usize
    }

    /// Whether frames at this rate are split into two bands.
    pub fn is_split(self) -> bool {
        self == Self::Hz32000
    }
}

/// A channel count the processing module accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ChannelCount {
    #[weight(1)]
    Mono,
    #[weight(1)]
    Stereo,
}

impl ChannelCount {
    pub fn count(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

/// A valid capture shape: input channels, output channels no more than
/// input, and a reverse channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct StreamShape {
    pub sample_rate: SampleRate,
    pub input: ChannelCount,
    #[strategy(output_channels(#input))]
    pub output: ChannelCount,
    pub reverse: ChannelCount,
}

fn output_channels(input: ChannelCount) -> BoxedStrategy<ChannelCount> {
    match input {
        ChannelCount::Mono => Just(ChannelCount::Mono).boxed(),
        ChannelCount::Stereo => prop_oneof![Just(ChannelCount::Mono), Just(ChannelCount::Stereo)].boxed(),
    }
}

/// A mono i16 audio frame with its sample rate.
#[derive(Debug, Clone, Arbitrary)]
pub struct MonoFrameI16 {
    pub sample_rate: SampleRate,
    #[strategy(audio_frame_i16(#sample_rate.hz()))]
    pub samples: Vec<i16>,
}

/// An interleaved multi-channel i16 audio frame.
#[derive(Debug, Clone, Arbitrary)]
pub struct MultiChannelFrameI16 {
    pub sample_rate: SampleRate,
    pub channels: ChannelCount,
    #[strategy(audio_frame_multichannel_i16(#sample_rate.hz(), #channels.count()))]
    pub samples: Vec<i16>,
}

/// Generate a mono i16 audio frame at a given sample rate (10ms frame).
pub fn audio_frame_i16(sample_rate: u32) -> impl Strategy<Value = Vec<i16>> {
    let frame_size = (sample_rate / 100) as usize;
    proptest::collection::vec(i16::MIN..=i16::MAX, frame_size..=frame_size)
}

/// Generate interleaved multi-channel i16 audio (10ms).
pub fn audio_frame_multichannel_i16(
    sample_rate: u32,
    channels: usize,
) -> impl Strategy<Value = Vec<i16>> {
    let frame_size = (sample_rate / 100) as usize * channels;
    proptest::collection::vec(i16::MIN..=i16::MAX, frame_size..=frame_size)
}

/// Generate a quiet mono frame, `|s| <= amplitude`.
pub fn quiet_frame_i16(sample_rate: u32, amplitude: i16) -> impl Strategy<Value = Vec<i16>> {
    let frame_size = (sample_rate / 100) as usize;
    proptest::collection::vec(-amplitude..=amplitude, frame_size..=frame_size)
}

/// Integers around and inside `0..len`, for enum-conversion properties.
pub fn enum_index(len: i32) -> impl Strategy<Value = i32> {
    prop_oneof![0..len, -100i32..0, len..len + 100, Just(i32::MIN), Just(i32::MAX)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[proptest]
    fn frame_i16_correct_length(#[strategy(audio_frame_i16(8000))] frame: Vec<i16>) {
        assert_eq!(frame.len(), 80);
    }

    #[proptest]
    fn quiet_frame_in_range(#[strategy(quiet_frame_i16(16000, 100))] frame: Vec<i16>) {
        assert_eq!(frame.len(), 160);
        assert!(frame.iter().all(|s| s.abs() <= 100));
    }

    #[proptest]
    fn mono_frame_i16_struct_consistent(frame: MonoFrameI16) {
        assert_eq!(frame.samples.len(), frame.sample_rate.frame_size());
    }

    #[proptest]
    fn multichannel_frame_struct_consistent(frame: MultiChannelFrameI16) {
        let expected = frame.sample_rate.frame_size() * frame.channels.count();
        assert_eq!(frame.samples.len(), expected);
    }

    #[proptest]
    fn sample_rate_valid_values(sr: SampleRate) {
        assert!([8000, 16000, 32000].contains(&sr.hz()));
        assert_eq!(sr.is_split(), sr.hz() == 32000);
    }

    #[proptest]
    fn stream_shape_output_never_exceeds_input(shape: StreamShape) {
        assert!(shape.output.count() <= shape.input.count());
    }
}
