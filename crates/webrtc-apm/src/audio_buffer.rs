//! Per-direction workspace for one 10 ms frame.
//!
//! Holds the deinterleaved channels, the two half-rate bands at 32 kHz,
//! the QMF filter states that carry across frames, and an optional copy
//! of the low band taken before any component modified it.
//!
//! Ported from `modules/audio_processing/audio_buffer.h/cc`.

use derive_more::Debug;
use webrtc_common_audio::audio_util::{
    deinterleave_channel, downmix_channels_to_mono_i16, downmix_interleaved_to_mono_i16,
    interleave_channel,
};
use webrtc_common_audio::splitting_filter::TwoBandsStates;

use crate::audio_frame::AudioFrame;
use crate::stream_config::StreamConfig;

#[derive(Debug)]
pub(crate) struct AudioBuffer {
    num_frames: usize,
    num_split_frames: usize,
    /// Channels held in the current frame.
    num_channels: usize,
    /// Whether `low`/`high` hold the current frame.
    bands_valid: bool,
    reference_valid: bool,
    #[debug(skip)]
    data: Vec<Vec<i16>>,
    /// Split bands; empty unless the stream runs at 32 kHz.
    #[debug(skip)]
    low: Vec<Vec<i16>>,
    #[debug(skip)]
    high: Vec<Vec<i16>>,
    #[debug(skip)]
    low_reference: Vec<Vec<i16>>,
    #[debug(skip)]
    mixed_low: Vec<i16>,
    #[debug(skip)]
    qmf: Vec<TwoBandsStates>,
}

impl AudioBuffer {
    /// A workspace for `max_channels` channels of `config`'s rate.
    pub(crate) fn new(config: &StreamConfig, max_channels: usize) -> Self {
        let num_frames = config.num_frames();
        let num_split_frames = config.num_band_frames();
        let split = config.is_split();
        let bands = |n: usize| vec![vec![0i16; num_split_frames]; n];
        Self {
            num_frames,
            num_split_frames,
            num_channels: max_channels,
            bands_valid: false,
            reference_valid: false,
            data: vec![vec![0; num_frames]; max_channels],
            low: if split { bands(max_channels) } else { Vec::new() },
            high: if split { bands(max_channels) } else { Vec::new() },
            low_reference: bands(max_channels),
            mixed_low: vec![0; num_split_frames],
            qmf: if split {
                vec![TwoBandsStates::new(); max_channels]
            } else {
                Vec::new()
            },
        }
    }

    pub(crate) fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Full-band samples of one channel.
    #[cfg(test)]
    pub(crate) fn channel(&self, channel: usize) -> &[i16] {
        &self.data[channel]
    }

    /// Low band of `channel`, or the full band when the frame was not split.
    pub(crate) fn low_band(&self, channel: usize) -> &[i16] {
        if self.bands_valid {
            &self.low[channel]
        } else {
            &self.data[channel]
        }
    }

    #[cfg(test)]
    pub(crate) fn high_band(&self, channel: usize) -> Option<&[i16]> {
        self.bands_valid.then(|| self.high[channel].as_slice())
    }

    /// Both bands of `channel` for in-place processing.
    pub(crate) fn bands_mut(&mut self, channel: usize) -> (&mut [i16], Option<&mut [i16]>) {
        if self.bands_valid {
            (
                self.low[channel].as_mut_slice(),
                Some(self.high[channel].as_mut_slice()),
            )
        } else {
            (self.data[channel].as_mut_slice(), None)
        }
    }

    /// Load an interleaved frame, averaging its channels down when it
    /// carries more than `num_channels`.
    pub(crate) fn copy_from_interleaved_i16(&mut self, frame: &AudioFrame, num_channels: usize) {
        debug_assert!(num_channels >= 1 && num_channels <= self.data.len());
        debug_assert_eq!(frame.samples_per_channel, self.num_frames);
        self.num_channels = num_channels;
        self.bands_valid = false;
        self.reference_valid = false;
        if frame.num_channels > num_channels {
            downmix_interleaved_to_mono_i16(&frame.data, frame.num_channels, &mut self.data[0]);
            // Only 2 -> 1 is possible; nothing else to fill.
            return;
        }
        for (ch, dest) in self.data.iter_mut().take(num_channels).enumerate() {
            deinterleave_channel(&frame.data, frame.num_channels, ch, dest);
        }
    }

    /// Write the buffered channels back, interleaved. The frame takes on
    /// this buffer's channel count.
    pub(crate) fn copy_to_interleaved_i16(&self, frame: &mut AudioFrame) {
        frame.num_channels = self.num_channels;
        frame.samples_per_channel = self.num_frames;
        frame.data.resize(self.num_frames * self.num_channels, 0);
        if self.num_channels == 1 {
            frame.data.copy_from_slice(&self.data[0]);
            return;
        }
        for (ch, src) in self.data.iter().take(self.num_channels).enumerate() {
            interleave_channel(src, self.num_channels, ch, &mut frame.data);
        }
    }

    /// Split every channel into two bands. A no-op below 32 kHz.
    pub(crate) fn split_into_frequency_bands(&mut self) {
        if self.qmf.is_empty() {
            return;
        }
        for ch in 0..self.num_channels {
            self.qmf[ch].analysis(&self.data[ch], &mut self.low[ch], &mut self.high[ch]);
        }
        self.bands_valid = true;
    }

    /// Merge the bands back into the full-band channels.
    pub(crate) fn merge_frequency_bands(&mut self) {
        if !self.bands_valid {
            return;
        }
        for ch in 0..self.num_channels {
            self.qmf[ch].synthesis(&self.low[ch], &self.high[ch], &mut self.data[ch]);
        }
        self.bands_valid = false;
    }

    /// Snapshot the low bands as they are now.
    pub(crate) fn copy_low_pass_reference(&mut self) {
        for ch in 0..self.num_channels {
            let src = if self.bands_valid {
                &self.low[ch]
            } else {
                &self.data[ch]
            };
            self.low_reference[ch].copy_from_slice(&src[..self.num_split_frames]);
        }
        self.reference_valid = true;
    }

    /// The snapshot taken by [`copy_low_pass_reference`](Self::copy_low_pass_reference)
    /// for this frame, if any.
    pub(crate) fn low_pass_reference(&self, channel: usize) -> Option<&[i16]> {
        self.reference_valid
            .then(|| self.low_reference[channel].as_slice())
    }

    /// Average of the low bands of all channels.
    pub(crate) fn mixed_low_pass_data(&mut self) -> &[i16] {
        let bands = if self.bands_valid { &self.low } else { &self.data };
        let channels: Vec<&[i16]> = bands[..self.num_channels]
            .iter()
            .map(|band| &band[..self.num_split_frames])
            .collect();
        downmix_channels_to_mono_i16(&channels, &mut self.mixed_low);
        &self.mixed_low
    }
}
