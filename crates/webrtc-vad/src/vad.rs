//! Voice activity detector instance.
//!
//! C++ source: `webrtc/common_audio/vad/webrtc_vad.c`,
//!             `webrtc/common_audio/vad/vad_core.c`

use crate::filter_bank::{self, CHUNK_LENGTH, FilterBank, NUM_CHANNELS};
use crate::gmm::{BandLikelihood, GmmModel};

/// Frames with a mean per-sample power below this are never speech.
const MIN_ENERGY: f32 = 10.0;

/// Spectral weights for the global likelihood test.
const SPECTRUM_WEIGHT: [f32; NUM_CHANNELS] = [6.0, 8.0, 10.0, 12.0, 14.0, 16.0];

/// Consecutive 10 ms speech frames before the long hangover applies.
const LONG_SPEECH_RUN_MS: usize = 70;

/// Errors returned by the voice activity detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VadError {
    /// Aggressiveness outside 0..=3.
    #[error("invalid aggressiveness mode {0}")]
    InvalidMode(i32),
    /// Unsupported sample rate or frame length.
    #[error("invalid rate {rate_hz} Hz / frame length {frame_length}")]
    InvalidRateOrFrameLength { rate_hz: u32, frame_length: usize },
}

/// Detector aggressiveness; higher values reject more non-speech at the
/// cost of missing quiet speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggressiveness {
    #[default]
    Quality,
    LowBitrate,
    Aggressive,
    VeryAggressive,
}

impl Aggressiveness {
    pub fn from_mode(mode: i32) -> Result<Self, VadError> {
        match mode {
            0 => Ok(Self::Quality),
            1 => Ok(Self::LowBitrate),
            2 => Ok(Self::Aggressive),
            3 => Ok(Self::VeryAggressive),
            other => Err(VadError::InvalidMode(other)),
        }
    }

    pub fn mode(self) -> i32 {
        self as i32
    }

    fn individual_threshold(self) -> f32 {
        [3.0, 3.5, 4.0, 5.0][self as usize]
    }

    fn total_threshold(self) -> f32 {
        [0.5, 1.0, 1.5, 2.0][self as usize]
    }

    /// (short, long) hangover in 10 ms frames.
    fn hangover_frames(self) -> (usize, usize) {
        [(8, 14), (8, 14), (6, 9), (3, 5)][self as usize]
    }
}

/// Returns true if `rate_hz` and `frame_length` form a 10, 20 or 30 ms
/// frame at 8, 16 or 32 kHz.
pub fn valid_rate_and_frame_length(rate_hz: u32, frame_length: usize) -> bool {
    if !matches!(rate_hz, 8000 | 16000 | 32000) {
        return false;
    }
    let per_ms = (rate_hz / 1000) as usize;
    [10, 20, 30].iter().any(|ms| ms * per_ms == frame_length)
}

/// Gaussian-mixture voice activity detector.
#[derive(Debug)]
pub struct Vad {
    aggressiveness: Aggressiveness,
    filter_bank: FilterBank,
    model: GmmModel,
    downsampling_state: [i16; 2],
    downsampled: Vec<i16>,
    speech_run_frames: usize,
    hangover_remaining: usize,
    frame_counter: u64,
}

impl Default for Vad {
    fn default() -> Self {
        Self::new()
    }
}

impl Vad {
    pub fn new() -> Self {
        Self {
            aggressiveness: Aggressiveness::default(),
            filter_bank: FilterBank::new(),
            model: GmmModel::default(),
            downsampling_state: [0; 2],
            downsampled: Vec::with_capacity(3 * CHUNK_LENGTH),
            speech_run_frames: 0,
            hangover_remaining: 0,
            frame_counter: 0,
        }
    }

    /// Reset the adaptive models, keeping the aggressiveness.
    pub fn reset(&mut self) {
        let aggressiveness = self.aggressiveness;
        *self = Self::new();
        self.aggressiveness = aggressiveness;
    }

    pub fn set_mode(&mut self, mode: i32) -> Result<(), VadError> {
        self.aggressiveness = Aggressiveness::from_mode(mode)?;
        Ok(())
    }

    pub fn set_aggressiveness(&mut self, aggressiveness: Aggressiveness) {
        self.aggressiveness = aggressiveness;
    }

    pub fn aggressiveness(&self) -> Aggressiveness {
        self.aggressiveness
    }

    /// Classify one frame. Returns `true` for active voice.
    pub fn process(&mut self, rate_hz: u32, frame: &[i16]) -> Result<bool, VadError> {
        if !valid_rate_and_frame_length(rate_hz, frame.len()) {
            return Err(VadError::InvalidRateOrFrameLength {
                rate_hz,
                frame_length: frame.len(),
            });
        }

        let mut downsampled = std::mem::take(&mut self.downsampled);
        downsampled.clear();
        match rate_hz {
            8000 => downsampled.extend_from_slice(frame),
            16000 => {
                downsampled.resize(frame.len() / 2, 0);
                filter_bank::downsample_by_two(frame, &mut downsampled, &mut self.downsampling_state[0]);
            }
            _ => {
                let mut half = vec![0i16; frame.len() / 2];
                filter_bank::downsample_by_two(frame, &mut half, &mut self.downsampling_state[1]);
                downsampled.resize(half.len() / 2, 0);
                filter_bank::downsample_by_two(&half, &mut downsampled, &mut self.downsampling_state[0]);
            }
        }

        let frame_ms = downsampled.len() / (CHUNK_LENGTH / 10);
        let decision = self.classify(&downsampled, frame_ms);
        self.downsampled = downsampled;
        self.frame_counter += 1;
        Ok(decision)
    }

    fn classify(&mut self, frame: &[i16], frame_ms: usize) -> bool {
        let mut features = [0.0f32; NUM_CHANNELS];
        let power = self.filter_bank.calculate_features(frame, &mut features);
        if power < MIN_ENERGY {
            self.speech_run_frames = 0;
            self.hangover_remaining = 0;
            return false;
        }

        let likelihoods: [BandLikelihood; NUM_CHANNELS] =
            std::array::from_fn(|b| self.model.likelihood(b, features[b]));

        let mut weighted_sum = 0.0f32;
        let mut any_band_speech = false;
        for (lk, &w) in likelihoods.iter().zip(SPECTRUM_WEIGHT.iter()) {
            let llr = lk.llr();
            weighted_sum += w * llr;
            any_band_speech |= llr > self.aggressiveness.individual_threshold();
        }
        let weight_total: f32 = SPECTRUM_WEIGHT.iter().sum();
        let raw_speech =
            any_band_speech || weighted_sum / weight_total > self.aggressiveness.total_threshold();

        self.model.update(&features, &likelihoods, raw_speech);
        tracing::trace!(
            frame = self.frame_counter,
            power,
            weighted_llr = weighted_sum / weight_total,
            raw_speech,
            "vad frame"
        );

        let frames_in_call = frame_ms.div_ceil(10).max(1);
        if raw_speech {
            self.speech_run_frames += frames_in_call;
            let (short, long) = self.aggressiveness.hangover_frames();
            self.hangover_remaining = if self.speech_run_frames * 10 >= LONG_SPEECH_RUN_MS {
                long
            } else {
                short
            };
            true
        } else {
            self.speech_run_frames = 0;
            if self.hangover_remaining > 0 {
                self.hangover_remaining = self.hangover_remaining.saturating_sub(frames_in_call);
                true
            } else {
                false
            }
        }
    }
}
