//! AECM handle: far-end buffering, delay alignment and framing around
//! [`AecmCore`].
//!
//! C++ source: `webrtc/modules/audio_processing/aecm/echo_control_mobile.c`

use derive_more::Debug;
use webrtc_common_audio::frame_blocker::{BlockFramer, FrameBlocker};
use webrtc_common_audio::ring_buffer::RingBuffer;

use crate::aecm_core::{AecmCore, block_to_i16};
use crate::config::{AecmConfig, ECHO_PATH_SIZE_BYTES, PART_LEN, PART_LEN1, frame_length};
use crate::error::AecmError;

/// Frames processed before the far-end buffer is realigned.
const STARTUP_FRAMES: usize = 10;
/// Far-end lead kept ahead of the reported delay.
const ALIGNMENT_MARGIN: usize = 2 * PART_LEN;
/// Far-end buffer capacity in milliseconds.
const FAR_BUFFER_MS: usize = 1000;

/// One mobile echo control instance, for one near/far channel pair.
#[derive(Debug)]
pub struct EchoControlMobile {
    config: AecmConfig,
    sample_rate_hz: u32,
    frame_len: usize,
    core: AecmCore,
    far_buffer: RingBuffer,
    #[debug(skip)]
    noisy_blocker: FrameBlocker,
    #[debug(skip)]
    clean_blocker: FrameBlocker,
    #[debug(skip)]
    framer: BlockFramer,
    frames_processed: usize,
    last_target: Option<usize>,
}

impl EchoControlMobile {
    /// Create an instance for 8 or 16 kHz audio.
    pub fn new(sample_rate_hz: u32, config: AecmConfig) -> Result<Self, AecmError> {
        let frame_len =
            frame_length(sample_rate_hz).ok_or(AecmError::UnsupportedSampleRate(sample_rate_hz))?;
        tracing::debug!(sample_rate_hz, ?config, "creating AECM");
        Ok(Self {
            config,
            sample_rate_hz,
            frame_len,
            core: AecmCore::new(),
            far_buffer: RingBuffer::new(FAR_BUFFER_MS * sample_rate_hz as usize / 1000),
            noisy_blocker: FrameBlocker::new(PART_LEN),
            clean_blocker: FrameBlocker::new(PART_LEN),
            framer: BlockFramer::new(PART_LEN),
            frames_processed: 0,
            last_target: None,
        })
    }

    /// Clear all signal state. Configuration and echo path are kept.
    pub fn reset(&mut self) {
        self.core.reset();
        self.far_buffer.clear();
        self.noisy_blocker.reset();
        self.clean_blocker.reset();
        self.framer.reset();
        self.frames_processed = 0;
        self.last_target = None;
    }

    pub fn config(&self) -> &AecmConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: AecmConfig) {
        self.config = config;
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn check_length(&self, len: usize) -> Result<(), AecmError> {
        if len != self.frame_len {
            return Err(AecmError::BadFrameLength {
                expected: self.frame_len,
                actual: len,
            });
        }
        Ok(())
    }

    /// Buffer one far-end frame.
    pub fn buffer_far_end(&mut self, far: &[i16]) -> Result<(), AecmError> {
        self.check_length(far.len())?;
        let far_f32: Vec<f32> = far.iter().map(|&s| f32::from(s)).collect();
        let dropped = self.far_buffer.write(&far_f32);
        if dropped > 0 {
            tracing::warn!(dropped, "far-end buffer overflow; oldest samples dropped");
        }
        Ok(())
    }

    /// Suppress echo in one near-end frame.
    ///
    /// `noisy` is the near end before noise suppression and drives the
    /// echo estimate; the gain is applied to `clean` when given, to
    /// `noisy` otherwise. The result goes to `out`.
    pub fn process(
        &mut self,
        noisy: &[i16],
        clean: Option<&[i16]>,
        out: &mut [i16],
        delay_ms: i32,
    ) -> Result<(), AecmError> {
        self.check_length(noisy.len())?;
        self.check_length(out.len())?;
        if let Some(clean) = clean {
            self.check_length(clean.len())?;
        }
        if delay_ms < 0 {
            return Err(AecmError::BadDelay(delay_ms));
        }

        self.align_far_end(delay_ms as usize);

        let noisy_f32: Vec<f32> = noisy.iter().map(|&s| f32::from(s)).collect();
        let clean_f32: Vec<f32> = clean
            .map(|c| c.iter().map(|&s| f32::from(s)).collect())
            .unwrap_or_else(|| noisy_f32.clone());
        self.noisy_blocker.push_frame(&noisy_f32);
        self.clean_blocker.push_frame(&clean_f32);

        let mut far = [0.0f32; PART_LEN];
        let mut noisy_block = [0.0f32; PART_LEN];
        let mut clean_block = [0.0f32; PART_LEN];
        let mut output = [0.0f32; PART_LEN];
        while self.noisy_blocker.next_block(&mut noisy_block)
            && self.clean_blocker.next_block(&mut clean_block)
        {
            if !self.far_buffer.read_block(&mut far) {
                tracing::trace!("far-end buffer underrun");
            }
            self.core
                .process_block(&self.config, &far, &noisy_block, &clean_block, &mut output);
            self.framer.push_block(&output);
        }

        let mut frame = vec![0.0f32; self.frame_len];
        if !self.framer.pop_frame(&mut frame) {
            tracing::trace!("output framer underrun");
        }
        block_to_i16(&frame, out);
        self.frames_processed += 1;
        Ok(())
    }

    /// Stored echo path, Q8, one tap per frequency bin.
    pub fn echo_path(&self) -> [i16; PART_LEN1] {
        self.core.echo_path()
    }

    pub fn set_echo_path(&mut self, path: &[i16; PART_LEN1]) {
        self.core.set_echo_path(path);
    }

    /// Size in bytes of the serialized echo path.
    pub fn echo_path_size_bytes() -> usize {
        ECHO_PATH_SIZE_BYTES
    }

    /// Serialize the echo path into `bytes` (native-endian int16 taps).
    pub fn echo_path_bytes(&self, bytes: &mut [u8]) -> Result<(), AecmError> {
        check_echo_path_size(bytes.len())?;
        for (chunk, tap) in bytes.chunks_exact_mut(2).zip(self.core.echo_path()) {
            chunk.copy_from_slice(&tap.to_ne_bytes());
        }
        Ok(())
    }

    /// Load an echo path previously produced by
    /// [`echo_path_bytes`](Self::echo_path_bytes).
    pub fn set_echo_path_bytes(&mut self, bytes: &[u8]) -> Result<(), AecmError> {
        check_echo_path_size(bytes.len())?;
        let mut path = [0i16; PART_LEN1];
        for (tap, chunk) in path.iter_mut().zip(bytes.chunks_exact(2)) {
            *tap = i16::from_ne_bytes([chunk[0], chunk[1]]);
        }
        self.core.set_echo_path(&path);
        Ok(())
    }

    fn align_far_end(&mut self, delay_ms: usize) {
        if self.frames_processed < STARTUP_FRAMES {
            return;
        }
        let delay_samples = delay_ms * self.sample_rate_hz as usize / 1000;
        let target = delay_samples
            .saturating_sub(ALIGNMENT_MARGIN)
            .max(self.frame_len)
            .min(self.far_buffer.capacity());
        let available = self.far_buffer.available_read();
        let delay_changed = self
            .last_target
            .is_none_or(|last| last.abs_diff(target) > PART_LEN);
        let drifted = available.abs_diff(target) > 4 * PART_LEN;
        if delay_changed || drifted {
            let moved = self
                .far_buffer
                .move_read_ptr(available as isize - target as isize);
            if self.last_target.is_some() && moved != 0 {
                tracing::debug!(available, target, moved, "realigning far-end buffer");
            }
            self.last_target = Some(target);
        }
    }
}

fn check_echo_path_size(actual: usize) -> Result<(), AecmError> {
    if actual != ECHO_PATH_SIZE_BYTES {
        return Err(AecmError::BadEchoPathSize {
            expected: ECHO_PATH_SIZE_BYTES,
            actual,
        });
    }
    Ok(())
}
