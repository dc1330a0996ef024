//! Conversion between 10 ms frames and fixed-size processing blocks.
//!
//! Ported from `modules/audio_processing/aec3/frame_blocker.h/cc` and
//! `block_framer.h/cc`, generalized to one band and any frame length.

use std::collections::VecDeque;

/// Collects frame samples and hands them out as whole blocks.
#[derive(Debug, Clone)]
pub struct FrameBlocker {
    block_len: usize,
    pending: Vec<f32>,
}

impl FrameBlocker {
    pub fn new(block_len: usize) -> Self {
        Self {
            block_len,
            pending: Vec::with_capacity(4 * block_len),
        }
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }

    pub fn push_frame(&mut self, frame: &[f32]) {
        self.pending.extend_from_slice(frame);
    }

    /// Pop the oldest full block into `block` (of `block_len` samples), if
    /// one is buffered.
    pub fn next_block(&mut self, block: &mut [f32]) -> bool {
        debug_assert_eq!(block.len(), self.block_len);
        if self.pending.len() < self.block_len {
            return false;
        }
        block.copy_from_slice(&self.pending[..self.block_len]);
        self.pending.drain(..self.block_len);
        true
    }

    /// Samples waiting for a full block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Collects processed blocks and hands them out as frames.
///
/// Starts with one block of silence so that a frame is always available
/// once the blocks of the matching input frame have been pushed.
#[derive(Debug, Clone)]
pub struct BlockFramer {
    block_len: usize,
    buffer: VecDeque<f32>,
}

impl BlockFramer {
    pub fn new(block_len: usize) -> Self {
        let mut buffer = VecDeque::with_capacity(4 * block_len);
        buffer.extend(std::iter::repeat_n(0.0, block_len));
        Self { block_len, buffer }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.block_len);
    }

    /// Latency added by the framer, in samples.
    pub fn delay(&self) -> usize {
        self.block_len
    }

    pub fn push_block(&mut self, block: &[f32]) {
        self.buffer.extend(block.iter().copied());
    }

    /// Fill `frame` from the front of the buffer. Returns `false` (and
    /// zero-fills the shortfall) if not enough samples were buffered.
    pub fn pop_frame(&mut self, frame: &mut [f32]) -> bool {
        let available = self.buffer.len().min(frame.len());
        for (dst, src) in frame.iter_mut().zip(self.buffer.drain(..available)) {
            *dst = src;
        }
        frame[available..].fill(0.0);
        available == frame.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 64;

    fn run_identity(frame_len: usize, frames: usize) -> Vec<f32> {
        let mut blocker = FrameBlocker::new(BLOCK);
        let mut framer = BlockFramer::new(BLOCK);
        let mut output = Vec::new();
        let mut block = [0.0; BLOCK];
        for f in 0..frames {
            let frame: Vec<f32> = (0..frame_len).map(|i| (f * frame_len + i + 1) as f32).collect();
            blocker.push_frame(&frame);
            while blocker.next_block(&mut block) {
                framer.push_block(&block);
            }
            let mut out = vec![0.0; frame_len];
            assert!(framer.pop_frame(&mut out), "underrun at frame {f}");
            output.extend(out);
        }
        output
    }

    #[test]
    fn round_trip_is_a_fixed_delay() {
        for frame_len in [80, 160] {
            let output = run_identity(frame_len, 20);
            assert!(output[..BLOCK].iter().all(|&v| v == 0.0));
            for (i, &v) in output[BLOCK..].iter().enumerate() {
                assert_eq!(v, (i + 1) as f32);
            }
        }
    }

    #[test]
    fn blocker_keeps_remainder() {
        let mut blocker = FrameBlocker::new(BLOCK);
        blocker.push_frame(&[1.0; 80]);
        let mut block = [0.0; BLOCK];
        assert!(blocker.next_block(&mut block));
        assert!(!blocker.next_block(&mut block));
        assert_eq!(blocker.pending(), 16);
    }

    #[test]
    fn framer_reports_shortfall() {
        let mut framer = BlockFramer::new(BLOCK);
        let mut out = [1.0; 100];
        assert!(!framer.pop_frame(&mut out));
        assert!(out.iter().all(|&v| v == 0.0));
        assert_eq!(framer.delay(), BLOCK);
    }
}
