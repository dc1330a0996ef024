//! DSP primitives for WebRTC Audio Processing.
//!
//! Contains int16 sample helpers, the fixed-point two-band QMF splitter,
//! a real FFT, and the far-end ring buffer, frame blocker and
//! binary-spectrum delay estimator shared by the echo cancellers.

pub mod audio_util;
pub mod delay_estimator;
pub mod frame_blocker;
pub mod real_fft;
pub mod ring_buffer;
pub mod splitting_filter;
