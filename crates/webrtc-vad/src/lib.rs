//! Voice Activity Detection for WebRTC Audio Processing.
//!
//! A Gaussian-mixture detector over six sub-band log energies of an
//! 8 kHz signal, with per-band and weighted-sum likelihood ratio tests
//! and a hangover that keeps speech decisions alive across short gaps.
//!
//! C++ source: `webrtc/common_audio/vad/`

pub mod filter_bank;
pub mod gmm;
pub mod vad;

pub use vad::{Aggressiveness, Vad, VadError};
