//! Automatic Gain Control for WebRTC Audio Processing.
//!
//! Three modes share one digital compressor: `AdaptiveAnalog` suggests a
//! new microphone level from the tracked speech level, `AdaptiveDigital`
//! runs the same loop on a virtual microphone gain applied in software,
//! and `FixedDigital` only applies the compressor.
//!
//! C++ source: `webrtc/modules/audio_processing/agc/legacy/`

pub mod analog_agc;
pub mod config;
pub mod digital_agc;
pub mod error;
pub mod gain_control;
pub mod gain_table;

pub use config::{AgcConfig, AgcMode};
pub use error::AgcError;
pub use gain_control::GainControl;
