//! Noise Suppression for WebRTC Audio Processing.
//!
//! Implements Wiener filtering driven by a quantile noise estimate and a
//! speech probability, at 8 kHz and 16 kHz (the low band of 32 kHz).
//!
//! C++ source: `webrtc/modules/audio_processing/ns/`

pub mod config;
pub mod noise_suppressor;
pub mod quantile_noise_estimator;
pub mod speech_probability_estimator;
pub mod suppression_params;
pub mod wiener_filter;

pub use config::{NsConfig, SuppressionLevel};
pub use noise_suppressor::{NoiseSuppressor, NsError};
