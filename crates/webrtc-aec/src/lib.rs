//! Wideband acoustic echo canceller.
//!
//! A 12-partition frequency-domain NLMS filter removes the linear echo of
//! the far-end signal from the near-end low band; a coherence-driven
//! nonlinear processor suppresses what remains. Runs on 8 kHz or 16 kHz
//! (the low band of 32 kHz) in 64-sample blocks.
//!
//! C++ source: `webrtc/modules/audio_processing/aec/`

pub mod config;
pub mod echo_canceller;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod nlp;
pub mod resampler;

pub use config::{AecConfig, SuppressionLevel};
pub use echo_canceller::EchoCanceller;
pub use error::AecError;
pub use metrics::{DelayMetrics, EchoMetrics, Statistic};
