//! Mobile Echo Control (AECM) for WebRTC Audio Processing.
//!
//! Magnitude-domain echo suppression for 8 kHz and 16 kHz capture: a
//! per-bin echo path gain (Q8) is applied to the delay-aligned far-end
//! magnitude spectrum, and the near end is attenuated by the estimated
//! echo-to-near ratio.
//!
//! C++ source: `webrtc/modules/audio_processing/aecm/`

pub mod aecm_core;
pub mod config;
pub mod echo_control_mobile;
pub mod error;

pub use config::{AecmConfig, RoutingMode};
pub use echo_control_mobile::EchoControlMobile;
pub use error::AecmError;
