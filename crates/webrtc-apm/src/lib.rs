//! WebRTC Audio Processing Module.
//!
//! Cleans up the near-end (microphone) signal of a real-time call using
//! the far-end (playout) signal as reference: wideband or mobile echo
//! cancellation, gain control, noise suppression, high-pass filtering,
//! voice activity detection and level estimation on 10 ms frames of
//! 16-bit PCM at 8, 16 or 32 kHz.
//!
//! At 32 kHz the signal is split into two 8 kHz-wide bands; every
//! component works on the low band and the high band follows the gains
//! applied to it.
//!
//! ```
//! use webrtc_apm::{AudioFrame, AudioProcessing};
//!
//! let apm = AudioProcessing::new();
//! apm.echo_cancellation().enable(true).unwrap();
//! apm.noise_suppression().enable(true).unwrap();
//!
//! let far = AudioFrame::new(16000, 1);
//! apm.analyze_reverse_stream(&far).unwrap();
//!
//! let mut near = AudioFrame::new(16000, 1);
//! apm.set_stream_delay_ms(40).unwrap();
//! apm.process_stream(&mut near).unwrap();
//! ```

mod audio_buffer;
pub mod audio_frame;
pub mod audio_processing;
mod audio_processing_impl;
pub mod config;
pub mod echo_cancellation;
pub mod echo_control_mobile;
pub mod error;
pub mod gain_control;
mod handle_bank;
pub mod high_pass_filter;
pub mod level_estimator;
pub mod noise_suppression;
mod rms_level;
pub mod stats;
pub mod stream_config;
pub mod stream_params;
mod submodule_states;
pub mod voice_detection;

pub use audio_frame::{AudioFrame, VadActivity};
pub use audio_processing::{AudioProcessing, AudioProcessingBuilder};
pub use config::{
    Config, EchoCancellationConfig, EchoControlMobileConfig, EchoMode, EchoSuppressionLevel,
    GainControlConfig, GainControlMode, HighPassFilterConfig, LevelEstimatorConfig, Likelihood,
    NoiseSuppressionConfig, NoiseSuppressionLevel, RoutingMode, VoiceDetectionConfig,
};
pub use echo_cancellation::EchoCancellation;
pub use echo_control_mobile::EchoControlMobile;
pub use error::Error;
pub use gain_control::GainControl;
pub use high_pass_filter::HighPassFilter;
pub use level_estimator::LevelEstimator;
pub use noise_suppression::NoiseSuppression;
pub use rms_level::MIN_LEVEL_DB;
pub use stats::AudioProcessingStats;
pub use stream_config::{ProcessingConfig, StreamConfig};
pub use voice_detection::VoiceDetection;
pub use webrtc_aec::{DelayMetrics, EchoMetrics, Statistic};
