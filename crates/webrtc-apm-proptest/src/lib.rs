//! Property-based test support for the audio processing module.
//!
//! Provides frame generators restricted to the rates and channel counts
//! the module accepts, deterministic far/near PCM for scenario tests,
//! OutputData fixture files and sample comparison helpers.
//!
//! # Usage
//!
//! ```ignore
//! use webrtc_apm_proptest::generators::*;
//! use test_strategy::proptest;
//!
//! #[proptest]
//! fn my_test(#[strategy(audio_frame_i16(16000))] frame: Vec<i16>) {
//!     assert_eq!(frame.len(), 160);
//! }
//! ```

pub mod comparison;
pub mod fixture;
pub mod generators;
pub mod signals;

pub use proptest;
pub use test_strategy;
