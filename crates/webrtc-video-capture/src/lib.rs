//! Video capture: moves frames from a capture backend to any number of
//! consumers.
//!
//! A [`Capturer`] negotiates the capture format from what its consumers
//! prefer, converts backend frames to I420, runs the optional enhancement
//! chain (deflickering, denoising, brightness classification and an
//! application effect filter) and fans the result out on a dedicated
//! deliver thread. An encoder can instead take encoded frames straight
//! from the backend. Sustained CPU overuse lowers resolution or frame rate
//! according to the degradation preference.
//!
//! ```no_run
//! use std::sync::Arc;
//! use webrtc_video_capture::{
//!     CaptureCapability, CaptureError, Capturer, CapturerConfig, ExternalCapture, FrameCallback,
//!     RawVideoType, VideoFrame,
//! };
//!
//! struct Preview;
//!
//! impl FrameCallback for Preview {
//!     fn deliver_frame(&self, _id: i32, frame: &VideoFrame) -> Result<(), CaptureError> {
//!         println!("{}x{} at {}", frame.width(), frame.height(), frame.render_time_ms);
//!         Ok(())
//!     }
//! }
//!
//! let external = Arc::new(ExternalCapture::new());
//! let capturer = Capturer::new_external(0, external, CapturerConfig::default())?;
//! capturer.register_frame_callback(Arc::new(Preview))?;
//! capturer.start(CaptureCapability::default())?;
//!
//! let buffer = vec![0u8; 640 * 480 * 3 / 2];
//! capturer.incoming_frame(&buffer, 640, 480, RawVideoType::I420, 0)?;
//! # Ok::<(), CaptureError>(())
//! ```

pub mod capability;
pub mod capture_module;
pub mod capturer;
pub mod config;
pub mod error;
mod event;
pub mod frame;
pub mod frame_provider;
pub mod image_processing;
pub mod observer;
pub mod overuse_detector;
pub mod quality_adapter;

pub use capability::{CaptureCapability, VideoCodec, VideoFormat};
pub use capture_module::{CaptureDataCallback, CaptureEncodeInterface, ExternalCapture, VideoCaptureModule};
pub use capturer::{CaptureEncoder, Capturer, PreviewDecoder, VideoEncoderSink};
pub use config::{BrightnessConfig, CapturerConfig, OveruseConfig};
pub use error::CaptureError;
pub use frame::{EncodedImage, RawVideoType, VideoCodecType, VideoFrame, VideoRotation};
pub use frame_provider::{EffectFilter, FrameCallback};
pub use image_processing::{Brightness, Enhancement};
pub use observer::{CaptureAlarm, CaptureObserver};
pub use overuse_detector::{CpuOveruseObserver, LoadState};
pub use quality_adapter::{DegradationPreference, DegradationPreferenceListener};
