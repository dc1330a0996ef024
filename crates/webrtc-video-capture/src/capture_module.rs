//! Capture backends.
//!
//! A backend produces frames on its own thread and hands them to the
//! registered [`CaptureDataCallback`]. [`ExternalCapture`] is the backend
//! used when the application pushes frames itself.
//!
//! C++ source: `webrtc/modules/video_capture/video_capture_impl.cc`,
//! `webrtc/modules/video_capture/external/video_capture_external.cc`

use std::sync::{Arc, Weak};

use derive_more::Debug;
use parking_lot::Mutex;

use crate::capability::{CaptureCapability, VideoCodec};
use crate::error::CaptureError;
use crate::frame::{EncodedImage, RawVideoType, VideoFrame, VideoRotation, convert_to_i420};

/// Receives what a backend captures. Called on the backend's thread.
pub trait CaptureDataCallback: Send + Sync {
    fn on_incoming_captured_frame(&self, id: i32, frame: VideoFrame);
    fn on_incoming_encoded_frame(&self, id: i32, image: EncodedImage);
    fn on_capture_delay_changed(&self, id: i32, delay_ms: i32);
}

/// Encoder controls of a backend that can emit encoded frames.
pub trait CaptureEncodeInterface: Send + Sync {
    fn configure_encoder(&self, codec: &VideoCodec, max_payload_size: usize) -> Result<(), CaptureError>;
    fn set_rates(&self, bitrate_kbps: u32, frame_rate: u32) -> Result<(), CaptureError>;
    /// Ask for the next frame to be a key frame.
    fn request_key_frame(&self) -> Result<(), CaptureError>;
}

pub trait VideoCaptureModule: Send + Sync {
    fn register_capture_data_callback(&self, id: i32, callback: Weak<dyn CaptureDataCallback>);
    fn deregister_capture_data_callback(&self);
    fn start_capture(&self, capability: &CaptureCapability) -> Result<(), CaptureError>;
    fn stop_capture(&self) -> Result<(), CaptureError>;
    fn capture_started(&self) -> bool;
    /// The capability the backend currently runs at.
    fn capture_settings(&self) -> Option<CaptureCapability>;
    fn set_capture_delay(&self, delay_ms: i32);
    fn capture_delay(&self) -> i32;
    fn set_capture_rotation(&self, rotation: VideoRotation) -> Result<(), CaptureError>;
    /// Encoder controls for `codec`, or `None` when the backend only
    /// produces raw frames.
    fn encode_interface(&self, _codec: &VideoCodec) -> Option<Arc<dyn CaptureEncodeInterface>> {
        None
    }
}

#[derive(Debug, Default)]
struct ExternalState {
    id: i32,
    #[debug(skip)]
    callback: Option<Weak<dyn CaptureDataCallback>>,
    settings: Option<CaptureCapability>,
    started: bool,
    delay_ms: i32,
    rotation: VideoRotation,
}

/// Encoder settings recorded by an [`ExternalCapture`] with encoder support.
#[derive(Debug, Default)]
pub struct ExternalEncoder {
    state: Mutex<ExternalEncoderState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalEncoderState {
    pub codec: Option<VideoCodec>,
    pub max_payload_size: usize,
    pub bitrate_kbps: u32,
    pub frame_rate: u32,
    pub key_frame_requests: u32,
}

impl ExternalEncoder {
    pub fn state(&self) -> ExternalEncoderState {
        self.state.lock().clone()
    }
}

impl CaptureEncodeInterface for ExternalEncoder {
    fn configure_encoder(&self, codec: &VideoCodec, max_payload_size: usize) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.codec = Some(*codec);
        state.max_payload_size = max_payload_size;
        state.bitrate_kbps = codec.start_bitrate_kbps;
        state.frame_rate = codec.max_fps;
        Ok(())
    }

    fn set_rates(&self, bitrate_kbps: u32, frame_rate: u32) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.bitrate_kbps = bitrate_kbps;
        state.frame_rate = frame_rate;
        Ok(())
    }

    fn request_key_frame(&self) -> Result<(), CaptureError> {
        self.state.lock().key_frame_requests += 1;
        Ok(())
    }
}

/// Backend fed by the application.
#[derive(Debug, Default)]
pub struct ExternalCapture {
    state: Mutex<ExternalState>,
    encoder: Option<Arc<ExternalEncoder>>,
}

impl ExternalCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that also accepts encoded frames.
    pub fn with_encoder() -> Self {
        Self {
            state: Mutex::default(),
            encoder: Some(Arc::default()),
        }
    }

    pub fn encoder(&self) -> Option<&ExternalEncoder> {
        self.encoder.as_deref()
    }

    /// Convert a captured buffer and pass it on.
    pub fn incoming_frame(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        raw_type: RawVideoType,
        capture_time_ms: i64,
    ) -> Result<(), CaptureError> {
        let (id, callback, rotation, delay_ms) = {
            let state = self.state.lock();
            (state.id, state.callback.clone(), state.rotation, state.delay_ms)
        };
        let mut frame = convert_to_i420(data, width, height, raw_type, rotation)?;
        frame.capture_time_ms = capture_time_ms;
        frame.render_time_ms = capture_time_ms + i64::from(delay_ms);
        let callback = callback
            .and_then(|cb| cb.upgrade())
            .ok_or(CaptureError::CallbackNotRegistered)?;
        callback.on_incoming_captured_frame(id, frame);
        Ok(())
    }

    /// Pass on a frame the application encoded. Blocks while a previous
    /// encoded frame is still being delivered.
    pub fn incoming_encoded_frame(&self, mut image: EncodedImage) -> Result<(), CaptureError> {
        if self.encoder.is_none() {
            return Err(CaptureError::UnsupportedEncodeInterface);
        }
        let (id, callback, delay_ms) = {
            let state = self.state.lock();
            (state.id, state.callback.clone(), state.delay_ms)
        };
        image.set_render_time_ms(image.capture_time_ms + i64::from(delay_ms));
        let callback = callback
            .and_then(|cb| cb.upgrade())
            .ok_or(CaptureError::CallbackNotRegistered)?;
        callback.on_incoming_encoded_frame(id, image);
        Ok(())
    }

    pub fn rotation(&self) -> VideoRotation {
        self.state.lock().rotation
    }
}

impl VideoCaptureModule for ExternalCapture {
    fn register_capture_data_callback(&self, id: i32, callback: Weak<dyn CaptureDataCallback>) {
        let mut state = self.state.lock();
        state.id = id;
        state.callback = Some(callback);
    }

    fn deregister_capture_data_callback(&self) {
        self.state.lock().callback = None;
    }

    fn start_capture(&self, capability: &CaptureCapability) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.settings = Some(*capability);
        state.started = true;
        tracing::debug!(?capability, "external capture started");
        Ok(())
    }

    fn stop_capture(&self) -> Result<(), CaptureError> {
        self.state.lock().started = false;
        Ok(())
    }

    fn capture_started(&self) -> bool {
        self.state.lock().started
    }

    fn capture_settings(&self) -> Option<CaptureCapability> {
        self.state.lock().settings
    }

    fn set_capture_delay(&self, delay_ms: i32) {
        let (id, callback) = {
            let mut state = self.state.lock();
            state.delay_ms = delay_ms;
            (state.id, state.callback.clone())
        };
        if let Some(callback) = callback.and_then(|cb| cb.upgrade()) {
            callback.on_capture_delay_changed(id, delay_ms);
        }
    }

    fn capture_delay(&self) -> i32 {
        self.state.lock().delay_ms
    }

    fn set_capture_rotation(&self, rotation: VideoRotation) -> Result<(), CaptureError> {
        self.state.lock().rotation = rotation;
        Ok(())
    }

    fn encode_interface(&self, _codec: &VideoCodec) -> Option<Arc<dyn CaptureEncodeInterface>> {
        self.encoder
            .clone()
            .map(|encoder| encoder as Arc<dyn CaptureEncodeInterface>)
    }
}
