//! Format negotiation, encoded-frame backpressure and encoder binding.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use webrtc_video_capture::{
    CaptureCapability, CaptureDataCallback, CaptureEncoder, CaptureError, Capturer, CapturerConfig,
    DegradationPreference, DegradationPreferenceListener, EncodedImage, ExternalCapture,
    FrameCallback, LoadState, PreviewDecoder, RawVideoType, VideoCaptureModule, VideoCodec,
    VideoCodecType, VideoEncoderSink, VideoFormat, VideoFrame, VideoRotation,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

// ─── Helpers ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum BackendCall {
    Start(VideoFormat, Option<VideoCodecType>),
    Stop,
}

/// Backend that only records what it is asked to do.
#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
    settings: Mutex<Option<CaptureCapability>>,
    started: Mutex<bool>,
}

impl RecordingBackend {
    fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }
}

impl VideoCaptureModule for RecordingBackend {
    fn register_capture_data_callback(&self, _id: i32, _callback: Weak<dyn CaptureDataCallback>) {}

    fn deregister_capture_data_callback(&self) {}

    fn start_capture(&self, capability: &CaptureCapability) -> Result<(), CaptureError> {
        self.calls
            .lock()
            .push(BackendCall::Start(capability.format(), capability.codec_type));
        *self.settings.lock() = Some(*capability);
        *self.started.lock() = true;
        Ok(())
    }

    fn stop_capture(&self) -> Result<(), CaptureError> {
        self.calls.lock().push(BackendCall::Stop);
        *self.started.lock() = false;
        Ok(())
    }

    fn capture_started(&self) -> bool {
        *self.started.lock()
    }

    fn capture_settings(&self) -> Option<CaptureCapability> {
        *self.settings.lock()
    }

    fn set_capture_delay(&self, _delay_ms: i32) {}

    fn capture_delay(&self) -> i32 {
        0
    }

    fn set_capture_rotation(&self, _rotation: VideoRotation) -> Result<(), CaptureError> {
        Ok(())
    }
}

#[derive(Default)]
struct Consumer {
    preferred: Option<VideoFormat>,
    frames: Mutex<Vec<VideoFrame>>,
}

impl Consumer {
    fn preferring(width: u32, height: u32, fps: u32) -> Arc<Self> {
        Arc::new(Self {
            preferred: Some(VideoFormat::new(width, height, fps)),
            ..Self::default()
        })
    }
}

impl FrameCallback for Consumer {
    fn deliver_frame(&self, _id: i32, frame: &VideoFrame) -> Result<(), CaptureError> {
        self.frames.lock().push(frame.clone());
        Ok(())
    }

    fn preferred_format(&self) -> Option<VideoFormat> {
        self.preferred
    }
}

const VP8: VideoCodec = VideoCodec {
    codec_type: VideoCodecType::Vp8,
    payload_type: 100,
    width: 320,
    height: 240,
    max_fps: 30,
    start_bitrate_kbps: 400,
};

/// Encoder that can take encoded frames from the capture backend.
#[derive(Default)]
struct Encoder {
    pause_ms: AtomicU64,
    raw: Mutex<Vec<i64>>,
    encoded: Mutex<Vec<i64>>,
    capture_encoder: Mutex<Option<Arc<CaptureEncoder>>>,
}

impl FrameCallback for Encoder {
    fn deliver_frame(&self, _id: i32, frame: &VideoFrame) -> Result<(), CaptureError> {
        self.raw.lock().push(frame.capture_time_ms);
        Ok(())
    }
}

impl VideoEncoderSink for Encoder {
    fn codec(&self) -> VideoCodec {
        VP8
    }

    fn encoded(&self, image: &EncodedImage) -> Result<(), CaptureError> {
        thread::sleep(Duration::from_millis(self.pause_ms.load(Ordering::SeqCst)));
        self.encoded.lock().push(image.capture_time_ms);
        Ok(())
    }

    fn register_external_encoder(&self, encoder: Arc<CaptureEncoder>, payload_type: u8) -> Result<(), CaptureError> {
        assert_eq!(payload_type, VP8.payload_type);
        encoder.init_encode(&VP8)?;
        *self.capture_encoder.lock() = Some(encoder);
        Ok(())
    }

    fn deregister_external_encoder(&self, _payload_type: u8) -> Result<(), CaptureError> {
        *self.capture_encoder.lock() = None;
        Ok(())
    }
}

fn image(capture_time_ms: i64) -> EncodedImage {
    EncodedImage {
        payload: vec![0x9d; 64],
        codec: VideoCodecType::Vp8,
        payload_type: VP8.payload_type,
        width: VP8.width,
        height: VP8.height,
        timestamp: 0,
        capture_time_ms,
        render_time_ms: 0,
        key_frame: capture_time_ms == 0,
    }
}

fn encoded_capturer(pause_ms: u64) -> (Capturer, Arc<Encoder>) {
    let external = Arc::new(ExternalCapture::with_encoder());
    let capturer = Capturer::new_external(7, external, CapturerConfig::default()).unwrap();
    let encoder = Arc::new(Encoder::default());
    encoder.pause_ms.store(pause_ms, Ordering::SeqCst);
    capturer.pre_encode_to_encoder(encoder.clone(), None).unwrap();
    capturer.start(CaptureCapability::default()).unwrap();
    (capturer, encoder)
}

// ─── Format negotiation ────────────────────────────────────────────

#[test]
fn best_format_follows_consumers() {
    init_tracing();
    let backend = Arc::new(RecordingBackend::default());
    let capturer = Capturer::new(1, backend.clone(), CapturerConfig::default()).unwrap();

    capturer.register_frame_callback(Consumer::preferring(640, 480, 30)).unwrap();
    capturer.start(CaptureCapability::default()).unwrap();
    assert!(capturer.started());
    assert_eq!(
        backend.calls(),
        vec![BackendCall::Start(VideoFormat::new(640, 480, 30), None)]
    );

    let hd: Arc<dyn FrameCallback> = Consumer::preferring(1280, 720, 15);
    capturer.register_frame_callback(hd.clone()).unwrap();
    assert_eq!(
        backend.calls()[1..],
        [BackendCall::Stop, BackendCall::Start(VideoFormat::new(1280, 720, 15), None)]
    );

    capturer.deregister_frame_callback(&hd).unwrap();
    assert_eq!(
        backend.calls()[3..],
        [BackendCall::Stop, BackendCall::Start(VideoFormat::new(640, 480, 30), None)]
    );

    // Same best format: nothing to restart.
    capturer.register_frame_callback(Consumer::preferring(320, 240, 30)).unwrap();
    assert_eq!(backend.calls().len(), 5);
}

#[test]
fn consumers_before_start_do_not_start_the_backend() {
    let backend = Arc::new(RecordingBackend::default());
    let capturer = Capturer::new(1, backend.clone(), CapturerConfig::default()).unwrap();
    capturer.register_frame_callback(Consumer::preferring(1280, 720, 30)).unwrap();
    assert!(backend.calls().is_empty());
    capturer.start(CaptureCapability::default()).unwrap();
    assert_eq!(
        backend.calls(),
        vec![BackendCall::Start(VideoFormat::new(1280, 720, 30), None)]
    );
}

#[test]
fn configured_default_fills_missing_preferences() {
    let backend = Arc::new(RecordingBackend::default());
    let config = CapturerConfig {
        default_format: VideoFormat::new(352, 288, 25),
        ..CapturerConfig::default()
    };
    let capturer = Capturer::new(1, backend.clone(), config).unwrap();
    capturer.register_frame_callback(Consumer::preferring(0, 0, 10)).unwrap();
    capturer.start(CaptureCapability::default()).unwrap();
    assert_eq!(
        backend.calls(),
        vec![BackendCall::Start(VideoFormat::new(352, 288, 10), None)]
    );
}

#[test]
fn drop_stops_capture_and_tells_consumers() {
    #[derive(Default)]
    struct Watcher {
        destroyed: Mutex<Vec<i32>>,
    }
    impl FrameCallback for Watcher {
        fn deliver_frame(&self, _id: i32, _frame: &VideoFrame) -> Result<(), CaptureError> {
            Ok(())
        }
        fn provider_destroyed(&self, id: i32) {
            self.destroyed.lock().push(id);
        }
    }

    let backend = Arc::new(RecordingBackend::default());
    let watcher = Arc::new(Watcher::default());
    {
        let capturer = Capturer::new(9, backend.clone(), CapturerConfig::default()).unwrap();
        capturer.register_frame_callback(watcher.clone()).unwrap();
        capturer.start(CaptureCapability::default()).unwrap();
    }
    assert_eq!(backend.calls().last(), Some(&BackendCall::Stop));
    assert_eq!(*watcher.destroyed.lock(), vec![9]);
}

// ─── Encoded-frame backpressure ────────────────────────────────────

#[test]
fn encoded_frame_waits_for_short_delivery() {
    init_tracing();
    let (capturer, encoder) = encoded_capturer(100);

    capturer.incoming_encoded_frame(image(0)).unwrap();
    let start = Instant::now();
    capturer.incoming_encoded_frame(image(33)).unwrap();
    let blocked = start.elapsed();
    assert!(blocked >= Duration::from_millis(50), "blocked for {blocked:?}");
    assert!(blocked < Duration::from_millis(500), "blocked for {blocked:?}");

    assert!(wait_until(|| encoder.encoded.lock().len() == 2));
    assert_eq!(*encoder.encoded.lock(), vec![0, 33]);
    assert_eq!(capturer.dropped_encoded_frames(), 0);
}

#[test]
fn encoded_frame_dropped_after_long_delivery() {
    init_tracing();
    let (capturer, encoder) = encoded_capturer(600);

    capturer.incoming_encoded_frame(image(0)).unwrap();
    let start = Instant::now();
    capturer.incoming_encoded_frame(image(33)).unwrap();
    let blocked = start.elapsed();
    assert!(blocked >= Duration::from_millis(450), "blocked for {blocked:?}");
    assert_eq!(capturer.dropped_encoded_frames(), 1);
    assert!(capturer.warning_count() >= 1);

    assert!(wait_until(|| encoder.encoded.lock().len() == 1));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(*encoder.encoded.lock(), vec![0]);

    // The pipeline keeps going once drained.
    encoder.pause_ms.store(0, Ordering::SeqCst);
    capturer.incoming_encoded_frame(image(66)).unwrap();
    assert!(wait_until(|| encoder.encoded.lock().len() == 2));
    assert_eq!(capturer.dropped_encoded_frames(), 1);
}

// ─── Encoder binding ───────────────────────────────────────────────

#[test]
fn bound_encoder_drives_capture_format() {
    let external = Arc::new(ExternalCapture::with_encoder());
    let capturer = Capturer::new_external(3, external.clone(), CapturerConfig::default()).unwrap();
    let encoder = Arc::new(Encoder::default());
    capturer.register_frame_callback(encoder.clone()).unwrap();
    capturer.register_frame_callback(Consumer::preferring(1280, 720, 30)).unwrap();
    capturer.start(CaptureCapability::default()).unwrap();
    assert_eq!(
        external.capture_settings().map(|c| c.format()),
        Some(VideoFormat::new(1280, 720, 30))
    );

    capturer.pre_encode_to_encoder(encoder.clone(), None).unwrap();
    assert!(capturer.has_bound_encoder());
    assert_eq!(capturer.num_frame_callbacks(), 1);
    let settings = external.capture_settings().unwrap();
    assert_eq!(settings.format(), VideoFormat::new(320, 240, 30));
    assert_eq!(settings.codec_type, Some(VideoCodecType::Vp8));
    assert_eq!(external.encoder().unwrap().state().codec, Some(VP8));
    assert!(encoder.capture_encoder.lock().is_some());
    assert_eq!(
        capturer.pre_encode_to_encoder(encoder.clone(), None),
        Err(CaptureError::EncoderAlreadyBound)
    );

    // Raw frames no longer reach the encoder.
    let data = vec![16u8; RawVideoType::I420.buffer_size(4, 4).unwrap()];
    capturer.incoming_frame(&data, 4, 4, RawVideoType::I420, 10).unwrap();
    assert!(wait_until(|| capturer.delivered_frames() == 1));
    assert!(encoder.raw.lock().is_empty());

    capturer.release_encoder().unwrap();
    assert!(!capturer.has_bound_encoder());
    assert!(encoder.capture_encoder.lock().is_none());
    assert_eq!(capturer.num_frame_callbacks(), 2);
    let settings = external.capture_settings().unwrap();
    assert_eq!(settings.format(), VideoFormat::new(1280, 720, 30));
    assert_eq!(settings.codec_type, None);

    capturer.incoming_frame(&data, 4, 4, RawVideoType::I420, 20).unwrap();
    assert!(wait_until(|| encoder.raw.lock().len() == 1));
}

#[test]
fn preview_decoder_feeds_raw_consumers() {
    struct Decoder;
    impl PreviewDecoder for Decoder {
        fn decode(&self, image: &EncodedImage) -> Result<Option<VideoFrame>, CaptureError> {
            Ok(Some(VideoFrame::new(image.width, image.height)))
        }
    }

    let external = Arc::new(ExternalCapture::with_encoder());
    let capturer = Capturer::new_external(4, external, CapturerConfig::default()).unwrap();
    let preview = Arc::new(Consumer::default());
    capturer.register_frame_callback(preview.clone()).unwrap();
    let encoder = Arc::new(Encoder::default());
    capturer
        .pre_encode_to_encoder(encoder.clone(), Some(Arc::new(Decoder)))
        .unwrap();

    capturer.incoming_encoded_frame(image(40)).unwrap();
    assert!(wait_until(|| preview.frames.lock().len() == 1));
    let frame = preview.frames.lock()[0].clone();
    assert_eq!((frame.width(), frame.height()), (VP8.width, VP8.height));
    assert_eq!(frame.capture_time_ms, 40);
    assert_eq!(*encoder.encoded.lock(), vec![40]);
}

#[test]
fn encoded_frames_without_encoder_support_are_rejected() {
    let external = Arc::new(ExternalCapture::new());
    let capturer = Capturer::new_external(5, external, CapturerConfig::default()).unwrap();
    assert_eq!(
        capturer.incoming_encoded_frame(image(0)),
        Err(CaptureError::UnsupportedEncodeInterface)
    );
    assert_eq!(
        capturer.pre_encode_to_encoder(Arc::new(Encoder::default()), None),
        Err(CaptureError::UnsupportedEncodeInterface)
    );
}

// ─── Adaptation ────────────────────────────────────────────────────

#[derive(Default)]
struct PreferenceLog(Mutex<Vec<DegradationPreference>>);

impl DegradationPreferenceListener for PreferenceLog {
    fn on_degradation_preference_updated(&self, preference: DegradationPreference) {
        self.0.lock().push(preference);
    }
}

#[test]
fn overuse_steps_down_and_normal_restores() {
    let backend = Arc::new(RecordingBackend::default());
    let capturer = Capturer::new(1, backend.clone(), CapturerConfig::default()).unwrap();
    let log = Arc::new(PreferenceLog::default());
    capturer.register_degradation_listener(log.clone());
    capturer
        .set_degradation_preference(DegradationPreference::MaintainFramerate)
        .unwrap();
    assert_eq!(*log.0.lock(), vec![DegradationPreference::MaintainFramerate]);

    capturer.start(CaptureCapability::default()).unwrap();
    capturer.on_load_changed(LoadState::Overuse);
    assert_eq!(
        backend.capture_settings().map(|c| c.format()),
        Some(VideoFormat::new(480, 360, 30))
    );
    capturer.on_load_changed(LoadState::Normal);
    assert_eq!(
        backend.capture_settings().map(|c| c.format()),
        Some(VideoFormat::new(640, 480, 30))
    );
    // Nothing left to restore.
    let calls = backend.calls().len();
    capturer.on_load_changed(LoadState::Normal);
    assert_eq!(backend.calls().len(), calls);
}

#[test]
fn preference_change_drops_adaptation() {
    let backend = Arc::new(RecordingBackend::default());
    let capturer = Capturer::new(1, backend.clone(), CapturerConfig::default()).unwrap();
    capturer
        .set_degradation_preference(DegradationPreference::MaintainResolution)
        .unwrap();
    capturer.start(CaptureCapability::default()).unwrap();
    capturer.on_load_changed(LoadState::Overuse);
    assert_eq!(
        backend.capture_settings().map(|c| c.format()),
        Some(VideoFormat::new(640, 480, 20))
    );
    capturer
        .set_degradation_preference(DegradationPreference::Balanced)
        .unwrap();
    assert_eq!(capturer.degradation_preference(), DegradationPreference::Balanced);
    assert_eq!(
        backend.capture_settings().map(|c| c.format()),
        Some(VideoFormat::new(640, 480, 30))
    );
}

#[test]
fn fixed_capability_is_never_adapted() {
    let backend = Arc::new(RecordingBackend::default());
    let capturer = Capturer::new(1, backend.clone(), CapturerConfig::default()).unwrap();
    let fixed = CaptureCapability::new(VideoFormat::new(800, 600, 30));
    capturer.start(fixed).unwrap();
    capturer.on_load_changed(LoadState::Overuse);
    assert_eq!(backend.capture_settings(), Some(fixed));
    assert_eq!(backend.calls().len(), 1);
}
