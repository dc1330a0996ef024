//! The capturer: owns a capture backend and moves what it produces to the
//! registered consumers.
//!
//! Three threads touch a capturer. The backend's own thread deposits
//! frames into a single-slot mailbox and returns. The capture thread moves
//! them into the deliver slot. The deliver thread runs the enhancement
//! chain and fans frames out. Newer frames replace undelivered ones.
//!
//! Locks are taken in this order and never the other way around:
//!
//! * deliver → provider, capture, encoder, observer
//! * control → provider, encoder, deliver
//!
//! The capture thread releases the capture lock before taking the deliver
//! lock. Nothing takes control while holding deliver.
//!
//! C++ source: `webrtc/video_engine/vie_capturer.cc`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use derive_more::Debug;
use parking_lot::Mutex;

use crate::capability::{CaptureCapability, VideoCodec};
use crate::capture_module::{CaptureDataCallback, CaptureEncodeInterface, ExternalCapture, VideoCaptureModule};
use crate::config::CapturerConfig;
use crate::error::CaptureError;
use crate::event::Event;
use crate::frame::{EncodedImage, RawVideoType, VideoFrame, VideoRotation};
use crate::frame_provider::{ConsumerSet, EffectFilter, FrameCallback, deliver_to_all};
use crate::image_processing::{Brightness, Enhancement, ImageProcessingRef};
use crate::observer::{CaptureObserver, FrameRateTracker, NoPictureMonitor};
use crate::overuse_detector::{CpuOveruseObserver, LoadState, OveruseDetector};
use crate::quality_adapter::{DegradationPreference, DegradationPreferenceListener, QualityAdapter};

/// Largest payload an encoding backend is configured for.
const MAX_PAYLOAD_SIZE: usize = 1440;

// ─── Encoder binding ───────────────────────────────────────────────

/// An encoder that can take its input straight from the capture backend.
///
/// While bound through [`Capturer::pre_encode_to_encoder`] the encoder
/// gets encoded frames through [`encoded`](Self::encoded) instead of raw
/// frames through [`FrameCallback::deliver_frame`].
pub trait VideoEncoderSink: FrameCallback {
    fn codec(&self) -> VideoCodec;
    fn encoded(&self, image: &EncodedImage) -> Result<(), CaptureError>;
    fn register_external_encoder(
        &self,
        encoder: Arc<CaptureEncoder>,
        payload_type: u8,
    ) -> Result<(), CaptureError>;
    fn deregister_external_encoder(&self, payload_type: u8) -> Result<(), CaptureError>;
}

/// Decodes the encoded stream for local preview.
pub trait PreviewDecoder: Send + Sync {
    fn decode(&self, image: &EncodedImage) -> Result<Option<VideoFrame>, CaptureError>;
}

/// Encoder implementation a bound encoder drives; forwards to the
/// capture backend.
#[derive(Debug)]
pub struct CaptureEncoder {
    #[debug(skip)]
    interface: Arc<dyn CaptureEncodeInterface>,
    codec: VideoCodec,
}

impl CaptureEncoder {
    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    pub fn init_encode(&self, codec: &VideoCodec) -> Result<(), CaptureError> {
        self.interface.configure_encoder(codec, MAX_PAYLOAD_SIZE)
    }

    pub fn set_rates(&self, bitrate_kbps: u32, frame_rate: u32) -> Result<(), CaptureError> {
        self.interface.set_rates(bitrate_kbps, frame_rate)
    }

    pub fn request_key_frame(&self) -> Result<(), CaptureError> {
        self.interface.request_key_frame()
    }
}

#[derive(Debug)]
struct EncoderBinding {
    #[debug(skip)]
    encoder: Arc<dyn VideoEncoderSink>,
    #[debug(skip)]
    decoder: Option<Arc<dyn PreviewDecoder>>,
    codec: VideoCodec,
}

// ─── Shared state ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ControlState {
    started: bool,
    fixed: Option<CaptureCapability>,
    adapter: QualityAdapter,
    #[debug(skip)]
    listeners: Vec<Arc<dyn DegradationPreferenceListener>>,
}

#[derive(Debug, Default)]
struct CaptureSlot {
    frame: Option<VideoFrame>,
    encoded: Option<EncodedImage>,
    /// An encoded frame was accepted and has not been delivered yet.
    encoded_in_flight: bool,
}

#[derive(Debug)]
struct DeliverState {
    frame: Option<VideoFrame>,
    encoded: Option<EncodedImage>,
    image_processing: ImageProcessingRef,
    #[debug(skip)]
    effect_filter: Option<Arc<dyn EffectFilter>>,
    brightness: Brightness,
    reported_brightness: Brightness,
    overuse: OveruseDetector,
    frame_rate: FrameRateTracker,
    no_picture: NoPictureMonitor,
}

#[derive(Debug, Default)]
struct Counters {
    dropped_raw: AtomicU64,
    dropped_encoded: AtomicU64,
    delivered: AtomicU64,
    warnings: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct Inner {
    id: i32,
    config: CapturerConfig,
    #[debug(skip)]
    backend: Arc<dyn VideoCaptureModule>,
    control: Mutex<ControlState>,
    provider: Mutex<ConsumerSet>,
    capture: Mutex<CaptureSlot>,
    deliver: Mutex<DeliverState>,
    encoder: Mutex<Option<EncoderBinding>>,
    #[debug(skip)]
    observer: Mutex<Option<Arc<dyn CaptureObserver>>>,
    capture_event: Event,
    deliver_event: Event,
    encoded_drained: Event,
    capturing: AtomicBool,
    shutdown: AtomicBool,
    counters: Counters,
}

// ─── Worker threads ────────────────────────────────────────────────

#[derive(Debug)]
struct Worker {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    exited: Arc<Event>,
}

fn spawn_worker(inner: &Arc<Inner>, name: &'static str, run: fn(&Inner)) -> Result<Worker, CaptureError> {
    let running = Arc::new(Event::new());
    let exited = Arc::new(Event::new());
    let handle = thread::Builder::new()
        .name(format!("vie-{name}-{}", inner.id))
        .spawn({
            let inner = Arc::clone(inner);
            let running = Arc::clone(&running);
            let exited = Arc::clone(&exited);
            move || {
                running.set();
                run(&inner);
                exited.set();
            }
        })
        .map_err(|err| {
            tracing::error!(name, %err, "failed to spawn worker thread");
            CaptureError::ThreadSpawn(name)
        })?;
    if !running.wait(inner.config.thread_timeout()) {
        tracing::warn!(name, "worker thread did not start in time");
        return Err(CaptureError::ThreadTimeout(name));
    }
    Ok(Worker {
        name,
        handle: Some(handle),
        exited,
    })
}

impl Worker {
    fn stop(&mut self, inner: &Inner) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if !self.exited.wait(inner.config.thread_timeout()) {
            tracing::warn!(name = self.name, "worker thread did not stop in time, leaking it");
            Counters::bump(&inner.counters.warnings);
            return;
        }
        if handle.join().is_err() {
            tracing::error!(name = self.name, "worker thread panicked");
            Counters::bump(&inner.counters.errors);
        }
    }
}

// ─── Pipeline ──────────────────────────────────────────────────────

impl Inner {
    fn capture_loop(&self) {
        while !self.shutdown.load(Ordering::Acquire) {
            if self.capture_event.wait(self.config.thread_poll()) {
                self.move_captured();
            }
        }
    }

    fn deliver_loop(&self) {
        while !self.shutdown.load(Ordering::Acquire) {
            if self.deliver_event.wait(self.config.thread_poll()) {
                self.deliver_pending();
            }
            self.check_no_picture();
        }
    }

    /// Capture slot to deliver slot.
    fn move_captured(&self) {
        let (frame, encoded) = {
            let mut slot = self.capture.lock();
            (slot.frame.take(), slot.encoded.take())
        };
        if frame.is_none() && encoded.is_none() {
            return;
        }
        {
            let mut deliver = self.deliver.lock();
            if let Some(frame) = frame
                && deliver.frame.replace(frame).is_some()
            {
                tracing::warn!(id = self.id, "raw frame not delivered in time, dropped");
                Counters::bump(&self.counters.dropped_raw);
                Counters::bump(&self.counters.warnings);
            }
            if let Some(image) = encoded
                && deliver.encoded.replace(image).is_some()
            {
                tracing::warn!(id = self.id, "encoded frame not delivered in time, dropped");
                Counters::bump(&self.counters.dropped_encoded);
                Counters::bump(&self.counters.warnings);
            }
        }
        self.deliver_event.set();
    }

    fn deliver_pending(&self) {
        let load_change = {
            let mut deliver = self.deliver.lock();
            let frame = deliver.frame.take();
            let encoded = deliver.encoded.take();
            let change = frame.and_then(|frame| self.deliver_raw(&mut deliver, frame));
            if let Some(image) = encoded {
                self.deliver_encoded(image);
            }
            change
        };
        if let Some(state) = load_change {
            self.on_load_changed(state);
        }
    }

    fn deliver_raw(&self, state: &mut DeliverState, mut frame: VideoFrame) -> Option<LoadState> {
        let start = Instant::now();
        if let Some(alarm) = state.no_picture.on_frame(start) {
            self.notify(|observer| observer.no_picture_alarm(self.id, alarm));
        }

        let deflicker = state.image_processing.is_enabled(Enhancement::Deflickering);
        let denoise = state.image_processing.is_enabled(Enhancement::Denoising);
        let brightness = state.image_processing.is_enabled(Enhancement::BrightnessAlarm);
        if let Some(module) = state.image_processing.module_mut() {
            if deflicker {
                let stats = module.frame_stats(&frame);
                if !module.deflickering(&mut frame, &stats) {
                    tracing::debug!(id = self.id, "deflickering skipped, no frame stats");
                }
            }
            if denoise {
                module.denoising(&mut frame);
            }
            if brightness {
                let stats = module.frame_stats(&frame);
                state.brightness = module.brightness_detection(&stats, self.config.brightness.alarm_frames);
            }
        }

        if let Some(filter) = &state.effect_filter
            && let Err(err) = filter.transform(&mut frame)
        {
            tracing::warn!(id = self.id, %err, "effect filter failed");
            Counters::bump(&self.counters.errors);
        }

        let consumers = self.provider.lock().snapshot();
        let failed = deliver_to_all(self.id, &consumers, &frame);
        for _ in 0..failed {
            Counters::bump(&self.counters.errors);
        }
        Counters::bump(&self.counters.delivered);

        if let Some(fps) = state.frame_rate.on_frame(frame.capture_time_ms) {
            self.notify(|observer| observer.captured_frame_rate(self.id, fps));
        }
        if brightness && state.brightness != state.reported_brightness {
            let current = state.brightness;
            state.reported_brightness = current;
            self.notify(|observer| observer.brightness_alarm(self.id, current));
        }

        state.overuse.frame_processed(start.elapsed().as_secs_f64() * 1000.0)
    }

    fn deliver_encoded(&self, image: EncodedImage) {
        let binding = self
            .encoder
            .lock()
            .as_ref()
            .map(|b| (Arc::clone(&b.encoder), b.decoder.clone()));
        match binding {
            Some((encoder, decoder)) => {
                if let Err(err) = encoder.encoded(&image) {
                    tracing::warn!(id = self.id, %err, "encoder rejected encoded frame");
                    Counters::bump(&self.counters.errors);
                }
                if let Some(decoder) = decoder {
                    self.deliver_preview(decoder.as_ref(), &image);
                }
            }
            None => {
                tracing::debug!(id = self.id, "encoded frame without a bound encoder");
                Counters::bump(&self.counters.dropped_encoded);
            }
        }
        {
            let mut slot = self.capture.lock();
            slot.encoded_in_flight = slot.encoded.is_some();
        }
        self.encoded_drained.set();
    }

    fn deliver_preview(&self, decoder: &dyn PreviewDecoder, image: &EncodedImage) {
        match decoder.decode(image) {
            Ok(Some(mut frame)) => {
                frame.capture_time_ms = image.capture_time_ms;
                frame.render_time_ms = image.render_time_ms;
                let consumers = self.provider.lock().snapshot();
                deliver_to_all(self.id, &consumers, &frame);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(id = self.id, %err, "preview decode failed");
                Counters::bump(&self.counters.errors);
            }
        }
    }

    fn check_no_picture(&self) {
        if !self.capturing.load(Ordering::Acquire) {
            return;
        }
        let alarm = self.deliver.lock().no_picture.poll(Instant::now());
        if let Some(alarm) = alarm {
            tracing::warn!(id = self.id, "no picture from capture backend");
            Counters::bump(&self.counters.warnings);
            self.notify(|observer| observer.no_picture_alarm(self.id, alarm));
        }
    }

    fn notify(&self, f: impl FnOnce(&dyn CaptureObserver)) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            f(observer.as_ref());
        }
    }

    // ─── Negotiation ───

    /// What the backend should run at now.
    fn desired_capability(&self, control: &ControlState) -> CaptureCapability {
        if let Some(codec) = self.encoder.lock().as_ref().map(|b| b.codec) {
            return codec.capability();
        }
        if let Some(fixed) = control.fixed {
            return fixed;
        }
        let base = self.provider.lock().best_format(self.config.default_format);
        CaptureCapability::new(control.adapter.target(base))
    }

    /// Restart the backend when it does not run at the desired capability.
    fn renegotiate(&self, control: &ControlState) -> Result<(), CaptureError> {
        if !control.started {
            return Ok(());
        }
        let desired = self.desired_capability(control);
        if self.backend.capture_started() && self.backend.capture_settings() == Some(desired) {
            return Ok(());
        }
        tracing::warn!(id = self.id, capability = ?desired, "restarting capture");
        Counters::bump(&self.counters.warnings);
        self.backend.stop_capture()?;
        self.backend.start_capture(&desired)
    }

    /// Consumers or their preferences changed.
    fn frame_callback_changed(&self) -> Result<(), CaptureError> {
        let control = self.control.lock();
        if control.fixed.is_some() || self.encoder.lock().is_some() {
            return Ok(());
        }
        self.renegotiate(&control)
    }

    fn on_load_changed(&self, state: LoadState) {
        let mut control = self.control.lock();
        if !control.started || control.fixed.is_some() || self.encoder.lock().is_some() {
            return;
        }
        let base = self.provider.lock().best_format(self.config.default_format);
        let target = match state {
            LoadState::Overuse => control.adapter.adapt_down(base),
            LoadState::Normal => control.adapter.adapt_up(base),
        };
        if target.is_none() {
            return;
        }
        if let Err(err) = self.renegotiate(&control) {
            tracing::error!(id = self.id, %err, "failed to apply adapted format");
            Counters::bump(&self.counters.errors);
        }
    }

    /// Wait for a delivery that may still use something just removed.
    fn wait_for_delivery(&self) {
        drop(self.deliver.lock());
    }
}

impl CaptureDataCallback for Inner {
    fn on_incoming_captured_frame(&self, _id: i32, frame: VideoFrame) {
        if self.capture.lock().frame.replace(frame).is_some() {
            tracing::warn!(id = self.id, "captured frame overwritten before delivery");
            Counters::bump(&self.counters.dropped_raw);
            Counters::bump(&self.counters.warnings);
        }
        self.capture_event.set();
    }

    fn on_incoming_encoded_frame(&self, _id: i32, image: EncodedImage) {
        self.encoded_drained.reset();
        if self.capture.lock().encoded_in_flight {
            self.encoded_drained.wait(self.config.encoded_frame_wait());
        }
        {
            let mut slot = self.capture.lock();
            if slot.encoded_in_flight && slot.encoded.is_none() {
                tracing::warn!(id = self.id, "previous encoded frame still being delivered, dropping frame");
                Counters::bump(&self.counters.dropped_encoded);
                Counters::bump(&self.counters.warnings);
                return;
            }
            if slot.encoded.replace(image).is_some() {
                tracing::warn!(id = self.id, "encoded frame not taken in time, replacing it");
                Counters::bump(&self.counters.dropped_encoded);
                Counters::bump(&self.counters.warnings);
            }
            slot.encoded_in_flight = true;
        }
        self.capture_event.set();
    }

    fn on_capture_delay_changed(&self, _id: i32, delay_ms: i32) {
        let consumers = self.provider.lock().snapshot();
        for consumer in consumers {
            consumer.delay_changed(self.id, delay_ms);
        }
    }
}

// ─── Public API ────────────────────────────────────────────────────

/// A capture source and its consumers.
#[derive(Debug)]
pub struct Capturer {
    inner: Arc<Inner>,
    workers: Vec<Worker>,
    external: Option<Arc<ExternalCapture>>,
}

impl Capturer {
    pub fn new(id: i32, backend: Arc<dyn VideoCaptureModule>, config: CapturerConfig) -> Result<Self, CaptureError> {
        Self::build(id, backend, None, config)
    }

    /// A capturer fed through [`incoming_frame`](Self::incoming_frame).
    pub fn new_external(id: i32, external: Arc<ExternalCapture>, config: CapturerConfig) -> Result<Self, CaptureError> {
        let backend: Arc<dyn VideoCaptureModule> = external.clone();
        Self::build(id, backend, Some(external), config)
    }

    fn build(
        id: i32,
        backend: Arc<dyn VideoCaptureModule>,
        external: Option<Arc<ExternalCapture>>,
        config: CapturerConfig,
    ) -> Result<Self, CaptureError> {
        let deliver = DeliverState {
            frame: None,
            encoded: None,
            image_processing: ImageProcessingRef::default(),
            effect_filter: None,
            brightness: Brightness::Normal,
            reported_brightness: Brightness::Normal,
            overuse: OveruseDetector::new(config.overuse.clone()),
            frame_rate: FrameRateTracker::default(),
            no_picture: NoPictureMonitor::new(config.no_picture_alarm()),
        };
        let inner = Arc::new(Inner {
            id,
            config,
            backend,
            control: Mutex::default(),
            provider: Mutex::default(),
            capture: Mutex::default(),
            deliver: Mutex::new(deliver),
            encoder: Mutex::new(None),
            observer: Mutex::new(None),
            capture_event: Event::new(),
            deliver_event: Event::new(),
            encoded_drained: Event::new(),
            capturing: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            counters: Counters::default(),
        });
        let callback: Weak<Inner> = Arc::downgrade(&inner);
        inner.backend.register_capture_data_callback(id, callback);

        let mut capturer = Self {
            inner,
            workers: Vec::with_capacity(2),
            external,
        };
        capturer
            .workers
            .push(spawn_worker(&capturer.inner, "capture", Inner::capture_loop)?);
        capturer
            .workers
            .push(spawn_worker(&capturer.inner, "deliver", Inner::deliver_loop)?);
        tracing::debug!(id, "capturer created");
        Ok(capturer)
    }

    pub fn id(&self) -> i32 {
        self.inner.id
    }

    // ─── Start / stop ───

    /// Start capturing.
    ///
    /// A bound encoder's codec decides the capability. Otherwise a fully
    /// set `capability` is used as is, and anything else is negotiated
    /// from the consumers' preferred formats.
    pub fn start(&self, capability: CaptureCapability) -> Result<(), CaptureError> {
        let mut control = self.inner.control.lock();
        if control.started {
            return Err(CaptureError::AlreadyStarted);
        }
        control.fixed = capability.is_fixed().then_some(capability);
        let desired = self.inner.desired_capability(&control);
        self.inner.backend.start_capture(&desired)?;
        control.started = true;
        {
            let mut deliver = self.inner.deliver.lock();
            deliver.no_picture.restart(Instant::now());
            deliver.frame_rate.reset();
        }
        self.inner.capturing.store(true, Ordering::Release);
        tracing::debug!(id = self.inner.id, capability = ?desired, "capture started");
        Ok(())
    }

    pub fn stop(&self) -> Result<(), CaptureError> {
        let mut control = self.inner.control.lock();
        if !control.started {
            return Err(CaptureError::NotStarted);
        }
        self.inner.capturing.store(false, Ordering::Release);
        control.started = false;
        self.inner.backend.stop_capture()?;
        tracing::debug!(id = self.inner.id, "capture stopped");
        Ok(())
    }

    pub fn started(&self) -> bool {
        self.inner.control.lock().started
    }

    /// The capability the backend runs at.
    pub fn capture_settings(&self) -> Option<CaptureCapability> {
        self.inner.backend.capture_settings()
    }

    pub fn set_capture_delay(&self, delay_ms: i32) {
        self.inner.backend.set_capture_delay(delay_ms);
    }

    pub fn capture_delay(&self) -> i32 {
        self.inner.backend.capture_delay()
    }

    pub fn set_rotation(&self, rotation: VideoRotation) -> Result<(), CaptureError> {
        self.inner.backend.set_capture_rotation(rotation)
    }

    // ─── External capture ───

    pub fn incoming_frame(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        raw_type: RawVideoType,
        capture_time_ms: i64,
    ) -> Result<(), CaptureError> {
        self.external()?
            .incoming_frame(data, width, height, raw_type, capture_time_ms)
    }

    pub fn incoming_encoded_frame(&self, image: EncodedImage) -> Result<(), CaptureError> {
        self.external()?.incoming_encoded_frame(image)
    }

    fn external(&self) -> Result<&ExternalCapture, CaptureError> {
        self.external
            .as_deref()
            .ok_or_else(|| CaptureError::Backend("capturer is not fed externally".into()))
    }

    // ─── Consumers ───

    pub fn register_frame_callback(&self, consumer: Arc<dyn FrameCallback>) -> Result<(), CaptureError> {
        self.inner.provider.lock().register(consumer)?;
        self.inner.frame_callback_changed()
    }

    /// Returns once no delivery to `consumer` is in progress.
    pub fn deregister_frame_callback(&self, consumer: &Arc<dyn FrameCallback>) -> Result<(), CaptureError> {
        self.inner.provider.lock().deregister(consumer)?;
        self.inner.wait_for_delivery();
        self.inner.frame_callback_changed()
    }

    pub fn is_frame_callback_registered(&self, consumer: &Arc<dyn FrameCallback>) -> bool {
        self.inner.provider.lock().contains(consumer)
    }

    pub fn num_frame_callbacks(&self) -> usize {
        self.inner.provider.lock().len()
    }

    /// Call after a registered consumer changed its preferred format.
    pub fn frame_callback_changed(&self) -> Result<(), CaptureError> {
        self.inner.frame_callback_changed()
    }

    // ─── Enhancements ───

    pub fn register_effect_filter(&self, filter: Arc<dyn EffectFilter>) -> Result<(), CaptureError> {
        let mut deliver = self.inner.deliver.lock();
        if deliver.effect_filter.is_some() {
            return Err(CaptureError::EffectFilterAlreadyRegistered);
        }
        deliver.effect_filter = Some(filter);
        Ok(())
    }

    pub fn deregister_effect_filter(&self) -> Result<(), CaptureError> {
        match self.inner.deliver.lock().effect_filter.take() {
            Some(_) => Ok(()),
            None => Err(CaptureError::EffectFilterNotRegistered),
        }
    }

    pub fn enable_denoising(&self, enable: bool) {
        self.set_enhancement(Enhancement::Denoising, enable);
    }

    pub fn enable_deflickering(&self, enable: bool) {
        self.set_enhancement(Enhancement::Deflickering, enable);
    }

    pub fn enable_brightness_alarm(&self, enable: bool) {
        let mut deliver = self.inner.deliver.lock();
        if !enable {
            deliver.brightness = Brightness::Normal;
            deliver.reported_brightness = Brightness::Normal;
        }
        if !deliver.image_processing.set(Enhancement::BrightnessAlarm, enable) {
            tracing::debug!(id = self.inner.id, enable, "brightness alarm unchanged");
        }
    }

    fn set_enhancement(&self, enhancement: Enhancement, enable: bool) {
        let mut deliver = self.inner.deliver.lock();
        if !deliver.image_processing.set(enhancement, enable) {
            tracing::debug!(id = self.inner.id, ?enhancement, enable, "enhancement unchanged");
        }
    }

    pub fn is_enhancement_enabled(&self, enhancement: Enhancement) -> bool {
        self.inner.deliver.lock().image_processing.is_enabled(enhancement)
    }

    pub fn has_image_processing(&self) -> bool {
        self.inner.deliver.lock().image_processing.has_module()
    }

    // ─── Observers ───

    pub fn register_observer(&self, observer: Arc<dyn CaptureObserver>) -> Result<(), CaptureError> {
        let mut slot = self.inner.observer.lock();
        if slot.is_some() {
            return Err(CaptureError::ObserverAlreadyRegistered);
        }
        *slot = Some(observer);
        Ok(())
    }

    pub fn deregister_observer(&self) -> Result<(), CaptureError> {
        match self.inner.observer.lock().take() {
            Some(_) => Ok(()),
            None => Err(CaptureError::ObserverNotRegistered),
        }
    }

    pub fn register_cpu_overuse_observer(&self, observer: Option<Arc<dyn CpuOveruseObserver>>) {
        self.inner.deliver.lock().overuse.set_observer(observer);
    }

    // ─── Adaptation ───

    pub fn degradation_preference(&self) -> DegradationPreference {
        self.inner.control.lock().adapter.preference()
    }

    pub fn set_degradation_preference(&self, preference: DegradationPreference) -> Result<(), CaptureError> {
        let listeners = {
            let mut control = self.inner.control.lock();
            if !control.adapter.set_preference(preference) {
                return Ok(());
            }
            if control.fixed.is_none() && self.inner.encoder.lock().is_none() {
                self.inner.renegotiate(&control)?;
            }
            control.listeners.clone()
        };
        for listener in listeners {
            listener.on_degradation_preference_updated(preference);
        }
        Ok(())
    }

    pub fn register_degradation_listener(&self, listener: Arc<dyn DegradationPreferenceListener>) {
        self.inner.control.lock().listeners.push(listener);
    }

    pub fn deregister_degradation_listener(&self, listener: &Arc<dyn DegradationPreferenceListener>) -> bool {
        let mut control = self.inner.control.lock();
        let before = control.listeners.len();
        control
            .listeners
            .retain(|l| !std::ptr::eq(Arc::as_ptr(l) as *const (), Arc::as_ptr(listener) as *const ()));
        control.listeners.len() != before
    }

    /// Feed a load transition as if the overuse detector had seen it.
    pub fn on_load_changed(&self, state: LoadState) {
        self.inner.on_load_changed(state);
    }

    // ─── Encoder binding ───

    /// Make `encoder` take encoded frames straight from the backend.
    ///
    /// The encoder leaves the raw consumer set until
    /// [`release_encoder`](Self::release_encoder). With a `decoder`, the
    /// encoded stream is decoded and given to the raw consumers for
    /// preview.
    pub fn pre_encode_to_encoder(
        &self,
        encoder: Arc<dyn VideoEncoderSink>,
        decoder: Option<Arc<dyn PreviewDecoder>>,
    ) -> Result<(), CaptureError> {
        let control = self.inner.control.lock();
        let codec = {
            let mut slot = self.inner.encoder.lock();
            if slot.is_some() {
                return Err(CaptureError::EncoderAlreadyBound);
            }
            let codec = encoder.codec();
            let interface = self
                .inner
                .backend
                .encode_interface(&codec)
                .ok_or(CaptureError::UnsupportedEncodeInterface)?;
            let capture_encoder = Arc::new(CaptureEncoder { interface, codec });
            encoder.register_external_encoder(capture_encoder, codec.payload_type)?;
            *slot = Some(EncoderBinding {
                encoder: Arc::clone(&encoder),
                decoder,
                codec,
            });
            codec
        };
        let consumer: Arc<dyn FrameCallback> = encoder;
        if self.inner.provider.lock().deregister(&consumer).is_ok() {
            self.inner.wait_for_delivery();
        }
        tracing::debug!(id = self.inner.id, ?codec, "encoder bound to capture");
        self.inner.renegotiate(&control)
    }

    /// Undo [`pre_encode_to_encoder`](Self::pre_encode_to_encoder).
    pub fn release_encoder(&self) -> Result<(), CaptureError> {
        let control = self.inner.control.lock();
        let binding = self
            .inner
            .encoder
            .lock()
            .take()
            .ok_or(CaptureError::EncoderNotBound)?;
        if let Err(err) = binding.encoder.deregister_external_encoder(binding.codec.payload_type) {
            tracing::warn!(id = self.inner.id, %err, "encoder refused to drop the capture encoder");
        }
        self.inner.wait_for_delivery();
        let consumer: Arc<dyn FrameCallback> = binding.encoder;
        match self.inner.provider.lock().register(consumer) {
            Ok(()) | Err(CaptureError::CallbackAlreadyRegistered) => {}
            Err(err) => return Err(err),
        }
        tracing::debug!(id = self.inner.id, "encoder released");
        self.inner.renegotiate(&control)
    }

    pub fn has_bound_encoder(&self) -> bool {
        self.inner.encoder.lock().is_some()
    }

    // ─── Counters ───

    pub fn dropped_raw_frames(&self) -> u64 {
        self.inner.counters.dropped_raw.load(Ordering::Relaxed)
    }

    pub fn dropped_encoded_frames(&self) -> u64 {
        self.inner.counters.dropped_encoded.load(Ordering::Relaxed)
    }

    pub fn delivered_frames(&self) -> u64 {
        self.inner.counters.delivered.load(Ordering::Relaxed)
    }

    pub fn warning_count(&self) -> u64 {
        self.inner.counters.warnings.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.inner.counters.errors.load(Ordering::Relaxed)
    }
}

impl Drop for Capturer {
    fn drop(&mut self) {
        let inner = &self.inner;
        if self.started()
            && let Err(err) = self.stop()
        {
            tracing::warn!(id = inner.id, %err, "failed to stop capture");
        }
        inner.backend.deregister_capture_data_callback();
        inner.shutdown.store(true, Ordering::Release);
        inner.capture_event.set();
        inner.deliver_event.set();
        inner.encoded_drained.set();
        for worker in &mut self.workers {
            worker.stop(inner);
        }
        for consumer in inner.provider.lock().snapshot() {
            consumer.provider_destroyed(inner.id);
        }
        tracing::debug!(id = inner.id, "capturer destroyed");
    }
}
