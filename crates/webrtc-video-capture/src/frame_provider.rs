//! Frame consumers and the set a capturer delivers to.
//!
//! C++ source: `webrtc/video_engine/vie_frame_provider_base.cc`

use std::sync::Arc;

use derive_more::Debug;

use crate::capability::{VideoFormat, best_format};
use crate::error::CaptureError;
use crate::frame::VideoFrame;

/// Receives I420 frames from a capturer.
pub trait FrameCallback: Send + Sync {
    /// Called on the deliver thread for every frame.
    fn deliver_frame(&self, id: i32, frame: &VideoFrame) -> Result<(), CaptureError>;

    /// The capture delay changed.
    fn delay_changed(&self, _id: i32, _delay_ms: i32) {}

    /// Format this consumer would like the capture to run at. Zero
    /// fields mean no preference.
    fn preferred_format(&self) -> Option<VideoFormat> {
        None
    }

    /// The capturer is going away.
    fn provider_destroyed(&self, _id: i32) {}
}

/// In-place transform run on every raw frame before fan-out.
pub trait EffectFilter: Send + Sync {
    fn transform(&self, frame: &mut VideoFrame) -> Result<(), CaptureError>;
}

pub(crate) fn same_consumer(a: &Arc<dyn FrameCallback>, b: &Arc<dyn FrameCallback>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Registered consumers in registration order.
#[derive(Debug, Default)]
pub struct ConsumerSet {
    #[debug(skip)]
    consumers: Vec<Arc<dyn FrameCallback>>,
}

impl ConsumerSet {
    pub fn register(&mut self, consumer: Arc<dyn FrameCallback>) -> Result<(), CaptureError> {
        if self.contains(&consumer) {
            return Err(CaptureError::CallbackAlreadyRegistered);
        }
        self.consumers.push(consumer);
        Ok(())
    }

    pub fn deregister(&mut self, consumer: &Arc<dyn FrameCallback>) -> Result<(), CaptureError> {
        let index = self
            .consumers
            .iter()
            .position(|c| same_consumer(c, consumer))
            .ok_or(CaptureError::CallbackNotRegistered)?;
        self.consumers.remove(index);
        Ok(())
    }

    pub fn contains(&self, consumer: &Arc<dyn FrameCallback>) -> bool {
        self.consumers.iter().any(|c| same_consumer(c, consumer))
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Handles to every consumer, for delivery outside the set's lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn FrameCallback>> {
        self.consumers.clone()
    }

    /// The best preferred format of all consumers, with zero fields
    /// filled from `defaults`.
    pub fn best_format(&self, defaults: VideoFormat) -> VideoFormat {
        best_format(self.consumers.iter().filter_map(|c| c.preferred_format()))
            .unwrap_or_default()
            .or_defaults(defaults)
    }
}

/// Hand `frame` to every consumer. Returns how many failed.
pub(crate) fn deliver_to_all(id: i32, consumers: &[Arc<dyn FrameCallback>], frame: &VideoFrame) -> usize {
    let mut failed = 0;
    for consumer in consumers {
        if let Err(err) = consumer.deliver_frame(id, frame) {
            tracing::warn!(id, %err, "consumer rejected frame");
            failed += 1;
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        preferred: Option<VideoFormat>,
        frames: Mutex<Vec<i64>>,
        fail: bool,
    }

    impl FrameCallback for Recorder {
        fn deliver_frame(&self, _id: i32, frame: &VideoFrame) -> Result<(), CaptureError> {
            self.frames.lock().push(frame.capture_time_ms);
            if self.fail {
                return Err(CaptureError::Consumer("full".into()));
            }
            Ok(())
        }

        fn preferred_format(&self) -> Option<VideoFormat> {
            self.preferred
        }
    }

    fn consumer(preferred: Option<VideoFormat>) -> Arc<dyn FrameCallback> {
        Arc::new(Recorder {
            preferred,
            ..Recorder::default()
        })
    }

    #[test]
    fn register_twice_fails() {
        let mut set = ConsumerSet::default();
        let c = consumer(None);
        set.register(c.clone()).unwrap();
        assert_eq!(set.register(c.clone()), Err(CaptureError::CallbackAlreadyRegistered));
        set.deregister(&c).unwrap();
        assert_eq!(set.deregister(&c), Err(CaptureError::CallbackNotRegistered));
        assert!(set.is_empty());
    }

    #[test]
    fn best_format_uses_defaults_for_missing_fields() {
        let defaults = VideoFormat::new(640, 480, 30);
        let mut set = ConsumerSet::default();
        assert_eq!(set.best_format(defaults), defaults);

        set.register(consumer(Some(VideoFormat::new(320, 240, 0)))).unwrap();
        assert_eq!(set.best_format(defaults), VideoFormat::new(320, 240, 30));

        set.register(consumer(Some(VideoFormat::new(1280, 720, 15)))).unwrap();
        set.register(consumer(None)).unwrap();
        assert_eq!(set.best_format(defaults), VideoFormat::new(1280, 720, 15));
    }

    #[test]
    fn failing_consumer_does_not_stop_fan_out() {
        let bad = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let good = Arc::new(Recorder::default());
        let consumers: Vec<Arc<dyn FrameCallback>> = vec![bad.clone(), good.clone()];
        let mut frame = VideoFrame::new(2, 2);
        frame.capture_time_ms = 7;
        assert_eq!(deliver_to_all(1, &consumers, &frame), 1);
        assert_eq!(*bad.frames.lock(), vec![7]);
        assert_eq!(*good.frames.lock(), vec![7]);
    }
}
