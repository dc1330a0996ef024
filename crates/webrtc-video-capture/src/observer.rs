//! Capture observer and the per-capturer statistics that feed it.
//!
//! C++ source: `webrtc/video_engine/include/vie_capture.h`
//! (`ViECaptureObserver`)

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub use crate::image_processing::Brightness;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureAlarm {
    AlarmRaised,
    AlarmCleared,
}

/// High-level capture conditions. Called from the deliver thread.
pub trait CaptureObserver: Send + Sync {
    fn captured_frame_rate(&self, id: i32, fps: u32);
    fn no_picture_alarm(&self, id: i32, alarm: CaptureAlarm);
    fn brightness_alarm(&self, id: i32, brightness: Brightness);
}

/// Counts frames per second of capture time.
#[derive(Debug, Default)]
pub(crate) struct FrameRateTracker {
    window_start_ms: Option<i64>,
    frames: u32,
}

impl FrameRateTracker {
    /// Returns the rate when a full second of capture time has passed.
    pub(crate) fn on_frame(&mut self, capture_time_ms: i64) -> Option<u32> {
        let start = *self.window_start_ms.get_or_insert(capture_time_ms);
        let elapsed = capture_time_ms - start;
        if elapsed < 1000 {
            self.frames += 1;
            return None;
        }
        let fps = ((i64::from(self.frames) * 1000 + elapsed / 2) / elapsed) as u32;
        self.window_start_ms = Some(capture_time_ms);
        self.frames = 1;
        Some(fps)
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Raises an alarm when no frame arrives for a while.
#[derive(Debug)]
pub(crate) struct NoPictureMonitor {
    timeout: Duration,
    last_frame: Instant,
    raised: bool,
}

impl NoPictureMonitor {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_frame: Instant::now(),
            raised: false,
        }
    }

    /// A frame arrived. Returns `AlarmCleared` when an alarm was up.
    pub(crate) fn on_frame(&mut self, now: Instant) -> Option<CaptureAlarm> {
        self.last_frame = now;
        std::mem::take(&mut self.raised).then_some(CaptureAlarm::AlarmCleared)
    }

    /// Periodic check while capture runs.
    pub(crate) fn poll(&mut self, now: Instant) -> Option<CaptureAlarm> {
        if self.raised || now.duration_since(self.last_frame) < self.timeout {
            return None;
        }
        self.raised = true;
        Some(CaptureAlarm::AlarmRaised)
    }

    /// Capture (re)started; the silence period counts from here.
    pub(crate) fn restart(&mut self, now: Instant) {
        self.last_frame = now;
    }

    #[cfg(test)]
    pub(crate) fn is_raised(&self) -> bool {
        self.raised
    }
}
