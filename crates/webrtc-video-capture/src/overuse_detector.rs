//! CPU overuse detection from per-frame deliver times.
//!
//! C++ source: `webrtc/video_engine/overuse_frame_detector.cc`

use std::sync::Arc;

use derive_more::Debug;

use crate::config::OveruseConfig;

/// Receives load transitions detected on the deliver thread.
pub trait CpuOveruseObserver: Send + Sync {
    /// Load has stayed high; the consumer should lower its demands.
    fn overuse_detected(&self);
    /// Load has stayed low after an overuse report.
    fn normal_usage(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Normal,
    Overuse,
}

#[derive(Debug)]
pub struct OveruseDetector {
    config: OveruseConfig,
    smoothed_ms: Option<f64>,
    high_frames: u32,
    low_frames: u32,
    state: LoadState,
    #[debug(skip)]
    observer: Option<Arc<dyn CpuOveruseObserver>>,
}

impl OveruseDetector {
    pub fn new(config: OveruseConfig) -> Self {
        Self {
            config,
            smoothed_ms: None,
            high_frames: 0,
            low_frames: 0,
            state: LoadState::Normal,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn CpuOveruseObserver>>) {
        self.observer = observer;
    }

    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn smoothed_ms(&self) -> Option<f64> {
        self.smoothed_ms
    }

    /// Feed the time one frame took to reach every consumer. Returns the
    /// new state when it changed.
    pub fn frame_processed(&mut self, deliver_ms: f64) -> Option<LoadState> {
        let smoothed = match self.smoothed_ms {
            Some(prev) => prev + self.config.smoothing * (deliver_ms - prev),
            None => deliver_ms,
        };
        self.smoothed_ms = Some(smoothed);

        if smoothed > self.config.high_load_ms {
            self.high_frames += 1;
            self.low_frames = 0;
        } else if smoothed < self.config.low_load_ms {
            self.low_frames += 1;
            self.high_frames = 0;
        } else {
            self.high_frames = 0;
            self.low_frames = 0;
        }

        let next = match self.state {
            LoadState::Normal if self.high_frames >= self.config.overuse_frames => LoadState::Overuse,
            LoadState::Overuse if self.low_frames >= self.config.normal_frames => LoadState::Normal,
            unchanged => unchanged,
        };
        if next == self.state {
            return None;
        }
        self.state = next;
        self.high_frames = 0;
        self.low_frames = 0;
        tracing::info!(state = ?next, smoothed_ms = smoothed, "cpu load changed");
        if let Some(observer) = &self.observer {
            match next {
                LoadState::Overuse => observer.overuse_detected(),
                LoadState::Normal => observer.normal_usage(),
            }
        }
        Some(next)
    }

    pub fn reset(&mut self) {
        self.smoothed_ms = None;
        self.high_frames = 0;
        self.low_frames = 0;
        self.state = LoadState::Normal;
    }
}
