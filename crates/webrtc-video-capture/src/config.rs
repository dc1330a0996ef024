//! Capturer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::VideoFormat;

/// Format used for every field no consumer asked for.
pub const DEFAULT_CAPTURE_FORMAT: VideoFormat = VideoFormat::new(640, 480, 30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapturerConfig {
    pub default_format: VideoFormat,
    /// How long a backend delivering an encoded frame waits for the
    /// previous one to be delivered before dropping.
    pub encoded_frame_wait_ms: u64,
    /// How long starting and stopping wait for a worker thread.
    pub thread_timeout_ms: u64,
    /// Wake-up period of idle worker threads.
    pub thread_poll_ms: u64,
    /// Silence while started before the no-picture alarm is raised.
    pub no_picture_alarm_ms: u64,
    pub overuse: OveruseConfig,
    pub brightness: BrightnessConfig,
}

impl Default for CapturerConfig {
    fn default() -> Self {
        Self {
            default_format: DEFAULT_CAPTURE_FORMAT,
            encoded_frame_wait_ms: 500,
            thread_timeout_ms: 10_000,
            thread_poll_ms: 100,
            no_picture_alarm_ms: 2_000,
            overuse: OveruseConfig::default(),
            brightness: BrightnessConfig::default(),
        }
    }
}

impl CapturerConfig {
    pub fn encoded_frame_wait(&self) -> Duration {
        Duration::from_millis(self.encoded_frame_wait_ms)
    }

    pub fn thread_timeout(&self) -> Duration {
        Duration::from_millis(self.thread_timeout_ms)
    }

    pub fn thread_poll(&self) -> Duration {
        Duration::from_millis(self.thread_poll_ms.max(1))
    }

    pub fn no_picture_alarm(&self) -> Duration {
        Duration::from_millis(self.no_picture_alarm_ms)
    }
}

/// Thresholds on the smoothed per-frame deliver time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OveruseConfig {
    pub high_load_ms: f64,
    pub low_load_ms: f64,
    /// Weight of the newest sample in the smoothed time.
    pub smoothing: f64,
    /// Consecutive frames above `high_load_ms` before overuse is reported.
    pub overuse_frames: u32,
    /// Consecutive frames below `low_load_ms` before normal use is reported.
    pub normal_frames: u32,
}

impl Default for OveruseConfig {
    fn default() -> Self {
        Self {
            high_load_ms: 25.0,
            low_load_ms: 12.0,
            smoothing: 0.1,
            overuse_frames: 15,
            normal_frames: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrightnessConfig {
    /// Consecutive dark or bright frames before the classification flips.
    pub alarm_frames: u32,
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self { alarm_frames: 30 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CapturerConfig::default();
        assert_eq!(config.default_format, VideoFormat::new(640, 480, 30));
        assert_eq!(config.encoded_frame_wait(), Duration::from_millis(500));
        assert_eq!(config.thread_timeout(), Duration::from_secs(10));
        assert_eq!(config.no_picture_alarm(), Duration::from_secs(2));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: CapturerConfig =
            serde_json::from_str(r#"{"encoded_frame_wait_ms": 50, "overuse": {"high_load_ms": 5.0}}"#)
                .unwrap();
        assert_eq!(config.encoded_frame_wait_ms, 50);
        assert_eq!(config.overuse.high_load_ms, 5.0);
        assert_eq!(config.overuse.normal_frames, 90);
        assert_eq!(config.default_format, DEFAULT_CAPTURE_FORMAT);
    }
}
