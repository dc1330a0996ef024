//! Capture capabilities and format negotiation.
//!
//! C++ source: `webrtc/modules/video_capture/include/video_capture_defines.h`,
//! `webrtc/video_engine/vie_frame_provider_base.cc` (`GetBestFormat`)

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;
use crate::frame::{RawVideoType, VideoCodecType};

/// Resolution and frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub max_fps: u32,
}

impl VideoFormat {
    pub const fn new(width: u32, height: u32, max_fps: u32) -> Self {
        Self {
            width,
            height,
            max_fps,
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Every field non-zero.
    pub fn is_complete(&self) -> bool {
        self.width != 0 && self.height != 0 && self.max_fps != 0
    }

    /// Zero fields replaced from `defaults`.
    pub fn or_defaults(self, defaults: VideoFormat) -> Self {
        let pick = |v: u32, d: u32| if v == 0 { d } else { v };
        Self {
            width: pick(self.width, defaults.width),
            height: pick(self.height, defaults.height),
            max_fps: pick(self.max_fps, defaults.max_fps),
        }
    }

    /// Larger area wins; equal areas go to the higher frame rate.
    pub fn is_better_than(&self, other: &VideoFormat) -> bool {
        (self.area(), self.max_fps) > (other.area(), other.max_fps)
    }
}

/// What a capture backend is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureCapability {
    pub width: u32,
    pub height: u32,
    pub max_fps: u32,
    pub raw_type: RawVideoType,
    /// Set when the backend encodes on its own.
    pub codec_type: Option<VideoCodecType>,
    pub interlaced: bool,
}

impl CaptureCapability {
    pub fn new(format: VideoFormat) -> Self {
        Self {
            width: format.width,
            height: format.height,
            max_fps: format.max_fps,
            ..Self::default()
        }
    }

    pub fn format(&self) -> VideoFormat {
        VideoFormat::new(self.width, self.height, self.max_fps)
    }

    /// A caller-fixed capability has every dimension set.
    pub fn is_fixed(&self) -> bool {
        self.format().is_complete()
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if !self.is_fixed() {
            return Err(CaptureError::InvalidCapability {
                width: self.width,
                height: self.height,
                max_fps: self.max_fps,
            });
        }
        Ok(())
    }
}

/// Settings of an encoder that takes encoded frames straight from the
/// capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoCodec {
    pub codec_type: VideoCodecType,
    pub payload_type: u8,
    pub width: u32,
    pub height: u32,
    pub max_fps: u32,
    pub start_bitrate_kbps: u32,
}

impl VideoCodec {
    /// The capability a backend encoding for this codec runs at.
    pub fn capability(&self) -> CaptureCapability {
        CaptureCapability {
            width: self.width,
            height: self.height,
            max_fps: self.max_fps,
            raw_type: RawVideoType::I420,
            codec_type: Some(self.codec_type),
            interlaced: false,
        }
    }
}

/// The best of `preferences`, or `None` when there are none.
pub fn best_format(preferences: impl IntoIterator<Item = VideoFormat>) -> Option<VideoFormat> {
    preferences
        .into_iter()
        .fold(None, |best: Option<VideoFormat>, f| match best {
            Some(b) if !f.is_better_than(&b) => Some(b),
            _ => Some(f),
        })
}
