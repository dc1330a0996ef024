//! Captured frames and pixel-format conversion.
//!
//! Raw frames move through the capturer as planar I420: a full-resolution
//! luma plane followed by two chroma planes at half resolution in both
//! directions, each with its own stride. Backends hand in other layouts;
//! [`convert_to_i420`] brings them to I420 and applies the capture
//! rotation on the way.
//!
//! C++ source: `webrtc/common_video/libyuv/webrtc_libyuv.cc`,
//! `webrtc/common_video/interface/i420_video_frame.h`

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

/// Pixel layout of a frame handed in by a capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RawVideoType {
    #[default]
    I420,
    /// I420 with the V plane before the U plane.
    Yv12,
    /// Packed 4:2:2, `Y0 U Y1 V`.
    Yuy2,
    /// Packed 4:2:2, `U Y0 V Y1`.
    Uyvy,
    /// Packed 24-bit, bytes stored `B G R`.
    Rgb24,
    Argb,
    Mjpeg,
}

impl RawVideoType {
    /// Bytes a `width` x `height` frame of this type occupies, or `None`
    /// for compressed layouts.
    pub fn buffer_size(self, width: u32, height: u32) -> Option<usize> {
        let (w, h) = (width as usize, height as usize);
        let half = |n: usize| n.div_ceil(2);
        match self {
            Self::I420 | Self::Yv12 => Some(w * h + 2 * half(w) * half(h)),
            Self::Yuy2 | Self::Uyvy => Some(2 * half(w) * 2 * h),
            Self::Rgb24 => Some(3 * w * h),
            Self::Argb => Some(4 * w * h),
            Self::Mjpeg => None,
        }
    }
}

/// Clockwise rotation applied to captured frames before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl VideoRotation {
    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Codec of an encoded frame or an encoder binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodecType {
    Vp8,
    H264,
}

/// Planar I420 frame with capture metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    stride_y: usize,
    stride_u: usize,
    stride_v: usize,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    /// Monotonic capture time.
    pub capture_time_ms: i64,
    /// Capture time plus the capture delay.
    pub render_time_ms: i64,
    pub rotation: VideoRotation,
}

impl VideoFrame {
    /// A black frame with tight strides.
    pub fn new(width: u32, height: u32) -> Self {
        let (w, h) = (width as usize, height as usize);
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);
        Self {
            width,
            height,
            stride_y: w,
            stride_u: cw,
            stride_v: cw,
            y: vec![16; w * h],
            u: vec![128; cw * ch],
            v: vec![128; cw * ch],
            capture_time_ms: 0,
            render_time_ms: 0,
            rotation: VideoRotation::Deg0,
        }
    }

    /// Wrap planes with caller-supplied strides.
    pub fn from_planes(
        width: u32,
        height: u32,
        (y, stride_y): (Vec<u8>, usize),
        (u, stride_u): (Vec<u8>, usize),
        (v, stride_v): (Vec<u8>, usize),
    ) -> Result<Self, CaptureError> {
        let (w, h) = (width as usize, height as usize);
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidFrame(format!("empty frame {width}x{height}")));
        }
        let plane_ok = |data: &[u8], stride: usize, pw: usize, ph: usize| {
            stride >= pw && data.len() >= stride * (ph - 1) + pw
        };
        if !plane_ok(&y, stride_y, w, h) || !plane_ok(&u, stride_u, cw, ch) || !plane_ok(&v, stride_v, cw, ch) {
            return Err(CaptureError::InvalidFrame(format!(
                "planes too small for {width}x{height}"
            )));
        }
        Ok(Self {
            width,
            height,
            stride_y,
            stride_u,
            stride_v,
            y,
            u,
            v,
            capture_time_ms: 0,
            render_time_ms: 0,
            rotation: VideoRotation::Deg0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn chroma_width(&self) -> usize {
        (self.width as usize).div_ceil(2)
    }

    pub fn chroma_height(&self) -> usize {
        (self.height as usize).div_ceil(2)
    }

    pub fn stride_y(&self) -> usize {
        self.stride_y
    }

    pub fn y(&self) -> &[u8] {
        &self.y
    }

    pub fn u(&self) -> &[u8] {
        &self.u
    }

    pub fn v(&self) -> &[u8] {
        &self.v
    }

    pub fn y_mut(&mut self) -> &mut [u8] {
        &mut self.y
    }

    /// Luma sample at (`x`, `y`).
    pub fn luma(&self, x: usize, y: usize) -> u8 {
        self.y[y * self.stride_y + x]
    }

    /// Rows of the luma plane, stride padding removed.
    pub fn luma_rows(&self) -> impl Iterator<Item = &[u8]> {
        let w = self.width as usize;
        self.y.chunks(self.stride_y).map(move |row| &row[..w]).take(self.height as usize)
    }

    /// Rows of the luma plane, stride padding removed.
    pub fn luma_rows_mut(&mut self) -> impl Iterator<Item = &mut [u8]> {
        let w = self.width as usize;
        let h = self.height as usize;
        self.y.chunks_mut(self.stride_y).map(move |row| &mut row[..w]).take(h)
    }

    /// Tightly packed I420 bytes.
    pub fn to_i420_bytes(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let (cw, ch) = (self.chroma_width(), self.chroma_height());
        let mut out = Vec::with_capacity(w * h + 2 * cw * ch);
        for row in 0..h {
            out.extend_from_slice(&self.y[row * self.stride_y..row * self.stride_y + w]);
        }
        for row in 0..ch {
            out.extend_from_slice(&self.u[row * self.stride_u..row * self.stride_u + cw]);
        }
        for row in 0..ch {
            out.extend_from_slice(&self.v[row * self.stride_v..row * self.stride_v + cw]);
        }
        out
    }

    /// The frame turned clockwise by `rotation`.
    pub fn rotated(&self, rotation: VideoRotation) -> Self {
        if rotation == VideoRotation::Deg0 {
            return self.clone();
        }
        let (w, h) = (self.width as usize, self.height as usize);
        let (cw, ch) = (self.chroma_width(), self.chroma_height());
        let (out_w, out_h) = if rotation.swaps_dimensions() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };
        let mut out = Self::new(out_w, out_h);
        rotate_plane(&self.y, self.stride_y, w, h, &mut out.y, out.stride_y, rotation);
        rotate_plane(&self.u, self.stride_u, cw, ch, &mut out.u, out.stride_u, rotation);
        rotate_plane(&self.v, self.stride_v, cw, ch, &mut out.v, out.stride_v, rotation);
        out.capture_time_ms = self.capture_time_ms;
        out.render_time_ms = self.render_time_ms;
        out.rotation = rotation;
        out
    }
}

fn rotate_plane(
    src: &[u8],
    src_stride: usize,
    w: usize,
    h: usize,
    dst: &mut [u8],
    dst_stride: usize,
    rotation: VideoRotation,
) {
    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match rotation {
                VideoRotation::Deg0 => (x, y),
                VideoRotation::Deg90 => (h - 1 - y, x),
                VideoRotation::Deg180 => (w - 1 - x, h - 1 - y),
                VideoRotation::Deg270 => (y, w - 1 - x),
            };
            dst[dy * dst_stride + dx] = src[y * src_stride + x];
        }
    }
}

/// Codec payload produced by an encoding capture backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub payload: Vec<u8>,
    pub codec: VideoCodecType,
    pub payload_type: u8,
    pub width: u32,
    pub height: u32,
    /// RTP timestamp on the 90 kHz clock.
    pub timestamp: u32,
    pub capture_time_ms: i64,
    pub render_time_ms: i64,
    pub key_frame: bool,
}

impl EncodedImage {
    /// Stamp the image with `render_time_ms` on the 90 kHz clock.
    pub fn set_render_time_ms(&mut self, render_time_ms: i64) {
        self.render_time_ms = render_time_ms;
        self.timestamp = render_time_ms.wrapping_mul(90) as u32;
    }
}

/// Convert a backend buffer to I420 and turn it by `rotation`.
///
/// I420, YV12, YUY2, UYVY and RGB24 are accepted; the buffer must hold at
/// least one full frame.
pub fn convert_to_i420(
    data: &[u8],
    width: u32,
    height: u32,
    raw_type: RawVideoType,
    rotation: VideoRotation,
) -> Result<VideoFrame, CaptureError> {
    if width == 0 || height == 0 {
        return Err(CaptureError::InvalidFrame(format!("empty frame {width}x{height}")));
    }
    let expected = match raw_type {
        RawVideoType::Argb | RawVideoType::Mjpeg => {
            return Err(CaptureError::InvalidFrame(format!(
                "cannot convert {raw_type:?} to I420"
            )));
        }
        other => other.buffer_size(width, height).unwrap_or(usize::MAX),
    };
    if data.len() < expected {
        return Err(CaptureError::InvalidFrame(format!(
            "{} bytes for {width}x{height} {raw_type:?}, expected {expected}",
            data.len()
        )));
    }

    let mut frame = VideoFrame::new(width, height);
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (frame.chroma_width(), frame.chroma_height());
    match raw_type {
        RawVideoType::I420 | RawVideoType::Yv12 => {
            let (luma, chroma) = data.split_at(w * h);
            let (first, rest) = chroma.split_at(cw * ch);
            let second = &rest[..cw * ch];
            frame.y.copy_from_slice(luma);
            let (u, v) = if raw_type == RawVideoType::I420 {
                (first, second)
            } else {
                (second, first)
            };
            frame.u.copy_from_slice(u);
            frame.v.copy_from_slice(v);
        }
        RawVideoType::Yuy2 | RawVideoType::Uyvy => {
            let (yo, uo, vo) = if raw_type == RawVideoType::Yuy2 {
                (0, 1, 3)
            } else {
                (1, 0, 2)
            };
            let row_bytes = 4 * cw;
            for row in 0..h {
                let src = &data[row * row_bytes..(row + 1) * row_bytes];
                for x in 0..w {
                    frame.y[row * w + x] = src[2 * x + yo];
                }
            }
            // Average vertically adjacent rows of 4:2:2 chroma.
            for crow in 0..ch {
                let r0 = 2 * crow;
                let r1 = (r0 + 1).min(h - 1);
                for cx in 0..cw {
                    let at = |row: usize, off: usize| u16::from(data[row * row_bytes + 4 * cx + off]);
                    frame.u[crow * cw + cx] = (at(r0, uo) + at(r1, uo)).div_ceil(2) as u8;
                    frame.v[crow * cw + cx] = (at(r0, vo) + at(r1, vo)).div_ceil(2) as u8;
                }
            }
        }
        RawVideoType::Rgb24 => {
            let px = |x: usize, y: usize| {
                let i = 3 * (y * w + x);
                (i32::from(data[i + 2]), i32::from(data[i + 1]), i32::from(data[i]))
            };
            for y in 0..h {
                for x in 0..w {
                    let (r, g, b) = px(x, y);
                    frame.y[y * w + x] = (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16) as u8;
                }
            }
            for cy in 0..ch {
                for cx in 0..cw {
                    let xs = [2 * cx, (2 * cx + 1).min(w - 1)];
                    let ys = [2 * cy, (2 * cy + 1).min(h - 1)];
                    let (mut r, mut g, mut b) = (0, 0, 0);
                    for &y in &ys {
                        for &x in &xs {
                            let (pr, pg, pb) = px(x, y);
                            r += pr;
                            g += pg;
                            b += pb;
                        }
                    }
                    let (r, g, b) = ((r + 2) / 4, (g + 2) / 4, (b + 2) / 4);
                    frame.u[cy * cw + cx] = (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128) as u8;
                    frame.v[cy * cw + cx] = (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128) as u8;
                }
            }
        }
        RawVideoType::Argb | RawVideoType::Mjpeg => unreachable!("rejected above"),
    }
    Ok(frame.rotated(rotation))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_i420(w: u32, h: u32) -> Vec<u8> {
        let size = RawVideoType::I420.buffer_size(w, h).unwrap();
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn buffer_sizes() {
        assert_eq!(RawVideoType::I420.buffer_size(640, 480), Some(460_800));
        assert_eq!(RawVideoType::I420.buffer_size(3, 3), Some(9 + 2 * 4));
        assert_eq!(RawVideoType::Yuy2.buffer_size(640, 480), Some(614_400));
        assert_eq!(RawVideoType::Rgb24.buffer_size(2, 2), Some(12));
        assert_eq!(RawVideoType::Mjpeg.buffer_size(640, 480), None);
    }

    #[test]
    fn i420_passes_through() {
        let data = gradient_i420(8, 6);
        let frame = convert_to_i420(&data, 8, 6, RawVideoType::I420, VideoRotation::Deg0).unwrap();
        assert_eq!(frame.to_i420_bytes(), data);
    }

    #[test]
    fn yv12_swaps_chroma() {
        let mut data = vec![50u8; 16];
        data.extend([1u8; 4]);
        data.extend([2u8; 4]);
        let frame = convert_to_i420(&data, 4, 4, RawVideoType::Yv12, VideoRotation::Deg0).unwrap();
        assert!(frame.u().iter().all(|&s| s == 2));
        assert!(frame.v().iter().all(|&s| s == 1));
    }

    #[test]
    fn packed_422_layouts() {
        // Two pixels per four bytes, same colour on both rows.
        let yuy2: Vec<u8> = [10, 100, 20, 200].repeat(4);
        let frame = convert_to_i420(&yuy2, 4, 2, RawVideoType::Yuy2, VideoRotation::Deg0).unwrap();
        assert_eq!(frame.y(), &[10, 20, 10, 20, 10, 20, 10, 20]);
        assert_eq!(frame.u(), &[100, 100]);
        assert_eq!(frame.v(), &[200, 200]);

        let uyvy: Vec<u8> = [100, 10, 200, 20].repeat(4);
        let frame = convert_to_i420(&uyvy, 4, 2, RawVideoType::Uyvy, VideoRotation::Deg0).unwrap();
        assert_eq!(frame.y(), &[10, 20, 10, 20, 10, 20, 10, 20]);
        assert_eq!(frame.u(), &[100, 100]);
    }

    #[test]
    fn rgb24_grey_and_white() {
        let white = vec![255u8; 3 * 4];
        let frame = convert_to_i420(&white, 2, 2, RawVideoType::Rgb24, VideoRotation::Deg0).unwrap();
        assert!(frame.y().iter().all(|&s| s == 235));
        assert_eq!(frame.u(), &[128]);
        assert_eq!(frame.v(), &[128]);

        let black = vec![0u8; 3 * 4];
        let frame = convert_to_i420(&black, 2, 2, RawVideoType::Rgb24, VideoRotation::Deg0).unwrap();
        assert!(frame.y().iter().all(|&s| s == 16));
    }

    #[test]
    fn rgb24_is_stored_bgr() {
        // Pure blue: B = 255 in the first byte.
        let blue = [255u8, 0, 0].repeat(4);
        let frame = convert_to_i420(&blue, 2, 2, RawVideoType::Rgb24, VideoRotation::Deg0).unwrap();
        assert!(frame.u()[0] > 200);
        assert!(frame.v()[0] < 128);
    }

    #[test]
    fn unsupported_and_short_buffers_are_rejected() {
        let data = vec![0u8; 4 * 16];
        assert!(matches!(
            convert_to_i420(&data, 4, 4, RawVideoType::Argb, VideoRotation::Deg0),
            Err(CaptureError::InvalidFrame(_))
        ));
        assert!(matches!(
            convert_to_i420(&data, 4, 4, RawVideoType::Mjpeg, VideoRotation::Deg0),
            Err(CaptureError::InvalidFrame(_))
        ));
        assert!(matches!(
            convert_to_i420(&data[..10], 4, 4, RawVideoType::I420, VideoRotation::Deg0),
            Err(CaptureError::InvalidFrame(_))
        ));
        assert!(matches!(
            convert_to_i420(&data, 0, 4, RawVideoType::I420, VideoRotation::Deg0),
            Err(CaptureError::InvalidFrame(_))
        ));
    }

    #[test]
    fn rotation_moves_pixels() {
        // 4x2 luma:
        //   0 1 2 3
        //   4 5 6 7
        let mut data: Vec<u8> = (0..8).collect();
        data.extend([128u8; 4]);
        let frame = convert_to_i420(&data, 4, 2, RawVideoType::I420, VideoRotation::Deg90).unwrap();
        assert_eq!((frame.width(), frame.height()), (2, 4));
        // Clockwise: the left column read bottom-up becomes the top row.
        assert_eq!(frame.y(), &[4, 0, 5, 1, 6, 2, 7, 3]);

        let frame = convert_to_i420(&data, 4, 2, RawVideoType::I420, VideoRotation::Deg180).unwrap();
        assert_eq!(frame.y(), &[7, 6, 5, 4, 3, 2, 1, 0]);

        let frame = convert_to_i420(&data, 4, 2, RawVideoType::I420, VideoRotation::Deg270).unwrap();
        assert_eq!(frame.y(), &[3, 7, 2, 6, 1, 5, 0, 4]);
        assert_eq!(frame.rotation, VideoRotation::Deg270);
    }

    #[test]
    fn four_quarter_turns_are_identity() {
        let data = gradient_i420(6, 4);
        let frame = convert_to_i420(&data, 6, 4, RawVideoType::I420, VideoRotation::Deg0).unwrap();
        let turned = frame
            .rotated(VideoRotation::Deg90)
            .rotated(VideoRotation::Deg90)
            .rotated(VideoRotation::Deg90)
            .rotated(VideoRotation::Deg90);
        assert_eq!(turned.to_i420_bytes(), data);
    }

    #[test]
    fn strided_planes() {
        let frame = VideoFrame::from_planes(
            2,
            2,
            (vec![1, 2, 0, 3, 4, 0], 3),
            (vec![5], 1),
            (vec![6], 1),
        )
        .unwrap();
        assert_eq!(frame.to_i420_bytes(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(frame.luma(1, 1), 4);
        assert!(VideoFrame::from_planes(2, 2, (vec![1; 3], 2), (vec![5], 1), (vec![6], 1)).is_err());
    }

    #[test]
    fn encoded_timestamp_is_90khz() {
        let mut image = EncodedImage {
            payload: vec![1, 2, 3],
            codec: VideoCodecType::Vp8,
            payload_type: 100,
            width: 640,
            height: 480,
            timestamp: 0,
            capture_time_ms: 0,
            render_time_ms: 0,
            key_frame: true,
        };
        image.set_render_time_ms(1000);
        assert_eq!(image.timestamp, 90_000);
    }
}
