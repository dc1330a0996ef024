//! Frame enhancement: luma statistics, deflickering, temporal denoising
//! and brightness classification.
//!
//! One [`ImageProcessing`] instance belongs to a capturer. It is built
//! when the first enhancement is switched on and dropped when the last
//! one is switched off ([`ImageProcessingRef`]).
//!
//! C++ source: `webrtc/modules/video_processing/main/source/`
//! (`video_processing_impl.cc`, `brightness_detection.cc`,
//! `deflickering.cc`, `denoising.cc`)

use serde::{Deserialize, Serialize};

use crate::frame::VideoFrame;

/// Luma histogram over a subsampled grid of pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    pub hist: [u32; 256],
    pub mean: u32,
    pub sum: u64,
    pub num_pixels: u32,
    /// log2 of the column and row step used for sampling.
    pub sub_sampling_width: u32,
    pub sub_sampling_height: u32,
}

impl FrameStats {
    /// Sample every pixel up to VGA size, and fewer above it.
    pub fn compute(frame: &VideoFrame) -> Self {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        let sub_w = sub_sampling(w);
        let sub_h = sub_sampling(h);
        let mut hist = [0u32; 256];
        let mut sum = 0u64;
        let mut num_pixels = 0u32;
        for row in (0..h).step_by(1 << sub_h) {
            for col in (0..w).step_by(1 << sub_w) {
                let s = frame.luma(col, row);
                hist[usize::from(s)] += 1;
                sum += u64::from(s);
                num_pixels += 1;
            }
        }
        let mean = if num_pixels == 0 {
            0
        } else {
            (sum / u64::from(num_pixels)) as u32
        };
        Self {
            hist,
            mean,
            sum,
            num_pixels,
            sub_sampling_width: sub_w as u32,
            sub_sampling_height: sub_h as u32,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.num_pixels > 0
    }

    /// Smallest luma value with at least `fraction` of the samples at or
    /// below it.
    pub fn percentile(&self, fraction: f32) -> u8 {
        let target = (fraction * self.num_pixels as f32).ceil().max(1.0) as u32;
        let mut acc = 0;
        for (value, &count) in self.hist.iter().enumerate() {
            acc += count;
            if acc >= target {
                return value as u8;
            }
        }
        u8::MAX
    }

    fn std_dev(&self) -> f32 {
        if self.num_pixels == 0 {
            return 0.0;
        }
        let mean = self.sum as f32 / self.num_pixels as f32;
        let var = self
            .hist
            .iter()
            .enumerate()
            .map(|(v, &c)| c as f32 * (v as f32 - mean).powi(2))
            .sum::<f32>()
            / self.num_pixels as f32;
        var.sqrt()
    }

    fn fraction_below(&self, value: usize) -> f32 {
        self.hist[..value].iter().sum::<u32>() as f32 / self.num_pixels.max(1) as f32
    }

    fn fraction_above(&self, value: usize) -> f32 {
        self.hist[value + 1..].iter().sum::<u32>() as f32 / self.num_pixels.max(1) as f32
    }
}

fn sub_sampling(len: usize) -> usize {
    match len {
        0..=640 => 0,
        641..=1280 => 1,
        _ => 2,
    }
}

/// Result of brightness classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Brightness {
    #[default]
    Normal,
    Dark,
    Bright,
}

#[derive(Debug, Default)]
struct BrightnessDetector {
    dark_frames: u32,
    bright_frames: u32,
}

impl BrightnessDetector {
    fn classify(&mut self, stats: &FrameStats, alarm_frames: u32) -> Brightness {
        let (mut dark, mut bright) = (false, false);
        if stats.mean < 90 || stats.mean > 170 {
            let std_y = stats.std_dev();
            let perc05 = stats.percentile(0.05);
            let median = stats.percentile(0.5);
            let perc95 = stats.percentile(0.95);
            let prop_low = stats.fraction_below(20);
            let prop_high = stats.fraction_above(230);

            if std_y < 55.0 && perc05 < 50 {
                dark = median < 60 || stats.mean < 80 || perc95 < 130 || prop_low > 0.20;
            }
            if std_y < 52.0 && perc95 > 200 && median > 160 {
                bright = median > 185 || stats.mean > 185 || perc05 > 140 || prop_high > 0.25;
            }
        }
        self.dark_frames = if dark { self.dark_frames + 1 } else { 0 };
        self.bright_frames = if bright { self.bright_frames + 1 } else { 0 };

        if self.dark_frames >= alarm_frames {
            Brightness::Dark
        } else if self.bright_frames >= alarm_frames {
            Brightness::Bright
        } else {
            Brightness::Normal
        }
    }
}

/// Largest mean-luma ratio treated as flicker rather than a scene change.
const MAX_FLICKER_RATIO: f32 = 1.25;
const DEFLICKER_SMOOTHING: f32 = 0.1;

/// Pulls each frame's mean luma toward the running mean when the two are
/// close, which removes mains-frequency flicker from artificial light.
#[derive(Debug, Default)]
struct Deflickerer {
    running_mean: Option<f32>,
}

impl Deflickerer {
    /// Returns `false` when the stats are unusable.
    fn process(&mut self, frame: &mut VideoFrame, stats: &FrameStats) -> bool {
        if !stats.is_valid() {
            return false;
        }
        let mean = (stats.sum as f32 / stats.num_pixels as f32).max(1.0);
        let target = match self.running_mean {
            Some(running) => running,
            None => {
                self.running_mean = Some(mean);
                return true;
            }
        };
        let ratio = target / mean;
        if !(1.0 / MAX_FLICKER_RATIO..=MAX_FLICKER_RATIO).contains(&ratio) {
            // Scene change; follow it.
            self.running_mean = Some(mean);
            return true;
        }
        self.running_mean = Some(target + DEFLICKER_SMOOTHING * (mean - target));

        let mut lut = [0u8; 256];
        for (v, out) in lut.iter_mut().enumerate() {
            *out = (v as f32 * ratio).round().clamp(0.0, 255.0) as u8;
        }
        for row in frame.luma_rows_mut() {
            for s in row {
                *s = lut[usize::from(*s)];
            }
        }
        true
    }
}

/// Pixels differing from the previous output by less than this are
/// treated as static and averaged over time.
const DENOISE_THRESHOLD: u8 = 12;

/// Recursive temporal filter on luma.
#[derive(Debug, Default)]
struct Denoiser {
    previous: Vec<u8>,
    width: u32,
    height: u32,
}

impl Denoiser {
    /// Returns the number of pixels that were filtered.
    fn process(&mut self, frame: &mut VideoFrame) -> usize {
        let (w, h) = (frame.width(), frame.height());
        if self.width != w || self.height != h {
            self.width = w;
            self.height = h;
            self.previous = frame.luma_rows().flatten().copied().collect();
            return 0;
        }
        let mut filtered = 0;
        let mut prev = self.previous.iter_mut();
        for row in frame.luma_rows_mut() {
            for (s, p) in row.iter_mut().zip(prev.by_ref()) {
                if s.abs_diff(*p) < DENOISE_THRESHOLD {
                    *s = ((3 * u16::from(*p) + u16::from(*s) + 2) / 4) as u8;
                    filtered += 1;
                }
                *p = *s;
            }
        }
        filtered
    }
}

/// Per-capturer enhancement state.
#[derive(Debug, Default)]
pub struct ImageProcessing {
    brightness: BrightnessDetector,
    deflicker: Deflickerer,
    denoise: Denoiser,
}

impl ImageProcessing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_stats(&self, frame: &VideoFrame) -> FrameStats {
        FrameStats::compute(frame)
    }

    pub fn deflickering(&mut self, frame: &mut VideoFrame, stats: &FrameStats) -> bool {
        self.deflicker.process(frame, stats)
    }

    pub fn denoising(&mut self, frame: &mut VideoFrame) -> usize {
        self.denoise.process(frame)
    }

    /// Classify `stats`; a classification other than `Normal` needs
    /// `alarm_frames` consecutive frames.
    pub fn brightness_detection(&mut self, stats: &FrameStats, alarm_frames: u32) -> Brightness {
        self.brightness.classify(stats, alarm_frames)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Enhancement that holds a reference on the image processing instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enhancement {
    Denoising,
    Deflickering,
    BrightnessAlarm,
}

/// Ref-counted ownership of the capturer's [`ImageProcessing`].
#[derive(Debug, Default)]
pub struct ImageProcessingRef {
    users: Vec<Enhancement>,
    module: Option<ImageProcessing>,
}

impl ImageProcessingRef {
    /// Switch `enhancement` on or off. Returns `false` when it already was
    /// in that state.
    pub fn set(&mut self, enhancement: Enhancement, enable: bool) -> bool {
        let present = self.users.contains(&enhancement);
        if present == enable {
            return false;
        }
        if enable {
            if self.users.is_empty() {
                tracing::debug!("creating image processing module");
                self.module = Some(ImageProcessing::new());
            }
            self.users.push(enhancement);
        } else {
            self.users.retain(|&e| e != enhancement);
            if self.users.is_empty() {
                tracing::debug!("releasing image processing module");
                self.module = None;
            }
        }
        true
    }

    pub fn is_enabled(&self, enhancement: Enhancement) -> bool {
        self.users.contains(&enhancement)
    }

    pub fn module_mut(&mut self) -> Option<&mut ImageProcessing> {
        self.module.as_mut()
    }

    pub fn has_module(&self) -> bool {
        self.module.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{RawVideoType, VideoRotation, convert_to_i420};

    fn flat(w: u32, h: u32, luma: u8) -> VideoFrame {
        let size = RawVideoType::I420.buffer_size(w, h).unwrap();
        let mut data = vec![128u8; size];
        data[..(w * h) as usize].fill(luma);
        convert_to_i420(&data, w, h, RawVideoType::I420, VideoRotation::Deg0).unwrap()
    }

    #[test]
    fn stats_of_flat_frame() {
        let stats = FrameStats::compute(&flat(64, 48, 100));
        assert_eq!(stats.num_pixels, 64 * 48);
        assert_eq!(stats.mean, 100);
        assert_eq!(stats.hist[100], 64 * 48);
        assert_eq!(stats.percentile(0.5), 100);
    }

    #[test]
    fn large_frames_are_subsampled() {
        let stats = FrameStats::compute(&VideoFrame::new(1280, 720));
        assert_eq!(stats.sub_sampling_width, 1);
        assert_eq!(stats.sub_sampling_height, 1);
        assert_eq!(stats.num_pixels, 640 * 360);
    }

    #[test]
    fn dark_needs_consecutive_frames() {
        let mut ip = ImageProcessing::new();
        let dark = FrameStats::compute(&flat(32, 32, 10));
        assert_eq!(ip.brightness_detection(&dark, 3), Brightness::Normal);
        assert_eq!(ip.brightness_detection(&dark, 3), Brightness::Normal);
        assert_eq!(ip.brightness_detection(&dark, 3), Brightness::Dark);
        let normal = FrameStats::compute(&flat(32, 32, 128));
        assert_eq!(ip.brightness_detection(&normal, 3), Brightness::Normal);
    }

    #[test]
    fn bright_frames_are_flagged() {
        let mut ip = ImageProcessing::new();
        let bright = FrameStats::compute(&flat(32, 32, 240));
        assert_eq!(ip.brightness_detection(&bright, 1), Brightness::Bright);
    }

    #[test]
    fn deflicker_pulls_toward_running_mean() {
        let mut ip = ImageProcessing::new();
        let first = flat(16, 16, 100);
        let stats = ip.frame_stats(&first);
        let mut first = first;
        assert!(ip.deflickering(&mut first, &stats));
        assert_eq!(first.luma(0, 0), 100);

        let mut flicker = flat(16, 16, 110);
        let stats = ip.frame_stats(&flicker);
        ip.deflickering(&mut flicker, &stats);
        assert_eq!(flicker.luma(3, 3), 100);
    }

    #[test]
    fn deflicker_follows_scene_change() {
        let mut ip = ImageProcessing::new();
        for luma in [100, 200] {
            let mut frame = flat(16, 16, luma);
            let stats = ip.frame_stats(&frame);
            ip.deflickering(&mut frame, &stats);
            assert_eq!(frame.luma(0, 0), luma);
        }
    }

    #[test]
    fn denoise_smooths_small_changes_only() {
        let mut ip = ImageProcessing::new();
        let mut frame = flat(8, 8, 100);
        assert_eq!(ip.denoising(&mut frame), 0);

        let mut noisy = flat(8, 8, 108);
        assert_eq!(ip.denoising(&mut noisy), 64);
        assert_eq!(noisy.luma(0, 0), 102);

        let mut moved = flat(8, 8, 200);
        assert_eq!(ip.denoising(&mut moved), 0);
        assert_eq!(moved.luma(0, 0), 200);
    }

    #[test]
    fn module_lives_while_any_enhancement_is_on() {
        let mut r = ImageProcessingRef::default();
        assert!(!r.has_module());
        assert!(r.set(Enhancement::Denoising, true));
        assert!(!r.set(Enhancement::Denoising, true));
        assert!(r.set(Enhancement::BrightnessAlarm, true));
        assert!(r.set(Enhancement::Denoising, false));
        assert!(r.has_module());
        assert!(r.set(Enhancement::BrightnessAlarm, false));
        assert!(!r.has_module());
        assert!(!r.set(Enhancement::Deflickering, false));
    }
}
