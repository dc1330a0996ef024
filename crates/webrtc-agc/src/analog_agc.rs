//! Speech level tracking and microphone level suggestions.
//!
//! Each frame's energy is compared against a minimum-tracking noise floor;
//! frames clearly above it update a smoothed speech level. Every
//! [`UPDATE_INTERVAL_FRAMES`] the level is compared against the target and
//! the microphone level is stepped toward it. Clipping lowers the level
//! at once.
//!
//! C++ source: `webrtc/modules/audio_processing/agc/legacy/analog_agc.c`

/// Absolute sample value counted as clipping.
const SATURATION_THRESHOLD: i16 = 32_000;
/// Clipped samples in one frame that flag saturation.
const SATURATION_SAMPLES: usize = 2;
/// Frames between level decisions.
pub const UPDATE_INTERVAL_FRAMES: usize = 10;
/// No change while the speech level is this close to the target.
const DEADBAND_DB: f32 = 2.0;
/// Largest level error acted on in one step.
const MAX_STEP_DB: f32 = 12.0;
/// Level error that moves the microphone across its whole range.
const FULL_RANGE_DB: f32 = 48.0;
/// Margin over the noise floor for a frame to count as speech.
const SPEECH_MARGIN_DB: f32 = 6.0;
const MIN_SPEECH_DBFS: f32 = -70.0;
/// Noise floor rise per frame.
const NOISE_RISE_DB: f32 = 0.05;
const SILENCE_DBFS: f32 = -100.0;
const SPEECH_SMOOTHING: f32 = 0.2;

/// Mean power of `samples` in dBFS, floored at -100.
pub fn frame_level_dbfs<'a>(bands: impl IntoIterator<Item = &'a [i16]>) -> f32 {
    let mut energy = 0.0f64;
    let mut count = 0usize;
    for band in bands {
        energy += band.iter().map(|&s| f64::from(s) * f64::from(s)).sum::<f64>();
        count += band.len();
    }
    if count == 0 || energy == 0.0 {
        return SILENCE_DBFS;
    }
    let mean = energy / count as f64 / (32768.0 * 32768.0);
    (10.0 * mean.log10()).max(f64::from(SILENCE_DBFS)) as f32
}

#[derive(Debug, Clone)]
pub struct AnalogAgc {
    noise_floor_dbfs: f32,
    speech_level_dbfs: Option<f32>,
    speech_frames: usize,
    frames_since_update: usize,
    saturated: bool,
}

impl Default for AnalogAgc {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalogAgc {
    pub fn new() -> Self {
        Self {
            noise_floor_dbfs: SILENCE_DBFS,
            speech_level_dbfs: None,
            speech_frames: 0,
            frames_since_update: 0,
            saturated: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Forget the speech level, e.g. after the level was changed
    /// externally.
    pub fn restart_level_tracking(&mut self) {
        self.speech_level_dbfs = None;
        self.speech_frames = 0;
        self.frames_since_update = 0;
    }

    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    pub fn speech_level_dbfs(&self) -> Option<f32> {
        self.speech_level_dbfs
    }

    /// Measure one frame before any processing.
    pub fn analyze(&mut self, low: &[i16], high: Option<&[i16]>) {
        let clipped = low
            .iter()
            .chain(high.unwrap_or_default())
            .filter(|s| s.saturating_abs() >= SATURATION_THRESHOLD)
            .count();
        self.saturated = clipped >= SATURATION_SAMPLES;

        let level = frame_level_dbfs(std::iter::once(low).chain(high));
        if level < self.noise_floor_dbfs {
            self.noise_floor_dbfs = level;
        } else {
            self.noise_floor_dbfs += NOISE_RISE_DB;
        }

        if level > self.noise_floor_dbfs + SPEECH_MARGIN_DB && level > MIN_SPEECH_DBFS {
            self.speech_level_dbfs = Some(match self.speech_level_dbfs {
                Some(speech) => speech + SPEECH_SMOOTHING * (level - speech),
                None => level,
            });
            self.speech_frames += 1;
        }
    }

    /// Suggest a new level in `[min, max]` given the `current` one.
    ///
    /// Increases are held back while the near end carries echo.
    pub fn update_level(
        &mut self,
        current: u16,
        min: u16,
        max: u16,
        target_dbfs: f32,
        stream_has_echo: bool,
    ) -> u16 {
        let range = f32::from(max.saturating_sub(min));
        if self.saturated {
            let step = (range / 16.0).ceil().max(1.0) as u16;
            let lowered = current.saturating_sub(step).max(min);
            tracing::debug!(current, lowered, "saturation; lowering level");
            self.restart_level_tracking();
            return lowered;
        }

        self.frames_since_update += 1;
        if self.frames_since_update < UPDATE_INTERVAL_FRAMES {
            return current.clamp(min, max);
        }
        let (Some(speech), true) = (self.speech_level_dbfs, self.speech_frames > 0) else {
            return current.clamp(min, max);
        };
        self.frames_since_update = 0;

        let error_db = target_dbfs - speech;
        if error_db.abs() <= DEADBAND_DB || (error_db > 0.0 && stream_has_echo) {
            self.speech_frames = 0;
            return current.clamp(min, max);
        }
        let step = (range * error_db.abs().min(MAX_STEP_DB) / FULL_RANGE_DB)
            .ceil()
            .max(1.0) as u16;
        let suggested = if error_db > 0.0 {
            current.saturating_add(step)
        } else {
            current.saturating_sub(step)
        }
        .clamp(min, max);
        if suggested != current {
            tracing::trace!(current, suggested, speech, target_dbfs, "analog level step");
            self.restart_level_tracking();
        }
        suggested
    }
}
