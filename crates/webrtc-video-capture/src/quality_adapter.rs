//! Resolution and frame-rate adaptation driven by CPU load.
//!
//! The adapter keeps a stack of reductions applied on top of the
//! negotiated capture format. Overuse pushes one reduction, normal usage
//! pops one.

use serde::{Deserialize, Serialize};

use crate::capability::VideoFormat;

/// What to give up first when the CPU cannot keep up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DegradationPreference {
    /// Keep the resolution and lower the frame rate.
    MaintainResolution,
    /// Keep the frame rate and lower the resolution.
    MaintainFramerate,
    #[default]
    Balanced,
}

pub trait DegradationPreferenceListener: Send + Sync {
    fn on_degradation_preference_updated(&self, preference: DegradationPreference);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptStep {
    Resolution,
    Framerate,
}

pub const MIN_WIDTH: u32 = 160;
pub const MIN_HEIGHT: u32 = 120;
pub const MIN_FPS: u32 = 5;

impl AdaptStep {
    fn can_apply(self, format: VideoFormat) -> bool {
        match self {
            Self::Resolution => format.width > MIN_WIDTH && format.height > MIN_HEIGHT,
            Self::Framerate => format.max_fps > MIN_FPS,
        }
    }

    fn apply(self, format: VideoFormat) -> VideoFormat {
        match self {
            Self::Resolution => VideoFormat {
                width: (format.width * 3 / 4 & !1).max(MIN_WIDTH),
                height: (format.height * 3 / 4 & !1).max(MIN_HEIGHT),
                ..format
            },
            Self::Framerate => VideoFormat {
                max_fps: (format.max_fps - format.max_fps / 3).max(MIN_FPS),
                ..format
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct QualityAdapter {
    preference: DegradationPreference,
    steps: Vec<AdaptStep>,
}

impl QualityAdapter {
    pub fn new(preference: DegradationPreference) -> Self {
        Self {
            preference,
            steps: Vec::new(),
        }
    }

    pub fn preference(&self) -> DegradationPreference {
        self.preference
    }

    /// Changing the preference drops every reduction made under the old one.
    pub fn set_preference(&mut self, preference: DegradationPreference) -> bool {
        if preference == self.preference {
            return false;
        }
        self.preference = preference;
        self.steps.clear();
        true
    }

    pub fn is_adapted(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn steps(&self) -> &[AdaptStep] {
        &self.steps
    }

    /// `base` with every current reduction applied.
    pub fn target(&self, base: VideoFormat) -> VideoFormat {
        self.steps.iter().fold(base, |f, step| step.apply(f))
    }

    /// Push one reduction. Returns the new target, or `None` when every
    /// permitted dimension is already at its floor.
    pub fn adapt_down(&mut self, base: VideoFormat) -> Option<VideoFormat> {
        let current = self.target(base);
        let step = self
            .candidates()
            .into_iter()
            .find(|step| step.can_apply(current))?;
        self.steps.push(step);
        let target = step.apply(current);
        tracing::debug!(?step, ?target, "adapting down");
        Some(target)
    }

    /// Pop one reduction. Returns the new target, or `None` when nothing
    /// was reduced.
    pub fn adapt_up(&mut self, base: VideoFormat) -> Option<VideoFormat> {
        let step = self.steps.pop()?;
        let target = self.target(base);
        tracing::debug!(?step, ?target, "adapting up");
        Some(target)
    }

    fn candidates(&self) -> Vec<AdaptStep> {
        match self.preference {
            DegradationPreference::MaintainResolution => vec![AdaptStep::Framerate],
            DegradationPreference::MaintainFramerate => vec![AdaptStep::Resolution],
            DegradationPreference::Balanced => match self.steps.last() {
                Some(AdaptStep::Resolution) => vec![AdaptStep::Framerate, AdaptStep::Resolution],
                _ => vec![AdaptStep::Resolution, AdaptStep::Framerate],
            },
        }
    }
}
