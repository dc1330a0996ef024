//! Submodule state tracking for the audio processing pipeline.
//!
//! Ported from `AudioProcessingImpl::SubmoduleStates` in
//! `modules/audio_processing/audio_processing_impl.h/cc`.
//!
//! Tracks which components are enabled and derives which shared stages
//! (band split, low-band reference copy) a frame needs.

/// Enable flags of every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct EnabledSubmodules {
    pub(crate) high_pass_filter: bool,
    pub(crate) gain_control: bool,
    pub(crate) echo_cancellation: bool,
    pub(crate) echo_control_mobile: bool,
    pub(crate) noise_suppression: bool,
    pub(crate) voice_detection: bool,
    pub(crate) level_estimator: bool,
}

#[derive(Debug)]
pub(crate) struct SubmoduleStates {
    enabled: EnabledSubmodules,
    first_update: bool,
}

impl SubmoduleStates {
    pub(crate) fn new() -> Self {
        Self {
            enabled: EnabledSubmodules::default(),
            first_update: true,
        }
    }

    /// Updates the submodule state and returns `true` if it has changed.
    pub(crate) fn update(&mut self, enabled: EnabledSubmodules) -> bool {
        let changed = enabled != self.enabled || self.first_update;
        self.enabled = enabled;
        self.first_update = false;
        changed
    }

    /// Whether any component works on the split bands of the capture
    /// signal. The level estimator reads the full band only.
    pub(crate) fn capture_multi_band_processing_active(&self) -> bool {
        let e = &self.enabled;
        e.high_pass_filter
            || e.gain_control
            || e.echo_cancellation
            || e.echo_control_mobile
            || e.noise_suppression
            || e.voice_detection
    }

    /// Whether the render signal feeds any component.
    pub(crate) fn render_multi_band_processing_active(&self) -> bool {
        self.enabled.echo_cancellation || self.enabled.echo_control_mobile
    }

    /// The mobile echo canceller wants the capture signal as it was
    /// before noise suppression.
    pub(crate) fn low_pass_reference_required(&self) -> bool {
        self.enabled.echo_control_mobile && self.enabled.noise_suppression
    }
}
