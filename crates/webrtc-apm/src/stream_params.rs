//! Per-frame stream parameters.
//!
//! The caller reports these before each capture frame. They count as set
//! until the frame has been processed; a component that needs one fails
//! the frame with [`Error::StreamParameterNotSet`] if it is missing.
//!
//! C++ source: `webrtc/modules/audio_processing/audio_processing_impl.cc`
//! (`set_stream_delay_ms`, `was_stream_delay_set_`)

use crate::error::Error;

/// Largest accepted render-to-capture delay.
pub const MAX_STREAM_DELAY_MS: i32 = 500;

/// Which parameters the enabled components need for the coming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Requirements {
    pub(crate) delay: bool,
    pub(crate) drift: bool,
    pub(crate) analog_level: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StreamParams {
    delay_ms: i32,
    delay_set: bool,
    delay_clamped: bool,
    drift_samples: i32,
    drift_set: bool,
    analog_level_set: bool,
}

impl StreamParams {
    /// Record the delay for the coming frame, with `offset_ms` added.
    ///
    /// A negative report is rejected. A total above
    /// [`MAX_STREAM_DELAY_MS`] (or below zero through the offset) is
    /// clamped, counts as set, and returns the warning.
    pub(crate) fn set_delay_ms(&mut self, delay_ms: i32, offset_ms: i32) -> Result<(), Error> {
        if delay_ms < 0 {
            return Err(Error::BadParameter);
        }
        let total = delay_ms.saturating_add(offset_ms);
        let clamped = total.clamp(0, MAX_STREAM_DELAY_MS);
        self.delay_ms = clamped;
        self.delay_set = true;
        self.delay_clamped = clamped != total;
        if self.delay_clamped {
            tracing::warn!(delay_ms, offset_ms, clamped, "stream delay out of range");
            return Err(Error::BadStreamParameterWarning);
        }
        Ok(())
    }

    /// The delay last set, offset and clamp included.
    pub(crate) fn delay_ms(&self) -> i32 {
        self.delay_ms
    }

    /// Whether the delay for this frame had to be clamped.
    pub(crate) fn delay_clamped(&self) -> bool {
        self.delay_set && self.delay_clamped
    }

    pub(crate) fn set_drift_samples(&mut self, drift: i32) {
        self.drift_samples = drift;
        self.drift_set = true;
    }

    pub(crate) fn drift_samples(&self) -> i32 {
        self.drift_samples
    }

    pub(crate) fn set_analog_level_valid(&mut self, valid: bool) {
        self.analog_level_set = valid;
    }

    /// Fail with [`Error::StreamParameterNotSet`] if a required parameter
    /// is missing.
    pub(crate) fn check(&self, required: Requirements) -> Result<(), Error> {
        let missing = (required.delay && !self.delay_set)
            || (required.drift && !self.drift_set)
            || (required.analog_level && !self.analog_level_set);
        if missing {
            tracing::debug!(?required, params = ?self, "stream parameter not set");
            return Err(Error::StreamParameterNotSet);
        }
        Ok(())
    }

    /// Forget what was set for the frame just processed. The last values
    /// stay readable.
    pub(crate) fn clear(&mut self) {
        self.delay_set = false;
        self.delay_clamped = false;
        self.drift_set = false;
        self.analog_level_set = false;
    }
}
