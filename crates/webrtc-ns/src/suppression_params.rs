//! Level-dependent suppression parameters.
//!
//! C++ source: `webrtc/modules/audio_processing/ns/ns_core.c` (`WebRtcNs_set_policy_core`)

use crate::config::SuppressionLevel;

/// Parameters that control the noise suppression behavior at a given level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuppressionParams {
    /// Over-subtraction factor for noise estimate (higher = more aggressive).
    pub over_subtraction_factor: f32,
    /// Minimum gain applied to attenuated bins (sets the floor).
    pub minimum_attenuating_gain: f32,
    /// Whether to use adaptive attenuation adjustment.
    pub use_attenuation_adjustment: bool,
}

const PARAMS_6DB: SuppressionParams = SuppressionParams {
    over_subtraction_factor: 1.0,
    minimum_attenuating_gain: 0.5,
    use_attenuation_adjustment: false,
};
const PARAMS_12DB: SuppressionParams = SuppressionParams {
    over_subtraction_factor: 1.0,
    minimum_attenuating_gain: 0.25,
    use_attenuation_adjustment: true,
};
const PARAMS_18DB: SuppressionParams = SuppressionParams {
    over_subtraction_factor: 1.1,
    minimum_attenuating_gain: 0.125,
    use_attenuation_adjustment: true,
};
const PARAMS_21DB: SuppressionParams = SuppressionParams {
    over_subtraction_factor: 1.25,
    minimum_attenuating_gain: 0.09,
    use_attenuation_adjustment: true,
};

impl SuppressionParams {
    /// Static parameter set for `level`.
    pub fn for_level(level: SuppressionLevel) -> &'static Self {
        match level {
            SuppressionLevel::K6dB => &PARAMS_6DB,
            SuppressionLevel::K12dB => &PARAMS_12DB,
            SuppressionLevel::K18dB => &PARAMS_18DB,
            SuppressionLevel::K21dB => &PARAMS_21DB,
        }
    }

    /// Floor of the attenuation in dB (negative).
    pub fn attenuation_floor_db(&self) -> f32 {
        20.0 * self.minimum_attenuating_gain.log10()
    }
}
