//! Audio processing errors.
//!
//! C++ source: `webrtc/modules/audio_processing/include/audio_processing.h`
//! (`AudioProcessing::Error`)

use webrtc_aec::AecError;
use webrtc_aecm::AecmError;
use webrtc_agc::AgcError;
use webrtc_ns::NsError;
use webrtc_vad::VadError;

/// Errors returned by [`AudioProcessing`](crate::AudioProcessing) and its
/// component handles.
///
/// [`BadStreamParameterWarning`](Self::BadStreamParameterWarning) is not a
/// failure: the call completed, but a stream parameter had to be clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unspecified error")]
    Unspecified,
    #[error("component creation failed")]
    Creation,
    #[error("component not supported in this build")]
    UnsupportedComponent,
    #[error("function not supported")]
    UnsupportedFunction,
    #[error("missing buffer")]
    NullPointer,
    #[error("bad parameter")]
    BadParameter,
    #[error("bad sample rate")]
    BadSampleRate,
    #[error("bad data length")]
    BadDataLength,
    #[error("bad number of channels")]
    BadNumberChannels,
    #[error("file error")]
    File,
    #[error("stream parameter not set")]
    StreamParameterNotSet,
    #[error("component not enabled")]
    NotEnabled,
    #[error("stream parameter out of range and clamped")]
    BadStreamParameterWarning,
}

impl Error {
    /// `true` for outcomes where the call still did its work.
    pub fn is_warning(self) -> bool {
        matches!(self, Self::BadStreamParameterWarning)
    }

    /// The legacy integer code: negative for errors, positive for warnings.
    pub fn code(self) -> i32 {
        match self {
            Self::Unspecified => -1,
            Self::Creation => -2,
            Self::UnsupportedComponent => -3,
            Self::UnsupportedFunction => -4,
            Self::NullPointer => -5,
            Self::BadParameter => -6,
            Self::BadSampleRate => -7,
            Self::BadDataLength => -8,
            Self::BadNumberChannels => -9,
            Self::File => -10,
            Self::StreamParameterNotSet => -11,
            Self::NotEnabled => -12,
            Self::BadStreamParameterWarning => 50,
        }
    }
}

impl From<AecError> for Error {
    fn from(err: AecError) -> Self {
        match err {
            AecError::UnsupportedSampleRate(_) => Self::BadSampleRate,
            AecError::BadFrameLength { .. } => Self::BadDataLength,
            AecError::BadDeviceSampleRate(_) | AecError::BadDelay(_) | AecError::BadDrift(_) => {
                Self::BadParameter
            }
            AecError::MetricsDisabled | AecError::DelayLoggingDisabled => Self::NotEnabled,
        }
    }
}

impl From<AecmError> for Error {
    fn from(err: AecmError) -> Self {
        match err {
            AecmError::UnsupportedSampleRate(_) => Self::BadSampleRate,
            AecmError::BadFrameLength { .. } => Self::BadDataLength,
            AecmError::BadDelay(_) | AecmError::BadEchoPathSize { .. } => Self::BadParameter,
        }
    }
}

impl From<AgcError> for Error {
    fn from(err: AgcError) -> Self {
        match err {
            AgcError::UnsupportedSampleRate(_) => Self::BadSampleRate,
            AgcError::BadFrameLength { .. } => Self::BadDataLength,
            AgcError::InvalidTargetLevel(_)
            | AgcError::InvalidCompressionGain(_)
            | AgcError::InvalidAnalogLimits { .. }
            | AgcError::AnalogLevelOutOfRange { .. } => Self::BadParameter,
        }
    }
}

impl From<NsError> for Error {
    fn from(err: NsError) -> Self {
        match err {
            NsError::UnsupportedSampleRate(_) => Self::BadSampleRate,
            NsError::BadFrameLength { .. } => Self::BadDataLength,
        }
    }
}

impl From<VadError> for Error {
    fn from(err: VadError) -> Self {
        match err {
            VadError::InvalidMode(_) => Self::BadParameter,
            VadError::InvalidRateOrFrameLength { .. } => Self::BadDataLength,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_clamp_is_a_warning() {
        assert!(Error::BadStreamParameterWarning.is_warning());
        assert!(Error::BadStreamParameterWarning.code() > 0);
        for err in [
            Error::BadParameter,
            Error::StreamParameterNotSet,
            Error::NotEnabled,
            Error::BadSampleRate,
        ] {
            assert!(!err.is_warning());
            assert!(err.code() < 0);
        }
    }

    #[test]
    fn component_errors_map_to_taxonomy() {
        assert_eq!(Error::from(AecError::MetricsDisabled), Error::NotEnabled);
        assert_eq!(
            Error::from(AecmError::UnsupportedSampleRate(32000)),
            Error::BadSampleRate
        );
        assert_eq!(
            Error::from(AgcError::AnalogLevelOutOfRange {
                level: 300,
                min: 0,
                max: 255
            }),
            Error::BadParameter
        );
    }
}
