/// Errors returned by the gain controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AgcError {
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("frame length {actual} does not match {expected}")]
    BadFrameLength { expected: usize, actual: usize },
    #[error("target level {0} dBFS outside 0..=31")]
    InvalidTargetLevel(i32),
    #[error("compression gain {0} dB outside 0..=90")]
    InvalidCompressionGain(i32),
    #[error("invalid analog level limits [{min}, {max}]")]
    InvalidAnalogLimits { min: i32, max: i32 },
    #[error("analog level {level} outside [{min}, {max}]")]
    AnalogLevelOutOfRange { level: i32, min: u16, max: u16 },
}
