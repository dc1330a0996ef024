//! Echo canceller errors.

/// Errors returned by [`EchoCanceller`](crate::EchoCanceller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AecError {
    #[error("unsupported processing rate {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("device sample rate {0} Hz outside [8000, 96000]")]
    BadDeviceSampleRate(u32),
    #[error("frame of {actual} samples, expected {expected}")]
    BadFrameLength { expected: usize, actual: usize },
    #[error("negative stream delay {0} ms")]
    BadDelay(i32),
    #[error("drift {0} samples exceeds one device frame")]
    BadDrift(i32),
    #[error("metrics are disabled")]
    MetricsDisabled,
    #[error("delay logging is disabled")]
    DelayLoggingDisabled,
}
