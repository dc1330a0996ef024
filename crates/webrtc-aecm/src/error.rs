//! Mobile echo control errors.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AecmError {
    /// Only 8 kHz and 16 kHz are supported.
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("frame of {actual} samples, expected {expected}")]
    BadFrameLength { expected: usize, actual: usize },
    #[error("negative stream delay {0} ms")]
    BadDelay(i32),
    #[error("echo path of {actual} bytes, expected {expected}")]
    BadEchoPathSize { expected: usize, actual: usize },
}
