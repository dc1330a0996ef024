//! Capture errors.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("capture already started")]
    AlreadyStarted,
    #[error("capture not started")]
    NotStarted,
    #[error("invalid capability {width}x{height}@{max_fps}")]
    InvalidCapability { width: u32, height: u32, max_fps: u32 },
    #[error("capture backend has no encode interface")]
    UnsupportedEncodeInterface,
    #[error("frame callback already registered")]
    CallbackAlreadyRegistered,
    #[error("frame callback not registered")]
    CallbackNotRegistered,
    #[error("worker thread {0} did not acknowledge in time")]
    ThreadTimeout(&'static str),
    #[error("failed to spawn worker thread {0}")]
    ThreadSpawn(&'static str),
    #[error("effect filter already registered")]
    EffectFilterAlreadyRegistered,
    #[error("no effect filter registered")]
    EffectFilterNotRegistered,
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("no encoder bound")]
    EncoderNotBound,
    #[error("an encoder is already bound")]
    EncoderAlreadyBound,
    #[error("observer already registered")]
    ObserverAlreadyRegistered,
    #[error("no observer registered")]
    ObserverNotRegistered,
    #[error("capture backend failed: {0}")]
    Backend(String),
    #[error("consumer failed: {0}")]
    Consumer(String),
}
