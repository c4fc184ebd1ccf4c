/// Typed errors for the preprocessing pipeline.
///
/// Every failure is surfaced synchronously to the caller; nothing is
/// retried or logged away internally. There is no partial-success mode:
/// a call that returns one of these leaves no usable output behind.
#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    #[error("empty input: source buffer reports zero samples")]
    EmptyInput,
    #[error("source buffer has no mono PCM data")]
    MissingMonoPcm,
    #[error("invalid channel count: {0} (expected 1 or 2)")]
    InvalidChannelCount(usize),
    #[error("frame length {0} is not a positive multiple of 160")]
    MisalignedFrame(usize),
    #[error("channel buffer length mismatch: expected {expected}, got {actual}")]
    ChannelLengthMismatch { expected: usize, actual: usize },
    #[error("failed to allocate space for {0} samples")]
    Allocation(usize),
    #[error("denoiser session creation failed")]
    SessionCreate,
    #[error("processing failed: {0}")]
    Processing(String),
}
