/// Failure taxonomy for the conversation engine.
///
/// Decode failures are absorbed per payload; every other variant forces the
/// state machine back to idle with all hardware released.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Microphone access was refused or the input device is unusable.
    /// Fatal to the current attempt, never retried silently.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// The live session reported an error or closed unexpectedly.
    #[error("session transport error: {0}")]
    Transport(String),

    /// One inbound audio payload was malformed. The payload is dropped and
    /// the conversation stays live.
    #[error("audio decode failed: {0}")]
    Decode(#[from] lingua_live_utils::audio::AudioError),

    /// The session could not be opened at all.
    #[error("session setup failed: {0}")]
    Config(String),
}
