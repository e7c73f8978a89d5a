use thiserror::Error;

pub type Result<T> = std::result::Result<T, VoiceError>;

/// Failure taxonomy for a voice turn. Watchdog and silence terminations
/// are not errors and are reported as [`crate::session::StopReason`]
/// instead.
#[derive(Clone, Debug, Error)]
pub enum VoiceError {
    /// Microphone unavailable or access denied. Never retried.
    #[error("audio device error: {0}")]
    Device(String),

    /// Connection refused or dropped mid-flight. The session is torn
    /// down; no automatic reconnection is attempted.
    #[error("transport error: {0}")]
    Transport(String),

    /// A message that could not be handled. Framing noise (non-JSON
    /// payloads) is dropped silently and never reaches this variant.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An explicit `error` event from the server. Always surfaced.
    #[error("server error: {0}")]
    Server(String),
}
