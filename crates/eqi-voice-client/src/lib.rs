mod error;

pub mod audio;
pub mod config;
pub mod diff;
pub mod mcp;
pub mod protocol;
pub mod reconcile;
pub mod session;
pub mod vad;
pub mod ws;

#[cfg(feature = "api")]
pub mod api;

#[cfg(feature = "api")]
pub use api::TutorApi;
pub use config::{SessionConfig, VadConfig};
pub use error::{Result, VoiceError};
pub use mcp::{Mcp, TutorReply};
pub use session::{DuplexTranscriptSession, SessionState, StopReason, VoiceEvent};
