//! Wire protocol for the `/ws/voice` duplex connection.
//!
//! Client→server traffic is raw binary audio, except one terminal JSON
//! control message. Server→client traffic is JSON text frames tagged by
//! `type`.

use crate::error::{Result, VoiceError};
use crate::mcp::TutorReply;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ClientMsg {
    Stop,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Capture may begin.
    Ready,

    /// Incremental transcript fragment; not guaranteed to be a prefix
    /// of the next partial.
    Partial { text: String },

    /// Terminal success for the session attempt.
    Final { transcript: String, reply: TutorReply },

    /// Terminal failure for the session attempt.
    Error { message: String },
}

impl ServerEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerEvent::Final { .. } | ServerEvent::Error { .. })
    }
}

pub fn encode_client_msg(msg: &ClientMsg) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| VoiceError::Protocol(e.to_string()))
}

/// Decode one server frame. Non-JSON payloads and unrecognized shapes
/// are framing noise: the caller drops them and the session continues.
pub fn decode_server_event(text: &str) -> Option<ServerEvent> {
    serde_json::from_str(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::{Difficulty, EmotionLabel};

    #[test]
    fn stop_message_wire_shape() {
        let encoded = encode_client_msg(&ClientMsg::Stop).expect("encode should succeed");
        assert_eq!(encoded, r#"{"event":"stop"}"#);
    }

    #[test]
    fn decodes_ready_and_partial() {
        assert_eq!(decode_server_event(r#"{"type":"ready"}"#), Some(ServerEvent::Ready));
        assert_eq!(
            decode_server_event(r#"{"type":"partial","text":"the cat"}"#),
            Some(ServerEvent::Partial { text: "the cat".to_string() })
        );
    }

    #[test]
    fn decodes_final_with_reply() {
        let json = r#"{
            "type": "final",
            "transcript": "5+3=8",
            "reply": {
                "text": "Correct!",
                "mcp": {
                    "emotion": {"label": "engaged", "sentiment": 0.5},
                    "tone": "encouraging",
                    "pacing": "fast",
                    "difficulty": "up",
                    "style": "mixed",
                    "next_step": "quiz"
                }
            }
        }"#;

        match decode_server_event(json) {
            Some(ServerEvent::Final { transcript, reply }) => {
                assert_eq!(transcript, "5+3=8");
                assert_eq!(reply.mcp.difficulty, Difficulty::Up);
                assert_eq!(reply.mcp.emotion.label, EmotionLabel::Engaged);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn framing_noise_is_dropped() {
        assert_eq!(decode_server_event("not json"), None);
        assert_eq!(decode_server_event(r#"{"type":"heartbeat"}"#), None);
        assert_eq!(decode_server_event(""), None);
    }

    #[test]
    fn error_event_decodes() {
        assert_eq!(
            decode_server_event(r#"{"type":"error","message":"asr backend unavailable"}"#),
            Some(ServerEvent::Error { message: "asr backend unavailable".to_string() })
        );
    }

    #[test]
    fn terminal_classification() {
        assert!(!ServerEvent::Ready.is_terminal());
        assert!(ServerEvent::Error { message: String::new() }.is_terminal());
    }
}
