//! Tutoring decision (MCP) data model, mirroring the backend's wire
//! shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Warm,
    Encouraging,
    Neutral,
    Concise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    Slow,
    Medium,
    Fast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Down,
    Hold,
    Up,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Visual,
    Auditory,
    ReadingWriting,
    Kinesthetic,
    Mixed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    Explain,
    Example,
    Prompt,
    Quiz,
    Review,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Frustrated,
    Engaged,
    Bored,
    Calm,
}

/// Emotion read for one turn. `sentiment` is bounded to [-1, 1] by the
/// backend.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmotionSignals {
    pub label: EmotionLabel,
    pub sentiment: f64,
}

/// One tutoring decision. Five independent action fields plus the
/// emotion read that produced them. Unknown extra fields from the
/// backend (performance, learning_style, ...) are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mcp {
    pub tone: Tone,
    pub pacing: Pacing,
    pub difficulty: Difficulty,
    pub style: Style,
    pub next_step: NextStep,
    pub emotion: EmotionSignals,
}

/// Terminal payload of a turn: the tutor's reply text, the decision it
/// was generated under, and an optional reward score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TutorReply {
    pub text: String,
    pub mcp: Mcp,
    #[serde(default)]
    pub reward: Option<f64>,
}

macro_rules! display_snake_case {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s = match self {
                    $(<$ty>::$variant => $text),+
                };
                f.write_str(s)
            }
        }
    };
}

display_snake_case!(Tone {
    Warm => "warm",
    Encouraging => "encouraging",
    Neutral => "neutral",
    Concise => "concise",
});

display_snake_case!(Pacing {
    Slow => "slow",
    Medium => "medium",
    Fast => "fast",
});

display_snake_case!(Difficulty {
    Down => "down",
    Hold => "hold",
    Up => "up",
});

display_snake_case!(Style {
    Visual => "visual",
    Auditory => "auditory",
    ReadingWriting => "reading_writing",
    Kinesthetic => "kinesthetic",
    Mixed => "mixed",
});

display_snake_case!(NextStep {
    Explain => "explain",
    Example => "example",
    Prompt => "prompt",
    Quiz => "quiz",
    Review => "review",
});

display_snake_case!(EmotionLabel {
    Frustrated => "frustrated",
    Engaged => "engaged",
    Bored => "bored",
    Calm => "calm",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_backend_reply() {
        let json = r#"{
            "text": "Nice work, let's try a harder one.",
            "mcp": {
                "emotion": {"label": "engaged", "sentiment": 0.4},
                "performance": {"correct": true},
                "learning_style": {"visual": 0.0},
                "tone": "encouraging",
                "pacing": "fast",
                "difficulty": "up",
                "style": "mixed",
                "next_step": "quiz"
            },
            "reward": 0.75
        }"#;

        let reply: TutorReply = serde_json::from_str(json).expect("decode should succeed");
        assert_eq!(reply.mcp.tone, Tone::Encouraging);
        assert_eq!(reply.mcp.difficulty, Difficulty::Up);
        assert_eq!(reply.mcp.emotion.label, EmotionLabel::Engaged);
        assert_eq!(reply.reward, Some(0.75));
    }

    #[test]
    fn reward_is_optional() {
        let json = r#"{
            "text": "ok",
            "mcp": {
                "emotion": {"label": "calm", "sentiment": 0.0},
                "tone": "neutral",
                "pacing": "medium",
                "difficulty": "hold",
                "style": "mixed",
                "next_step": "explain"
            }
        }"#;

        let reply: TutorReply = serde_json::from_str(json).expect("decode should succeed");
        assert!(reply.reward.is_none());
    }

    #[test]
    fn display_matches_wire_spelling() {
        assert_eq!(Style::ReadingWriting.to_string(), "reading_writing");
        assert_eq!(NextStep::Quiz.to_string(), "quiz");
        assert_eq!(EmotionLabel::Frustrated.to_string(), "frustrated");
    }
}
