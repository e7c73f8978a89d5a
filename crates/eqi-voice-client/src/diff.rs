//! Minimal human-readable deltas between consecutive tutoring
//! decisions.

use crate::mcp::Mcp;
use std::fmt::Display;

/// Sentiment changes smaller than this are not worth surfacing.
pub const SENTIMENT_DELTA_MIN: f64 = 0.15;

/// Compare the previous displayed decision with the current one and
/// return ordered change descriptions. The first decision of a
/// conversation has no delta to show. Pure and deterministic.
pub fn diff_mcp(previous: Option<&Mcp>, current: &Mcp) -> Vec<String> {
    let Some(prev) = previous else {
        return Vec::new();
    };

    let mut changes = Vec::new();
    push_change(&mut changes, "tone", &prev.tone, &current.tone);
    push_change(&mut changes, "pacing", &prev.pacing, &current.pacing);
    push_change(&mut changes, "difficulty", &prev.difficulty, &current.difficulty);
    push_change(&mut changes, "style", &prev.style, &current.style);
    push_change(&mut changes, "next_step", &prev.next_step, &current.next_step);
    push_change(&mut changes, "emotion", &prev.emotion.label, &current.emotion.label);

    let delta = (current.emotion.sentiment - prev.emotion.sentiment).abs();
    if delta >= SENTIMENT_DELTA_MIN {
        changes.push(format!(
            "sentiment: {:.2} → {:.2}",
            prev.emotion.sentiment, current.emotion.sentiment
        ));
    }

    changes
}

fn push_change<T: PartialEq + Display>(out: &mut Vec<String>, field: &str, old: &T, new: &T) {
    if old != new {
        out.push(format!("{field}: {old} → {new}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::{
        Difficulty, EmotionLabel, EmotionSignals, NextStep, Pacing, Style, Tone,
    };

    fn baseline() -> Mcp {
        Mcp {
            tone: Tone::Neutral,
            pacing: Pacing::Medium,
            difficulty: Difficulty::Hold,
            style: Style::Mixed,
            next_step: NextStep::Explain,
            emotion: EmotionSignals { label: EmotionLabel::Calm, sentiment: 0.1 },
        }
    }

    #[test]
    fn first_decision_has_no_delta() {
        assert!(diff_mcp(None, &baseline()).is_empty());
    }

    #[test]
    fn identical_decisions_produce_nothing() {
        let prev = baseline();
        assert!(diff_mcp(Some(&prev), &baseline()).is_empty());
    }

    #[test]
    fn difficulty_and_sentiment_change_in_order() {
        let prev = baseline();
        let mut curr = baseline();
        curr.difficulty = Difficulty::Down;
        curr.emotion.sentiment = 0.30;

        let changes = diff_mcp(Some(&prev), &curr);
        assert_eq!(
            changes,
            vec![
                "difficulty: hold → down".to_string(),
                "sentiment: 0.10 → 0.30".to_string(),
            ]
        );
    }

    #[test]
    fn small_sentiment_drift_is_suppressed() {
        let prev = baseline();
        let mut curr = baseline();
        curr.emotion.sentiment = 0.2;

        assert!(diff_mcp(Some(&prev), &curr).is_empty());
    }

    #[test]
    fn ordering_is_declaration_order_then_emotion() {
        let prev = baseline();
        let mut curr = baseline();
        curr.tone = Tone::Warm;
        curr.next_step = NextStep::Example;
        curr.emotion.label = EmotionLabel::Frustrated;
        curr.emotion.sentiment = -0.4;

        let changes = diff_mcp(Some(&prev), &curr);
        assert_eq!(
            changes,
            vec![
                "tone: neutral → warm".to_string(),
                "next_step: explain → example".to_string(),
                "emotion: calm → frustrated".to_string(),
                "sentiment: 0.10 → -0.40".to_string(),
            ]
        );
    }

    #[test]
    fn inputs_are_not_mutated() {
        let prev = baseline();
        let curr = baseline();
        let _ = diff_mcp(Some(&prev), &curr);
        assert_eq!(prev, baseline());
        assert_eq!(curr, baseline());
    }
}
