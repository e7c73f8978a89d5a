//! Filters noisy incremental transcripts before they reach the UI.

use regex::Regex;
use std::sync::LazyLock;

/// Partials longer than this keep only their tail, which is more likely
/// to reflect the latest utterance.
pub const MAX_PARTIAL_CHARS: usize = 220;

/// A partial that merely extends the last accepted one by fewer than
/// this many characters is flicker, not new content.
pub const MIN_EXTENSION_CHARS: usize = 8;

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Runs of 3+ repeated "thank you" are a known transcription artifact
/// on near-silent audio.
static FILLER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bthank you\b[.!?,;:]?\s*){3,}").expect("filler pattern is valid")
});

/// Normalize a raw partial: collapse whitespace runs, collapse repeated
/// filler phrases, keep at most the trailing [`MAX_PARTIAL_CHARS`]
/// characters.
pub fn sanitize_partial(raw: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(raw, " ");
    let collapsed = FILLER_RE.replace_all(&collapsed, "Thank you. ");

    let char_count = collapsed.chars().count();
    if char_count <= MAX_PARTIAL_CHARS {
        return collapsed.into_owned();
    }

    collapsed
        .chars()
        .skip(char_count - MAX_PARTIAL_CHARS)
        .collect()
}

/// Deduplicates sanitized partials against the last one that was
/// surfaced. Rejected partials are dropped silently.
#[derive(Clone, Debug, Default)]
pub struct PartialReconciler {
    last_accepted: String,
}

impl PartialReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_accepted(&self) -> &str {
        &self.last_accepted
    }

    /// Sanitize `raw` and decide whether to surface it. Returns the
    /// text to display on acceptance.
    pub fn push(&mut self, raw: &str) -> Option<String> {
        let text = sanitize_partial(raw);
        if text.is_empty() {
            return None;
        }

        if !self.last_accepted.is_empty() {
            if text == self.last_accepted {
                return None;
            }
            if text.starts_with(&self.last_accepted) {
                let extension = text.chars().count() - self.last_accepted.chars().count();
                if extension < MIN_EXTENSION_CHARS {
                    return None;
                }
            }
        }

        self.last_accepted = text.clone();
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(sanitize_partial("the\t cat \n sat"), "the cat sat");
    }

    #[test]
    fn repeated_filler_collapses() {
        let raw = "Thank you. Thank you! thank you, Thank you.";
        assert_eq!(sanitize_partial(raw), "Thank you. ");
    }

    #[test]
    fn two_fillers_are_left_alone() {
        let raw = "thank you. thank you.";
        assert_eq!(sanitize_partial(raw), "thank you. thank you.");
    }

    #[test]
    fn long_partials_keep_the_tail() {
        let raw = "a".repeat(200) + &"b".repeat(100);
        let out = sanitize_partial(&raw);
        assert_eq!(out.chars().count(), MAX_PARTIAL_CHARS);
        assert!(out.ends_with(&"b".repeat(100)));
    }

    #[test]
    fn first_partial_is_accepted() {
        let mut r = PartialReconciler::new();
        assert_eq!(r.push("hi"), Some("hi".to_string()));
    }

    #[test]
    fn empty_partials_are_rejected() {
        let mut r = PartialReconciler::new();
        assert_eq!(r.push("   "), None);
        assert_eq!(r.push(""), None);
    }

    #[test]
    fn exact_duplicate_is_rejected() {
        let mut r = PartialReconciler::new();
        assert!(r.push("the cat sat").is_some());
        assert_eq!(r.push("the cat sat"), None);
    }

    #[test]
    fn short_extension_is_rejected() {
        let mut r = PartialReconciler::new();
        assert!(r.push("the cat sat").is_some());
        assert_eq!(r.push("the cat sat o"), None);
        assert_eq!(r.last_accepted(), "the cat sat");
    }

    #[test]
    fn long_extension_is_accepted() {
        let mut r = PartialReconciler::new();
        assert!(r.push("the cat sat").is_some());
        assert_eq!(r.push("the cat sat on the mat"), Some("the cat sat on the mat".to_string()));
    }

    #[test]
    fn revision_that_is_not_an_extension_is_accepted() {
        let mut r = PartialReconciler::new();
        assert!(r.push("the cat sat").is_some());
        // Not a prefix extension, so the 8-char rule does not apply.
        assert_eq!(r.push("the cat sang"), Some("the cat sang".to_string()));
    }
}
