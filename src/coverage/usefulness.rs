//! Usefulness heuristics for documentation text.
//!
//! The question being approximated: would this text help someone who has
//! never seen the system resolve an incident at 2AM? Without understanding
//! the text we look for signals that correlate with a yes.

use lazy_static::lazy_static;
use regex::Regex;

use crate::artifact::Artifact;

/// Scores the documentation attached to one artifact.
///
/// Implementations must return a value in [0, 1], return 0 when the artifact
/// carries no documentation text, and not decrease when concrete or
/// actionable content is added.
pub trait UsefulnessHeuristic: Send + Sync {
    fn score(&self, artifact: &Artifact) -> f64;
}

/// Minimum length for documentation to count as more than a label.
pub const SUBSTANTIVE_CHARS: usize = 40;

/// Weight of each signal; four signals saturate at 1.0.
const SIGNAL_WEIGHT: f64 = 0.25;

lazy_static! {
    static ref EXAMPLE: Regex = Regex::new(
        r#"(?i)(\be\.g\.|\bexample\b|\bsample\b|\bsuch as\b|\bdefaults? (?:to|is)\b|`[^`]+`|"[^"]+"|'[^']+'|=\s*\S|\b\d+(?:\.\d+)?\s*(?:ms|s|sec|seconds?|m|min|minutes?|h|hours?|mb|gb|%)?\b|https?://)"#
    )
    .unwrap();
    static ref ACTION: Regex = Regex::new(
        r"(?i)\b(restart|rotate|run|rerun|re-run|check|verify|set|increase|decrease|raise|lower|roll ?back|rollback|revert|restore|retry|contact|page|escalate|clear|flush|drain|scale|disable|enable|update|redeploy|delete|revoke|renew|replace|inspect|grant|request|bump|purge|failover|fail over)\b"
    )
    .unwrap();
}

/// Additive signal heuristic: text present, substantive length, a concrete
/// example or value, an actionable verb. Each adds 0.25.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalHeuristic;

/// Which signals a piece of documentation text shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals {
    pub has_text: bool,
    pub substantive: bool,
    pub has_example: bool,
    pub actionable: bool,
}

impl Signals {
    pub fn of(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Self::default();
        }
        Self {
            has_text: true,
            substantive: text.chars().count() >= SUBSTANTIVE_CHARS,
            has_example: EXAMPLE.is_match(text),
            actionable: ACTION.is_match(text),
        }
    }

    pub fn score(&self) -> f64 {
        [self.has_text, self.substantive, self.has_example, self.actionable]
            .iter()
            .filter(|s| **s)
            .count() as f64
            * SIGNAL_WEIGHT
    }
}

impl UsefulnessHeuristic for SignalHeuristic {
    fn score(&self, artifact: &Artifact) -> f64 {
        artifact
            .doc()
            .map(|doc| Signals::of(doc).score())
            .unwrap_or(0.0)
    }
}
