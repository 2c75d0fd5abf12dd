//! Prompt injection screening for plain text messages.
//!
//! A [`PromptGuard`] labels a message `SAFE` or `INJECTION`. Flagged
//! messages are not forwarded as-is; the model is told to refuse instead.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use once_cell::sync::Lazy;

/// Classification of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardLabel {
    Safe,
    Injection,
}

impl GuardLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardLabel::Safe => "SAFE",
            GuardLabel::Injection => "INJECTION",
        }
    }

    pub fn is_unsafe(&self) -> bool {
        matches!(self, GuardLabel::Injection)
    }
}

/// Classifies message text.
pub trait PromptGuard: Send + Sync {
    fn classify(&self, text: &str) -> GuardLabel;
}

const INJECTION_PHRASES: &[&str] = &[
    "ignore previous instructions",
    "ignore all previous instructions",
    "ignore the above",
    "ignore your instructions",
    "disregard previous instructions",
    "disregard all prior",
    "forget your instructions",
    "forget all previous",
    "you are now",
    "new instructions:",
    "system prompt",
    "reveal your instructions",
    "print your instructions",
    "developer mode",
    "jailbreak",
    "act as dan",
];

static INJECTION_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(INJECTION_PHRASES)
        .unwrap()
});

/// Phrase matcher over well-known injection openers.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternGuard;

impl PatternGuard {
    pub fn new() -> Self {
        Self
    }
}

impl PromptGuard for PatternGuard {
    fn classify(&self, text: &str) -> GuardLabel {
        if INJECTION_MATCHER.is_match(text) {
            GuardLabel::Injection
        } else {
            GuardLabel::Safe
        }
    }
}
