//! Pseudo-command response protocol.
//!
//! The model signals side effects by embedding markers in its reply text.
//! Markers are checked in a fixed order and the first match wins:
//!
//! 1. `GENERATE_IMAGE <prompt>` at the very start of the reply
//! 2. `WEBCONTENT_RESUME` anywhere
//! 3. `WEBCONTENT_OPINION` anywhere
//! 4. `NO_ANSWER` anywhere
//!
//! Matching is by substring, so ordinary text that contains `NO_ANSWER`
//! is treated as a no-answer.

use once_cell::sync::Lazy;
use regex::Regex;

pub const GENERATE_IMAGE: &str = "GENERATE_IMAGE";
pub const WEBCONTENT_RESUME: &str = "WEBCONTENT_RESUME";
pub const WEBCONTENT_OPINION: &str = "WEBCONTENT_OPINION";
pub const NO_ANSWER: &str = "NO_ANSWER";

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:[a-zA-Z]|[0-9]|[$-_@.&+]|[!*(),]|%[0-9a-fA-F][0-9a-fA-F])+").unwrap()
});

static THINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

/// What the model asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Generate an image from the prompt
    GenerateImage(String),
    /// Summarize the page linked in the reply
    WebResume,
    /// Give an opinion on the page linked in the reply
    WebOpinion,
    NoAnswer,
    Plain,
}

impl Directive {
    /// Classify a model reply.
    ///
    /// # Example
    /// ```
    /// use chatrelay::agent::Directive;
    ///
    /// assert_eq!(
    ///     Directive::classify("GENERATE_IMAGE a red bicycle"),
    ///     Directive::GenerateImage("a red bicycle".into())
    /// );
    /// assert_eq!(Directive::classify("hello there"), Directive::Plain);
    /// ```
    pub fn classify(reply: &str) -> Self {
        if let Some(rest) = reply.strip_prefix(GENERATE_IMAGE) {
            // The marker is followed by one separator character.
            return Directive::GenerateImage(rest.chars().skip(1).collect());
        }
        if reply.contains(WEBCONTENT_RESUME) {
            Directive::WebResume
        } else if reply.contains(WEBCONTENT_OPINION) {
            Directive::WebOpinion
        } else if reply.contains(NO_ANSWER) {
            Directive::NoAnswer
        } else {
            Directive::Plain
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Directive::GenerateImage(_) => "generate_image",
            Directive::WebResume => "web_resume",
            Directive::WebOpinion => "web_opinion",
            Directive::NoAnswer => "no_answer",
            Directive::Plain => "plain",
        }
    }
}

/// The outcome of one dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEnvelope {
    /// Base64 encoded image
    Image(String),
    Text(String),
    Silent,
}

impl ResponseEnvelope {
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseEnvelope::Image(_) => "image",
            ResponseEnvelope::Text(_) => "text",
            ResponseEnvelope::Silent => "silent",
        }
    }
}

/// First URL in `text`.
pub fn extract_url(text: &str) -> Option<&str> {
    URL_RE.find(text).map(|m| m.as_str())
}

/// `text` with every URL removed.
pub fn remove_urls(text: &str) -> String {
    URL_RE.replace_all(text, "").into_owned()
}

/// Remove `<think>...</think>` reasoning blocks.
pub fn strip_think_blocks(text: &str) -> String {
    THINK_RE.replace_all(text, "").into_owned()
}

/// Remove a leading `@bot_username: ` the model sometimes copies from the
/// chat transcript format.
pub fn strip_self_mention(bot_username: &str, text: &str) -> String {
    let prefix = format!("@{}: ", bot_username);
    text.strip_prefix(&prefix).unwrap_or(text).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_each_marker() {
        assert_eq!(
            Directive::classify("WEBCONTENT_RESUME https://example.com"),
            Directive::WebResume
        );
        assert_eq!(
            Directive::classify("Sure: WEBCONTENT_OPINION https://example.com"),
            Directive::WebOpinion
        );
        assert_eq!(Directive::classify("NO_ANSWER"), Directive::NoAnswer);
        assert_eq!(Directive::classify("just chatting"), Directive::Plain);
    }

    #[test]
    fn test_generate_image_wins_over_everything() {
        assert_eq!(
            Directive::classify("GENERATE_IMAGE a cat NO_ANSWER WEBCONTENT_RESUME"),
            Directive::GenerateImage("a cat NO_ANSWER WEBCONTENT_RESUME".into())
        );
    }

    #[test]
    fn test_generate_image_is_prefix_anchored() {
        assert_eq!(
            Directive::classify("ok GENERATE_IMAGE a cat"),
            Directive::Plain
        );
    }

    #[test]
    fn test_generate_image_without_prompt() {
        assert_eq!(
            Directive::classify("GENERATE_IMAGE"),
            Directive::GenerateImage(String::new())
        );
    }

    #[test]
    fn test_resume_before_opinion_before_no_answer() {
        assert_eq!(
            Directive::classify("NO_ANSWER WEBCONTENT_OPINION WEBCONTENT_RESUME"),
            Directive::WebResume
        );
        assert_eq!(
            Directive::classify("NO_ANSWER WEBCONTENT_OPINION"),
            Directive::WebOpinion
        );
    }

    #[test]
    fn test_no_answer_substring_match() {
        assert_eq!(
            Directive::classify("I would say NO_ANSWER here"),
            Directive::NoAnswer
        );
    }

    #[test]
    fn test_extract_first_url() {
        assert_eq!(
            extract_url("WEBCONTENT_RESUME https://example.com/a?b=1 and http://other.org"),
            Some("https://example.com/a?b=1")
        );
        assert_eq!(extract_url("WEBCONTENT_RESUME"), None);
    }

    #[test]
    fn test_remove_urls() {
        assert_eq!(
            remove_urls("@lolo: summarize https://example.com/a please"),
            "@lolo: summarize  please"
        );
    }

    #[test]
    fn test_strip_think_blocks() {
        assert_eq!(
            strip_think_blocks("<think>hmm\nlet me see</think>Hello"),
            "Hello"
        );
        assert_eq!(strip_think_blocks("a<think>x</think>b<think>y</think>c"), "abc");
        assert_eq!(strip_think_blocks("no blocks"), "no blocks");
    }

    #[test]
    fn test_strip_self_mention() {
        assert_eq!(strip_self_mention("kiro_bot", "@kiro_bot: Hello"), "Hello");
        assert_eq!(strip_self_mention("kiro_bot", "Hello @kiro_bot: x"), "Hello @kiro_bot: x");
    }

    #[test]
    fn test_envelope_kind() {
        assert_eq!(ResponseEnvelope::Image("QUJD".into()).kind(), "image");
        assert_eq!(ResponseEnvelope::Text("hi".into()).kind(), "text");
        assert_eq!(ResponseEnvelope::Silent.kind(), "silent");
    }
}
