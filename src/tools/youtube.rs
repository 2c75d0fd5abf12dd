//! YouTube transcript tool.
//!
//! The watch page embeds the caption track list as JSON; the first track's
//! `baseUrl` returns a timedtext XML document with one `<text>` element per
//! caption line.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::error::{RelayError, Result};

use super::web::{decode_common_html_entities, normalize_whitespace};
use super::{Tool, ToolContext};

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const TRUNCATION_NOTICE: &str = "[Transcript truncated due to length]";
const NO_VIDEO_ID: &str = "Could not extract a valid YouTube video ID from the URL.";
const NO_TRANSCRIPT: &str = "No transcript is available for this YouTube video.";

static VIDEO_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/shorts/)([A-Za-z0-9_-]{11})")
        .unwrap()
});

static CAPTION_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<text\b[^>]*>(.*?)</text>").unwrap());

/// Pull the 11-character video id out of a watch, short or shorts URL.
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Find the first caption track URL in a watch page.
pub fn caption_track_url(page: &str) -> Option<String> {
    let start = page.find("\"captionTracks\":")? + "\"captionTracks\":".len();
    let array = balanced_json_array(&page[start..])?;
    let tracks: Vec<Value> = serde_json::from_str(array).ok()?;
    tracks
        .iter()
        .find_map(|t| t.get("baseUrl").and_then(Value::as_str))
        .map(str::to_string)
}

/// Slice the JSON array at the start of `s`, honouring strings and nesting.
fn balanced_json_array(s: &str) -> Option<&str> {
    if !s.starts_with('[') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Join the caption lines of a timedtext document with spaces.
///
/// Caption text is escaped twice (`&amp;#39;`), so entities are decoded
/// twice.
pub fn parse_timedtext(xml: &str) -> String {
    let lines: Vec<String> = CAPTION_TEXT_RE
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| {
            let once = decode_common_html_entities(m.as_str());
            normalize_whitespace(&decode_common_html_entities(&once))
        })
        .filter(|line| !line.is_empty())
        .collect();
    lines.join(" ")
}

/// Cut `text` to `max_chars` characters and append the truncation notice.
pub fn truncate_transcript(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}\n\n{}", kept.trim_end(), TRUNCATION_NOTICE)
}

pub struct YoutubeTranscriptTool {
    client: Client,
    max_chars: usize,
}

impl YoutubeTranscriptTool {
    /// `max_chars` is usually the conversation token budget times four.
    pub fn new(request_timeout: Duration, max_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            max_chars: max_chars.max(1),
        }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RelayError::Tool(format!("HTTP {}", response.status())));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Tool for YoutubeTranscriptTool {
    fn name(&self) -> &str {
        "get_youtube_transcript"
    }

    fn description(&self) -> &str {
        "Tool for obtaining the transcript of a YouTube video. Use it to summarize or discuss \
         the content of a YouTube video from its URL."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "YouTube video URL"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let Some(video_id) = extract_video_id(url) else {
            return Ok(NO_VIDEO_ID.to_string());
        };
        debug!(video_id = %video_id, "Fetching YouTube transcript");

        let page = self.get_text(&format!("{}{}", WATCH_URL, video_id)).await?;
        let Some(track_url) = caption_track_url(&page) else {
            error!(url, "No transcript found for YouTube video");
            return Ok(NO_TRANSCRIPT.to_string());
        };

        let transcript = parse_timedtext(&self.get_text(&track_url).await?);
        if transcript.is_empty() {
            error!(url, "Empty transcript for YouTube video");
            return Ok(NO_TRANSCRIPT.to_string());
        }

        Ok(truncate_transcript(&transcript, self.max_chars))
    }
}
