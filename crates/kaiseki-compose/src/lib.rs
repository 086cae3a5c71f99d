// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bilingual response composition.
//!
//! Takes the raw provider answer, extracts the Japanese and English
//! summaries, substitutes fixed fallbacks for anything missing or
//! malformed, truncates each field at a unit boundary, and renders the
//! final outgoing message. Pure: composing the same answer twice yields a
//! byte-identical message, which is what makes cached payloads safe to
//! replay.
//!
//! The outgoing message is never empty and never contains raw provider
//! errors.

use kaiseki_config::model::ComposeConfig;
use serde::Deserialize;

/// Fallback summaries used when the provider answer is malformed or a
/// field is absent. The user sees a polite "busy" note, never an error.
pub mod fallback {
    pub const OVERLOAD_JP: &str = "現在AIが混み合っています。しばらくしてから再試行してください。";
    pub const OVERLOAD_EN: &str = "The AI is overloaded. Please retry after a short wait.";
}

/// The expected structured shape of a provider answer.
#[derive(Debug, Deserialize)]
struct StructuredAnswer {
    #[serde(default)]
    ja_summary: Option<String>,
    #[serde(default)]
    en_summary: Option<String>,
}

/// Join the two language paragraphs into one outgoing message.
pub fn build_bilingual_message(jp: &str, en: &str) -> String {
    format!("{jp}\n\n{en}")
}

/// Truncate to at most `max_chars` Unicode code points, at a character
/// boundary. The result is always a prefix of the (trimmed) input.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.trim().to_string();
    }
    text.chars().take(max_chars).collect::<String>().trim().to_string()
}

/// Truncate to at most `max_words` whitespace-delimited words, never
/// cutting mid-word.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.trim().to_string();
    }
    words[..max_words].join(" ")
}

/// Composer for final user-facing messages.
#[derive(Debug, Clone)]
pub struct Composer {
    config: ComposeConfig,
}

impl Composer {
    pub fn new(config: ComposeConfig) -> Self {
        Self { config }
    }

    /// Compose the final bilingual message from a raw provider answer.
    ///
    /// The answer is expected to be JSON `{ja_summary, en_summary}`; on any
    /// parse failure or missing field the overload fallback is substituted
    /// for that field, so the result is always bilingual and non-empty.
    pub fn compose(&self, raw_answer: &str) -> String {
        let parsed: StructuredAnswer = serde_json::from_str(raw_answer).unwrap_or(
            StructuredAnswer {
                ja_summary: None,
                en_summary: None,
            },
        );

        let ja = parsed
            .ja_summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| fallback::OVERLOAD_JP.to_string());
        let en = parsed
            .en_summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| fallback::OVERLOAD_EN.to_string());

        let ja = truncate_chars(&ja, self.config.max_ja_chars);
        let en = truncate_words(&en, self.config.max_en_words);

        build_bilingual_message(&ja, &en)
    }

    /// The bilingual overload message, used when retries were exhausted and
    /// there is no answer to compose at all.
    pub fn overloaded_message(&self) -> String {
        build_bilingual_message(fallback::OVERLOAD_JP, fallback::OVERLOAD_EN)
    }
}
