//! Lightweight language detection for the Singapore customer base.
//!
//! Two passes: script detection (Han → Mandarin, Tamil script → Tamil),
//! then a Malay phrase list. English is the default for ambiguous business
//! context — the safest choice for a Singapore SMB audience.

use crabdesk_core::session::Language;

/// Detects which supported language a message is written in.
pub struct LanguageDetector {
    malay_phrases: Vec<&'static str>,
}

impl LanguageDetector {
    pub fn new() -> Self {
        Self {
            malay_phrases: vec![
                "selamat",
                "terima kasih",
                "berapa",
                "boleh",
                "tolong",
                "harga",
                "saya nak",
                "macam mana",
            ],
        }
    }

    /// Detect the language of `text`.
    pub fn detect(&self, text: &str) -> Language {
        let mut han = 0usize;
        let mut tamil = 0usize;
        let mut total = 0usize;

        for c in text.chars() {
            if c.is_whitespace() || c.is_ascii_punctuation() {
                continue;
            }
            total += 1;
            match c {
                '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' => han += 1,
                '\u{0B80}'..='\u{0BFF}' => tamil += 1,
                _ => {}
            }
        }

        if total > 0 {
            // A handful of CJK or Tamil characters is a strong signal even
            // in mixed-script messages.
            if han * 5 >= total || han >= 3 {
                return Language::Zh;
            }
            if tamil * 5 >= total || tamil >= 3 {
                return Language::Ta;
            }
        }

        let lower = text.to_lowercase();
        if self.malay_phrases.iter().any(|p| lower.contains(p)) {
            return Language::Ms;
        }

        Language::En
    }
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}
