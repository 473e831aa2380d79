//! Singapore PDPA-compliant PII scrubbing.
//!
//! Masks personally-identifying values in message text while preserving
//! conversational context: `S1234567A` becomes `[NRIC_MASKED]`, not an
//! empty hole. Detections are reported by kind only — the scrubber never
//! logs or returns the matched values themselves.

use regex::Regex;
use tracing::info;

/// Categories of PII the scrubber recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiKind {
    /// Singapore NRIC (S/T prefix)
    Nric,
    /// Foreign Identification Number (F/G prefix)
    Fin,
    /// Singapore phone number, with or without +65
    Phone,
    /// Email address
    Email,
    /// Street address / block / postal code
    Address,
}

impl PiiKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Nric => "NRIC",
            Self::Fin => "FIN",
            Self::Phone => "PHONE",
            Self::Email => "EMAIL",
            Self::Address => "ADDRESS",
        }
    }

    fn mask(&self) -> &'static str {
        match self {
            Self::Nric => "[NRIC_MASKED]",
            Self::Fin => "[FIN_MASKED]",
            Self::Phone => "[PHONE_MASKED]",
            Self::Email => "[EMAIL_MASKED]",
            Self::Address => "[ADDRESS_MASKED]",
        }
    }
}

/// Result of one scrubbing pass.
#[derive(Debug, Clone)]
pub struct ScrubResult {
    /// The text with all detected PII masked.
    pub text: String,
    /// One entry per masked value, kinds only.
    pub detections: Vec<PiiKind>,
}

impl ScrubResult {
    pub fn is_clean(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Masks Singapore-specific PII in free text.
pub struct PiiScrubber {
    patterns: Vec<(PiiKind, Regex)>,
}

impl PiiScrubber {
    pub fn new() -> Self {
        // Order matters: identifiers before the phone pattern so an NRIC's
        // digit run is never half-eaten as a phone number.
        let raw: &[(PiiKind, &str)] = &[
            (PiiKind::Nric, r"(?i)\b[ST]\d{7}[A-Z]\b"),
            (PiiKind::Fin, r"(?i)\b[FG]\d{7}[A-Z]\b"),
            (
                PiiKind::Email,
                r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
            ),
            (PiiKind::Phone, r"(?:\+65[\s-]?)?\b[689]\d{3}[\s-]?\d{4}\b"),
            (
                PiiKind::Address,
                r"(?i)\b(?:blk|block)\s+\d+[a-z]?\s+[a-z][a-z ]+",
            ),
            (PiiKind::Address, r"(?i)\bsingapore\s+\d{6}\b"),
        ];

        let patterns = raw
            .iter()
            .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (*kind, re)))
            .collect();

        Self { patterns }
    }

    /// Mask all recognized PII in `text`.
    ///
    /// Detections are logged by kind and session for the audit trail;
    /// matched values never leave this function unmasked.
    pub fn scrub(&self, text: &str, session_id: &str) -> ScrubResult {
        let mut current = text.to_string();
        let mut detections = Vec::new();

        for (kind, regex) in &self.patterns {
            let count = regex.find_iter(&current).count();
            if count == 0 {
                continue;
            }
            current = regex.replace_all(&current, kind.mask()).into_owned();
            for _ in 0..count {
                detections.push(*kind);
            }
            info!(session_id, kind = kind.label(), count, "PII detected and masked");
        }

        ScrubResult { text: current, detections }
    }
}

impl Default for PiiScrubber {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrub(text: &str) -> ScrubResult {
        PiiScrubber::new().scrub(text, "sess_test")
    }

    #[test]
    fn masks_nric() {
        let result = scrub("My NRIC is S1234567A, please update it.");
        assert_eq!(result.text, "My NRIC is [NRIC_MASKED], please update it.");
        assert_eq!(result.detections, vec![PiiKind::Nric]);
    }

    #[test]
    fn masks_fin() {
        let result = scrub("FIN G7654321X on file");
        assert!(result.text.contains("[FIN_MASKED]"));
        assert_eq!(result.detections, vec![PiiKind::Fin]);
    }

    #[test]
    fn masks_phone_with_and_without_prefix() {
        let result = scrub("Call me at +65 9123 4567 or 81234567.");
        assert_eq!(result.text, "Call me at [PHONE_MASKED] or [PHONE_MASKED].");
        assert_eq!(result.detections, vec![PiiKind::Phone, PiiKind::Phone]);
    }

    #[test]
    fn masks_email() {
        let result = scrub("Send it to mei.lin@example.com.sg thanks");
        assert!(result.text.contains("[EMAIL_MASKED]"));
        assert_eq!(result.detections, vec![PiiKind::Email]);
    }

    #[test]
    fn masks_block_address_and_postal_code() {
        let result = scrub("Deliver to Blk 123 Ang Mo Kio Avenue, Singapore 560123");
        assert!(result.text.contains("[ADDRESS_MASKED]"));
        assert!(!result.text.contains("560123"));
        assert_eq!(result.detections.len(), 2);
    }

    #[test]
    fn clean_text_untouched() {
        let result = scrub("What are your business hours?");
        assert_eq!(result.text, "What are your business hours?");
        assert!(result.is_clean());
    }

    #[test]
    fn order_numbers_not_mistaken_for_phones() {
        let result = scrub("Where is order #4411?");
        assert_eq!(result.text, "Where is order #4411?");
        assert!(result.is_clean());
    }

    #[test]
    fn nric_not_partially_eaten_by_phone_pattern() {
        let result = scrub("ID T9876543Z");
        assert_eq!(result.text, "ID [NRIC_MASKED]");
        assert_eq!(result.detections, vec![PiiKind::Nric]);
    }

    #[test]
    fn multiple_kinds_in_one_message() {
        let result = scrub("I'm S1234567A, email me at a@b.com or ring 91234567");
        assert!(result.text.contains("[NRIC_MASKED]"));
        assert!(result.text.contains("[EMAIL_MASKED]"));
        assert!(result.text.contains("[PHONE_MASKED]"));
        assert_eq!(result.detections.len(), 3);
    }
}
