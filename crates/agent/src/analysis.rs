//! Inbound-message analysis: intent, sentiment, and escalation signals.
//!
//! Deliberately lightweight — keyword and lexicon heuristics, not model
//! calls. These run on every turn before retrieval, so they must be cheap
//! and deterministic.

use crabdesk_core::response::SuggestedAction;
use crabdesk_core::session::Intent;

/// Classify the user's intent from keywords.
pub fn detect_intent(text: &str) -> Intent {
    let lower = text.to_lowercase();

    let checks: &[(Intent, &[&str])] = &[
        (Intent::BusinessHours, &["business hours", "opening hours", "what time", "when are you open", "when do you open", "when do you close", "open on"]),
        (Intent::OrderStatus, &["order status", "my order", "where is my order", "track", "tracking", "delivery status", "shipped"]),
        (Intent::Pricing, &["price", "pricing", "how much", "cost", "discount", "promotion", "cheaper"]),
        (Intent::TechnicalSupport, &["not working", "error", "broken", "bug", "can't log", "cannot log", "doesn't work", "crash"]),
        (Intent::Complaint, &["complaint", "complain", "unacceptable", "terrible", "disappointed", "worst", "refund"]),
        (Intent::ProductInquiry, &["do you have", "do you sell", "in stock", "product", "available", "warranty"]),
        (Intent::Greeting, &["hello", "hi there", "good morning", "good afternoon", "good evening"]),
        (Intent::Farewell, &["bye", "goodbye", "thanks, that's all", "that is all"]),
    ];

    for (intent, keywords) in checks {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *intent;
        }
    }

    if lower.ends_with('?') || lower.starts_with("what") || lower.starts_with("how") {
        return Intent::GeneralInquiry;
    }

    Intent::Unknown
}

const POSITIVE_WORDS: &[&str] = &[
    "thanks", "thank you", "great", "perfect", "excellent", "awesome", "helpful", "good",
    "appreciate", "love", "wonderful",
];

const NEGATIVE_WORDS: &[&str] = &[
    "angry", "terrible", "awful", "horrible", "useless", "unacceptable", "disappointed",
    "frustrated", "worst", "bad", "slow", "ridiculous", "scam", "waste",
];

const NEGATIONS: &[&str] = &["not", "never", "no", "isn't", "wasn't", "don't", "doesn't"];

/// Estimate the sentiment of a single message, in [-1, 1].
///
/// Lexicon matching with single-step negation flipping ("not good" counts
/// negative). Zero for neutral or unrecognized text.
pub fn sentiment_score(text: &str) -> f32 {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    let mut positive = 0i32;
    let mut negative = 0i32;

    for (i, window) in words.iter().enumerate() {
        let negated = i > 0 && NEGATIONS.iter().any(|n| words[i - 1].trim_matches(|c: char| !c.is_alphanumeric() && c != '\'') == *n);

        let word = window.trim_matches(|c: char| !c.is_alphanumeric());
        if POSITIVE_WORDS.contains(&word) {
            if negated { negative += 1 } else { positive += 1 }
        } else if NEGATIVE_WORDS.contains(&word) {
            if negated { positive += 1 } else { negative += 1 }
        }
    }

    // Two-word phrases ("thank you") that single-token matching misses.
    if lower.contains("thank you") {
        positive += 1;
    }

    let total = positive + negative;
    if total == 0 {
        return 0.0;
    }
    ((positive - negative) as f32 / total as f32).clamp(-1.0, 1.0)
}

/// Fold a new message's sentiment into the session estimate.
///
/// Exponentially weighted toward the latest message so a sudden turn for
/// the worse registers within a turn or two.
pub fn blend_sentiment(previous: f32, current: f32) -> f32 {
    (0.4 * previous + 0.6 * current).clamp(-1.0, 1.0)
}

const HUMAN_REQUEST_PHRASES: &[&str] = &[
    "speak to a human",
    "talk to a human",
    "speak to a person",
    "talk to a person",
    "real person",
    "human agent",
    "live agent",
    "speak to someone",
    "talk to someone",
    "customer service officer",
    "transfer me",
];

/// Whether the customer explicitly asked for a human.
pub fn wants_human(text: &str) -> bool {
    let lower = text.to_lowercase();
    HUMAN_REQUEST_PHRASES.iter().any(|p| lower.contains(p))
}

const SENSITIVE_TOPICS: &[&str] = &[
    "lawsuit",
    "legal action",
    "lawyer",
    "sue you",
    "police",
    "pdpa",
    "data breach",
    "personal data",
    "harassment",
    "discrimination",
    "injury",
    "hospital",
];

/// Whether the message touches a topic that must go to a human.
pub fn sensitive_topic(text: &str) -> bool {
    let lower = text.to_lowercase();
    SENSITIVE_TOPICS.iter().any(|t| lower.contains(t))
}

/// Quick replies offered alongside a response, by intent.
pub fn quick_replies(intent: Intent) -> Vec<String> {
    match intent {
        Intent::BusinessHours => vec![
            "Where are you located?".into(),
            "Are you open on public holidays?".into(),
        ],
        Intent::OrderStatus => vec![
            "Change my delivery address".into(),
            "Cancel my order".into(),
        ],
        Intent::Pricing => vec![
            "Any ongoing promotions?".into(),
            "Tell me about your products".into(),
        ],
        Intent::Greeting => vec![
            "What are your business hours?".into(),
            "Tell me about your products".into(),
            "I need help with an order".into(),
        ],
        _ => vec![],
    }
}

/// Suggested follow-up actions, by intent.
pub fn suggested_actions(intent: Intent, support_email: &str) -> Vec<SuggestedAction> {
    match intent {
        Intent::Complaint | Intent::TechnicalSupport => vec![SuggestedAction {
            action_type: "link".into(),
            label: "Email our support team".into(),
            value: format!("mailto:{support_email}"),
        }],
        Intent::OrderStatus => vec![SuggestedAction {
            action_type: "quick_reply".into(),
            label: "Provide order number".into(),
            value: "My order number is ".into(),
        }],
        _ => vec![],
    }
}
