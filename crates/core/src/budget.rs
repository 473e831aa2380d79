//! Per-turn token accounting.
//!
//! Created fresh each turn, never persisted. The context assembler must
//! uphold the invariant `used() + reserved_for_response <= max_tokens` on
//! every prompt it emits.

use serde::{Deserialize, Serialize};

/// Token budget for a single turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Maximum context tokens for the model call.
    pub max_tokens: usize,

    /// Tokens consumed by system/business instructions.
    pub system_tokens: usize,

    /// Tokens consumed by conversation history (raw messages + summary).
    pub conversation_tokens: usize,

    /// Tokens consumed by retrieved knowledge chunks.
    pub retrieved_tokens: usize,

    /// Tokens held back for the forthcoming response.
    pub reserved_for_response: usize,
}

impl TokenBudget {
    /// A fresh budget with nothing consumed yet.
    pub fn new(max_tokens: usize, reserved_for_response: usize) -> Self {
        Self {
            max_tokens,
            system_tokens: 0,
            conversation_tokens: 0,
            retrieved_tokens: 0,
            reserved_for_response,
        }
    }

    /// Tokens consumed so far.
    pub fn used(&self) -> usize {
        self.system_tokens + self.conversation_tokens + self.retrieved_tokens
    }

    /// Tokens still available for context (never negative).
    pub fn available(&self) -> usize {
        self.max_tokens
            .saturating_sub(self.used())
            .saturating_sub(self.reserved_for_response)
    }

    /// Whether `tokens` more context would still respect the invariant.
    pub fn can_add(&self, tokens: usize) -> bool {
        self.used() + tokens + self.reserved_for_response <= self.max_tokens
    }

    /// Fraction of the total budget consumed, in [0, 1].
    pub fn utilization(&self) -> f32 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.used() as f32 / self.max_tokens as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_budget_has_full_availability() {
        let budget = TokenBudget::new(4000, 1000);
        assert_eq!(budget.used(), 0);
        assert_eq!(budget.available(), 3000);
        assert_eq!(budget.utilization(), 0.0);
    }

    #[test]
    fn can_add_respects_reservation() {
        let mut budget = TokenBudget::new(4000, 1000);
        budget.system_tokens = 500;
        assert!(budget.can_add(2500));
        assert!(!budget.can_add(2501));
    }

    #[test]
    fn available_never_underflows() {
        let mut budget = TokenBudget::new(1000, 900);
        budget.system_tokens = 200;
        assert_eq!(budget.available(), 0);
    }

    #[test]
    fn used_sums_all_categories() {
        let budget = TokenBudget {
            max_tokens: 4000,
            system_tokens: 100,
            conversation_tokens: 200,
            retrieved_tokens: 300,
            reserved_for_response: 1000,
        };
        assert_eq!(budget.used(), 600);
        assert!((budget.utilization() - 0.15).abs() < 1e-6);
    }
}
