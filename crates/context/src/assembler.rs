//! The context assembler.
//!
//! Merges retrieved chunks, conversation history/summary, and the customer
//! profile into one token-bounded prompt context. The budget invariant
//! `used + reserved_for_response <= max` holds on every output; if the
//! system instructions plus the reserved response window alone exceed the
//! budget, assembly fails — that is a configuration error, not something to
//! silently truncate away.

use crabdesk_core::budget::TokenBudget;
use crabdesk_core::chunk::{DocumentChunk, RetrievalResult};
use crabdesk_core::message::{Message, Role};
use crabdesk_core::profile::CustomerProfile;
use crabdesk_core::session::ConversationSession;
use crabdesk_config::ContextConfig;
use serde::{Deserialize, Serialize};

use crate::token;

// ── Types ─────────────────────────────────────────────────────────────────

/// All inputs required to assemble one turn's context.
pub struct AssemblyInput<'a> {
    /// System/business instructions (fixed cost, never trimmed).
    pub system_instructions: &'a str,
    /// Retrieval result for the current query, score descending.
    pub retrieved: &'a RetrievalResult,
    /// The session as loaded (the inbound message is not yet appended).
    pub session: &'a ConversationSession,
    /// Customer profile for personalization, when known.
    pub profile: Option<&'a CustomerProfile>,
    /// The inbound user message for this turn.
    pub user_message: &'a str,
}

/// The assembled context, ready for a generation call.
///
/// `history` holds the selected raw message window; the current user
/// message is carried separately so the engine can append the exact
/// `Message` it will later commit.
#[derive(Debug, Clone)]
pub struct PromptContext {
    /// System instructions + profile + summary + knowledge sections.
    pub system_text: String,
    /// Selected raw history window, chronological.
    pub history: Vec<Message>,
    /// The current user message text.
    pub user_message: String,
    /// Chunks actually placed into the context. Citations on the final
    /// response must be a subset of these.
    pub chunks_used: Vec<DocumentChunk>,
    /// Final token accounting; `used() + reserved <= max` holds.
    pub budget: TokenBudget,
    /// Per-layer statistics.
    pub layers: Vec<LayerStats>,
    /// Items dropped during budget enforcement.
    pub drops: Vec<DropInfo>,
}

impl PromptContext {
    /// Ids of the chunks included in this context.
    pub fn chunk_ids(&self) -> Vec<&str> {
        self.chunks_used.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn used_tokens(&self) -> usize {
        self.budget.used()
    }
}

/// Statistics for a single context layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    pub name: String,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Information about items dropped during budget enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

/// Errors from context assembly.
#[derive(Debug, Clone)]
pub enum AssemblyError {
    /// System instructions + current message + reserved response exceed the
    /// total budget.
    BudgetInfeasible { required: usize, max: usize },
}

impl std::fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetInfeasible { required, max } => write!(
                f,
                "System instructions + reserved response require {required} tokens, budget is {max}"
            ),
        }
    }
}

impl std::error::Error for AssemblyError {}

impl From<AssemblyError> for crabdesk_core::Error {
    fn from(err: AssemblyError) -> Self {
        match err {
            AssemblyError::BudgetInfeasible { required, max } => {
                crabdesk_core::Error::BudgetInfeasible { required, max }
            }
        }
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless — create one and reuse it.
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Assemble a prompt context under the given budget.
    ///
    /// # Algorithm
    ///
    /// 1. Price the system block (instructions + profile) and the current
    ///    user message; both are always included
    /// 2. If those plus the reserved response window exceed the budget →
    ///    `BudgetInfeasible`
    /// 3. Fill what remains in priority order: recent raw messages →
    ///    rolling summary → retrieved chunks (whole chunks only)
    pub fn assemble(
        &self,
        input: &AssemblyInput<'_>,
        mut budget: TokenBudget,
    ) -> Result<PromptContext, AssemblyError> {
        let mut layers: Vec<LayerStats> = Vec::new();
        let mut drops: Vec<DropInfo> = Vec::new();

        // ── Layer 1: system block (never trimmed) ──────────────────────────
        let mut system_base = input.system_instructions.to_string();
        if let Some(profile) = input.profile {
            system_base.push_str("\n\n");
            system_base.push_str(&Self::render_profile(profile));
        }

        let system_tokens = token::estimate_tokens(&system_base);
        let user_tokens = token::estimate_tokens(input.user_message) + 4; // message overhead

        let required = system_tokens + user_tokens + budget.reserved_for_response;
        if required > budget.max_tokens {
            return Err(AssemblyError::BudgetInfeasible { required, max: budget.max_tokens });
        }

        budget.system_tokens = system_tokens;
        budget.conversation_tokens = user_tokens;

        layers.push(LayerStats {
            name: "system".into(),
            tokens: system_tokens,
            items_included: 1,
            items_total: 1,
        });

        // ── Layer 2: recent raw messages ───────────────────────────────────
        let (history, hist_stats, hist_drop) = self.select_history(input.session, &budget);
        budget.conversation_tokens += hist_stats.tokens;
        layers.push(hist_stats);
        if let Some(d) = hist_drop {
            drops.push(d);
        }

        // ── Layer 3: rolling summary (stands in for the covered span) ──────
        let mut summary_section = None;
        let summary_total = usize::from(input.session.summary.is_some());
        let mut summary_included = 0;
        let mut summary_tokens = 0;
        if let Some(summary) = &input.session.summary {
            let section = Self::render_summary(summary);
            let tokens = token::estimate_tokens(&section);
            if budget.can_add(tokens) {
                budget.conversation_tokens += tokens;
                summary_tokens = tokens;
                summary_included = 1;
                summary_section = Some(section);
            } else {
                drops.push(DropInfo {
                    layer: "summary".into(),
                    items_dropped: 1,
                    tokens_dropped: tokens,
                    reason: "Summary did not fit remaining budget".into(),
                });
            }
        }
        layers.push(LayerStats {
            name: "summary".into(),
            tokens: summary_tokens,
            items_included: summary_included,
            items_total: summary_total,
        });

        // ── Layer 4: retrieved chunks, score descending, whole chunks ──────
        let (knowledge_section, chunks_used, chunk_stats, chunk_drop) =
            Self::select_chunks(input.retrieved, &mut budget);
        layers.push(chunk_stats);
        if let Some(d) = chunk_drop {
            drops.push(d);
        }

        // ── Final system text ──────────────────────────────────────────────
        let mut system_text = system_base;
        if let Some(section) = summary_section {
            system_text.push_str("\n\n");
            system_text.push_str(&section);
        }
        if let Some(section) = knowledge_section {
            system_text.push_str("\n\n");
            system_text.push_str(&section);
        }

        layers.push(LayerStats {
            name: "user_message".into(),
            tokens: user_tokens,
            items_included: 1,
            items_total: 1,
        });

        debug_assert!(budget.used() + budget.reserved_for_response <= budget.max_tokens);

        Ok(PromptContext {
            system_text,
            history,
            user_message: input.user_message.to_string(),
            chunks_used,
            budget,
            layers,
            drops,
        })
    }

    // ── Layer renderers ───────────────────────────────────────────────────

    fn render_profile(profile: &CustomerProfile) -> String {
        let mut block = String::from("[Customer]\n");
        block.push_str(&format!("Name: {}\n", profile.display_name()));
        block.push_str(&format!(
            "Preferred language: {}\n",
            profile.preferred_language.code()
        ));
        if profile.interaction_count > 0 {
            block.push_str(&format!("Previous interactions: {}\n", profile.interaction_count));
        }
        block
    }

    fn render_summary(summary: &crabdesk_core::session::RollingSummary) -> String {
        let mut section = format!("[Conversation Summary]\n{}\n", summary.text);
        if !summary.key_topics.is_empty() {
            section.push_str(&format!("Key topics: {}\n", summary.key_topics.join(", ")));
        }
        if !summary.action_items.is_empty() {
            section.push_str(&format!("Open items: {}\n", summary.action_items.join("; ")));
        }
        section
    }

    /// Select the raw message window: newest first, bounded by count and
    /// budget, skipping the span the rolling summary already covers.
    fn select_history(
        &self,
        session: &ConversationSession,
        budget: &TokenBudget,
    ) -> (Vec<Message>, LayerStats, Option<DropInfo>) {
        let layer = "conversation_history";
        let start = session.summarized_until().min(session.messages.len());
        let candidates: Vec<&Message> = session.messages[start..]
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();

        let mut running = 0usize;
        let mut included: Vec<Message> = Vec::new();
        let mut dropped = 0;
        let mut dropped_tokens = 0;

        for msg in candidates.iter().rev() {
            let msg_tokens = token::estimate_message_tokens(msg);
            if included.len() < self.config.max_conversation_messages
                && budget.can_add(running + msg_tokens)
            {
                included.push((*msg).clone());
                running += msg_tokens;
            } else {
                dropped += 1;
                dropped_tokens += msg_tokens;
            }
        }

        included.reverse();

        let stats = LayerStats {
            name: layer.into(),
            tokens: running,
            items_included: included.len(),
            items_total: candidates.len(),
        };
        let drop = (dropped > 0).then(|| DropInfo {
            layer: layer.into(),
            items_dropped: dropped,
            tokens_dropped: dropped_tokens,
            reason: "Oldest turns dropped (recent-window cap or budget)".into(),
        });

        (included, stats, drop)
    }

    /// Select retrieved chunks in score order. Whole chunks only: the first
    /// chunk that does not fit ends the layer, the rest are dropped.
    fn select_chunks(
        retrieved: &RetrievalResult,
        budget: &mut TokenBudget,
    ) -> (Option<String>, Vec<DocumentChunk>, LayerStats, Option<DropInfo>) {
        let layer = "knowledge";
        if retrieved.chunks.is_empty() {
            let stats = LayerStats {
                name: layer.into(),
                tokens: 0,
                items_included: 0,
                items_total: 0,
            };
            return (None, Vec::new(), stats, None);
        }

        let header = "[Retrieved Knowledge]\n";
        let header_tokens = token::estimate_tokens(header);

        let mut section = String::from(header);
        let mut used = 0usize;
        let mut chunks_used: Vec<DocumentChunk> = Vec::new();
        let mut dropped = 0;
        let mut dropped_tokens = 0;

        for (i, chunk) in retrieved.chunks.iter().enumerate() {
            let entry = format!("[Source: {}] {}\n", chunk.source, chunk.content);
            let entry_tokens = token::estimate_tokens(&entry);
            let cost = if chunks_used.is_empty() { header_tokens + entry_tokens } else { entry_tokens };

            if budget.can_add(used + cost) {
                section.push_str(&entry);
                used += cost;
                chunks_used.push(chunk.clone());
            } else {
                // Budget exhausted: every remaining chunk is dropped whole.
                let remaining = &retrieved.chunks[i..];
                dropped = remaining.len();
                dropped_tokens = remaining
                    .iter()
                    .map(|c| token::estimate_tokens(&c.content) + 4)
                    .sum();
                break;
            }
        }

        budget.retrieved_tokens = used;

        let stats = LayerStats {
            name: layer.into(),
            tokens: used,
            items_included: chunks_used.len(),
            items_total: retrieved.chunks.len(),
        };
        let drop = (dropped > 0).then(|| DropInfo {
            layer: layer.into(),
            items_dropped: dropped,
            tokens_dropped: dropped_tokens,
            reason: "Budget exhausted; remaining chunks dropped whole".into(),
        });

        let section = (!chunks_used.is_empty()).then_some(section);
        (section, chunks_used, stats, drop)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crabdesk_core::message::SessionId;
    use crabdesk_core::session::{Language, RollingSummary};

    fn config() -> ContextConfig {
        ContextConfig::default()
    }

    fn budget(max: usize, reserved: usize) -> TokenBudget {
        TokenBudget::new(max, reserved)
    }

    fn chunk(id: &str, content: &str, score: f32) -> DocumentChunk {
        DocumentChunk {
            id: id.into(),
            source: "kb.md".into(),
            category: Some("faq".into()),
            language: Language::En,
            content: content.into(),
            embedding: None,
            score,
        }
    }

    fn retrieved(chunks: Vec<DocumentChunk>) -> RetrievalResult {
        RetrievalResult {
            chunks,
            query_used: "q".into(),
            retrieval_time_ms: 1,
            reranking_applied: false,
        }
    }

    fn session_with(messages: Vec<Message>) -> ConversationSession {
        let mut session = ConversationSession::new(SessionId::from("sess_t"), None);
        for m in messages {
            session.push(m);
        }
        session
    }

    fn input<'a>(
        retrieved: &'a RetrievalResult,
        session: &'a ConversationSession,
        user_message: &'a str,
    ) -> AssemblyInput<'a> {
        AssemblyInput {
            system_instructions: "You are the support agent for Acme Pte Ltd.",
            retrieved,
            session,
            profile: None,
            user_message,
        }
    }

    #[test]
    fn budget_invariant_holds() {
        let asm = ContextAssembler::new(config());
        let r = retrieved(vec![chunk("a", &"knowledge ".repeat(40), 0.9)]);
        let session = session_with(vec![Message::user("earlier"), Message::assistant("reply")]);

        let ctx = asm.assemble(&input(&r, &session, "hello"), budget(4000, 1000)).unwrap();
        assert!(ctx.budget.used() + ctx.budget.reserved_for_response <= ctx.budget.max_tokens);
    }

    #[test]
    fn budget_invariant_randomized() {
        // Deterministic LCG so the "random" cases are reproducible.
        let mut state: u64 = 0x2545F491;
        let mut next = move |bound: usize| -> usize {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as usize) % bound
        };

        let asm = ContextAssembler::new(config());
        for _ in 0..50 {
            let max = 600 + next(4000);
            let reserved = 100 + next(400);
            let n_msgs = next(30);
            let n_chunks = next(8);

            let session = session_with(
                (0..n_msgs)
                    .map(|i| {
                        let body = "word ".repeat(1 + next(60));
                        if i % 2 == 0 { Message::user(body) } else { Message::assistant(body) }
                    })
                    .collect(),
            );
            let r = retrieved(
                (0..n_chunks)
                    .map(|i| chunk(&format!("c{i}"), &"text ".repeat(1 + next(80)), 0.9))
                    .collect(),
            );

            match asm.assemble(&input(&r, &session, "What about my order?"), budget(max, reserved)) {
                Ok(ctx) => {
                    assert!(
                        ctx.budget.used() + ctx.budget.reserved_for_response
                            <= ctx.budget.max_tokens,
                        "invariant violated at max={max} reserved={reserved}"
                    );
                }
                Err(AssemblyError::BudgetInfeasible { required, max: m }) => {
                    assert!(required > m);
                }
            }
        }
    }

    #[test]
    fn infeasible_budget_is_an_error() {
        let asm = ContextAssembler::new(config());
        let r = retrieved(vec![]);
        let session = session_with(vec![]);

        let err = asm.assemble(&input(&r, &session, "hello"), budget(20, 15)).unwrap_err();
        let AssemblyError::BudgetInfeasible { required, max } = err;
        assert!(required > max);
    }

    #[test]
    fn infeasible_maps_to_core_error() {
        let err: crabdesk_core::Error =
            AssemblyError::BudgetInfeasible { required: 500, max: 100 }.into();
        assert!(matches!(err, crabdesk_core::Error::BudgetInfeasible { required: 500, max: 100 }));
    }

    #[test]
    fn chunks_truncate_whole_never_mid_chunk() {
        let asm = ContextAssembler::new(config());
        // Each chunk ~100 tokens; budget leaves room for roughly two.
        let r = retrieved(vec![
            chunk("a", &"alpha ".repeat(70), 0.9),
            chunk("b", &"beta ".repeat(70), 0.8),
            chunk("c", &"gamma ".repeat(70), 0.7),
        ]);
        let session = session_with(vec![]);

        let ctx = asm.assemble(&input(&r, &session, "q"), budget(300, 50)).unwrap();

        // Whichever chunks made it in are complete.
        for used in &ctx.chunks_used {
            assert!(ctx.system_text.contains(&used.content));
        }
        // And selection follows score order: if "b" is in, "a" must be too.
        let ids = ctx.chunk_ids();
        if ids.contains(&"b") {
            assert!(ids.contains(&"a"));
        }
        if ids.contains(&"c") {
            assert!(ids.contains(&"b"));
        }
        assert!(ctx.chunks_used.len() < 3);
        assert!(ctx.drops.iter().any(|d| d.layer == "knowledge"));
    }

    #[test]
    fn summary_rendered_and_covered_span_skipped() {
        let asm = ContextAssembler::new(config());
        let r = retrieved(vec![]);
        let mut session = session_with(
            (0..10)
                .map(|i| {
                    if i % 2 == 0 {
                        Message::user(format!("old question {i}"))
                    } else {
                        Message::assistant(format!("old answer {i}"))
                    }
                })
                .collect(),
        );
        session.summary = Some(RollingSummary {
            text: "Customer asked about delivery and refunds.".into(),
            key_topics: vec!["delivery".into(), "refunds".into()],
            action_items: vec![],
            covers_messages: 6,
            token_count: 10,
            updated_at: chrono::Utc::now(),
        });

        let ctx = asm.assemble(&input(&r, &session, "anything else?"), budget(4000, 1000)).unwrap();

        assert!(ctx.system_text.contains("[Conversation Summary]"));
        assert!(ctx.system_text.contains("delivery and refunds"));
        assert!(ctx.system_text.contains("Key topics: delivery, refunds"));

        // Raw window starts after the watermark.
        assert_eq!(ctx.history.len(), 4);
        assert!(ctx.history.iter().all(|m| !m.content.contains("old question 0")));
        assert_eq!(ctx.history[0].content, "old question 6".to_string());
    }

    #[test]
    fn recent_window_cap_enforced() {
        let cfg = ContextConfig { max_conversation_messages: 4, ..ContextConfig::default() };
        let asm = ContextAssembler::new(cfg);
        let r = retrieved(vec![]);
        let session = session_with(
            (0..20).map(|i| Message::user(format!("message {i}"))).collect(),
        );

        let ctx = asm.assemble(&input(&r, &session, "now"), budget(8000, 1000)).unwrap();

        assert_eq!(ctx.history.len(), 4);
        // Newest messages survive.
        assert_eq!(ctx.history.last().unwrap().content, "message 19");
        assert!(ctx.drops.iter().any(|d| d.layer == "conversation_history"));
    }

    #[test]
    fn deterministic_assembly() {
        let asm = ContextAssembler::new(config());
        let r = retrieved(vec![chunk("a", "fact one", 0.9), chunk("b", "fact two", 0.8)]);
        let session = session_with(vec![Message::user("hi"), Message::assistant("hello")]);

        let ctx1 = asm.assemble(&input(&r, &session, "question"), budget(4000, 1000)).unwrap();
        let ctx2 = asm.assemble(&input(&r, &session, "question"), budget(4000, 1000)).unwrap();

        assert_eq!(ctx1.system_text, ctx2.system_text);
        assert_eq!(ctx1.budget, ctx2.budget);
        assert_eq!(ctx1.chunk_ids(), ctx2.chunk_ids());
        assert_eq!(
            ctx1.history.iter().map(|m| &m.content).collect::<Vec<_>>(),
            ctx2.history.iter().map(|m| &m.content).collect::<Vec<_>>()
        );
    }

    #[test]
    fn profile_rendered_into_system_block() {
        let asm = ContextAssembler::new(config());
        let r = retrieved(vec![]);
        let session = session_with(vec![]);
        let profile = CustomerProfile {
            id: "cust_1".into(),
            name: Some("Tan Wei".into()),
            preferred_language: Language::Zh,
            interaction_count: 3,
            ..Default::default()
        };

        let ctx = asm
            .assemble(
                &AssemblyInput {
                    system_instructions: "You are the support agent.",
                    retrieved: &r,
                    session: &session,
                    profile: Some(&profile),
                    user_message: "hi",
                },
                budget(4000, 1000),
            )
            .unwrap();

        assert!(ctx.system_text.contains("[Customer]"));
        assert!(ctx.system_text.contains("Tan Wei"));
        assert!(ctx.system_text.contains("Preferred language: zh"));
    }

    #[test]
    fn empty_retrieval_produces_no_knowledge_section() {
        let asm = ContextAssembler::new(config());
        let r = retrieved(vec![]);
        let session = session_with(vec![]);

        let ctx = asm.assemble(&input(&r, &session, "hello"), budget(4000, 1000)).unwrap();
        assert!(!ctx.system_text.contains("[Retrieved Knowledge]"));
        assert!(ctx.chunks_used.is_empty());
    }

    #[test]
    fn layer_stats_cover_all_layers() {
        let asm = ContextAssembler::new(config());
        let r = retrieved(vec![chunk("a", "some knowledge", 0.9)]);
        let session = session_with(vec![Message::user("prev")]);

        let ctx = asm.assemble(&input(&r, &session, "now"), budget(4000, 1000)).unwrap();
        let names: Vec<&str> = ctx.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["system", "conversation_history", "summary", "knowledge", "user_message"]
        );
        assert!(ctx.layers.iter().find(|l| l.name == "knowledge").unwrap().tokens > 0);
    }
}
