//! The support engine — one `handle_turn` per inbound customer message.
//!
//! Concurrency model: turns across sessions run freely in parallel; turns
//! within one session are serialized by an advisory lock with a bounded
//! wait (`SessionBusy` on expiry). The whole pipeline runs under the
//! configured per-turn deadline; on expiry the turn escalates with
//! `repeated_failure` instead of hanging.
//!
//! Write-back is all-or-nothing: the user message, the assistant message,
//! and any summary/status updates commit in a single `append_turn` call at
//! the end of the turn. A turn that fails earlier leaves the store
//! untouched.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crabdesk_compliance::{LanguageDetector, PiiScrubber, RetentionPolicy};
use crabdesk_config::EngineConfig;
use crabdesk_context::{AssemblyInput, ContextAssembler, PromptContext, SummaryPlanner};
use crabdesk_core::budget::TokenBudget;
use crabdesk_core::chunk::ChunkFilters;
use crabdesk_core::error::{Error, Result};
use crabdesk_core::event::{DomainEvent, EventBus};
use crabdesk_core::knowledge::KnowledgeStore;
use crabdesk_core::memory::{SessionStore, TurnUpdate};
use crabdesk_core::message::{Message, SessionId};
use crabdesk_core::profile::CustomerProfile;
use crabdesk_core::provider::{EmbeddingProvider, LanguageModel, Reranker, Summarizer};
use crabdesk_core::response::{AgentResponse, EscalationReason};
use crabdesk_core::session::{ConversationSession, Language, RollingSummary, SessionStatus};
use crabdesk_core::ticket::TicketSink;
use crabdesk_providers::RetryModel;
use crabdesk_retrieval::Retriever;

use crate::analysis;
use crate::arbiter::{
    citations_from, verify_citations, ArbiterOutcome, ResponseArbiter, TurnSignals,
};
use crate::escalation;
use crate::stream_event::TurnStreamEvent;

/// One inbound customer message.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Session to continue; a fresh session is created when absent.
    pub session_id: Option<String>,
    /// The message text.
    pub message: String,
    /// Customer reference for personalization.
    pub customer_id: Option<String>,
    /// Customer profile, when the caller has one loaded.
    pub profile: Option<CustomerProfile>,
}

/// External collaborators handed to the engine at construction.
///
/// Explicit dependency injection — no framework-managed graph, no ambient
/// globals.
pub struct EngineDeps {
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub model: Arc<dyn LanguageModel>,
    pub summarizer: Arc<dyn Summarizer>,
    pub sessions: Arc<dyn SessionStore>,
    pub tickets: Arc<dyn TicketSink>,
    pub events: Arc<EventBus>,
}

/// What the bounded pipeline produced for one turn.
struct TurnDecision {
    outcome: ArbiterOutcome,
    context: Option<PromptContext>,
    pending_summary: Option<RollingSummary>,
}

/// The retrieval-augmented response engine.
pub struct SupportEngine {
    config: EngineConfig,
    retriever: Retriever,
    assembler: ContextAssembler,
    planner: SummaryPlanner,
    arbiter: ResponseArbiter,
    summarizer: Arc<dyn Summarizer>,
    sessions: Arc<dyn SessionStore>,
    tickets: Arc<dyn TicketSink>,
    events: Arc<EventBus>,
    scrubber: PiiScrubber,
    language: LanguageDetector,
    retention: RetentionPolicy,
    locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SupportEngine {
    /// Build the engine. Validates configuration up front — an infeasible
    /// budget or inverted thresholds are rejected here, not at turn time.
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Result<Self> {
        config.validate().map_err(Error::from)?;

        let model: Arc<dyn LanguageModel> =
            Arc::new(RetryModel::new(deps.model, config.arbiter.max_llm_retries));

        let retriever = Retriever::new(
            deps.knowledge,
            deps.embedder,
            deps.reranker,
            config.retrieval.clone(),
        );
        let assembler = ContextAssembler::new(config.context.clone());
        let planner = SummaryPlanner::new(config.context.clone());
        let arbiter = ResponseArbiter::new(model, &config.llm, config.arbiter.clone());
        let retention = RetentionPolicy::new(&config.compliance);

        Ok(Self {
            config,
            retriever,
            assembler,
            planner,
            arbiter,
            summarizer: deps.summarizer,
            sessions: deps.sessions,
            tickets: deps.tickets,
            events: deps.events,
            scrubber: PiiScrubber::new(),
            language: LanguageDetector::new(),
            retention,
            locks: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    /// The engine's event bus (for audit subscribers).
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Enforce the PDPA retention window: delete sessions idle past it.
    pub async fn purge_expired(&self) -> Result<usize> {
        Ok(self.retention.enforce(self.sessions.as_ref(), &self.events).await?)
    }

    /// Process one customer turn to a final response.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<AgentResponse> {
        let started = Instant::now();
        let session_id = request
            .session_id
            .as_deref()
            .map(SessionId::from)
            .unwrap_or_default();

        // Serialize turns within the session; bounded wait.
        let _guard = self.acquire_session_lock(&session_id).await?;

        let mut session = match self.sessions.load(&session_id).await? {
            Some(existing) => existing,
            None => ConversationSession::new(session_id.clone(), request.customer_id.clone()),
        };

        // Escalated sessions are terminal for the engine: a human owns the
        // conversation now, so no draft, no ticket, no write-back.
        if session.status == SessionStatus::Escalated {
            info!(session_id = %session_id, "Turn on escalated session, returning handoff acknowledgment");
            return Ok(self.acknowledgment_response(&session_id, started));
        }

        // A session past retention that somehow survived purge starts over.
        if session.status == SessionStatus::Expired {
            self.sessions.delete(&session_id).await?;
            session = ConversationSession::new(session_id.clone(), request.customer_id.clone());
        }

        // ── Compliance pass + analysis ─────────────────────────────────────
        let scrubbed = if self.config.compliance.pii_scrubbing {
            self.scrubber.scrub(&request.message, &session_id.0)
        } else {
            crabdesk_compliance::ScrubResult {
                text: request.message.clone(),
                detections: vec![],
            }
        };
        for kind in &scrubbed.detections {
            self.events.publish(DomainEvent::PiiDetected {
                session_id: session_id.0.clone(),
                kind: kind.label().into(),
                timestamp: Utc::now(),
            });
        }

        let language = self.language.detect(&scrubbed.text);
        let intent = analysis::detect_intent(&scrubbed.text);
        let sentiment =
            analysis::blend_sentiment(session.sentiment, analysis::sentiment_score(&scrubbed.text));
        let signals = TurnSignals {
            sentiment,
            intent,
            explicit_human_request: analysis::wants_human(&scrubbed.text),
            sensitive_topic: analysis::sensitive_topic(&scrubbed.text),
        };

        let user_message = Message::user(scrubbed.text.clone());

        // ── Bounded pipeline: retrieve → summarize → assemble → arbitrate ──
        let deadline = Duration::from_secs(self.config.arbiter.response_timeout_seconds);
        let decision = match tokio::time::timeout(
            deadline,
            self.run_pipeline(&session, &request, &scrubbed.text, &user_message, &signals, language),
        )
        .await
        {
            Ok(decided) => decided?,
            Err(_) => {
                warn!(session_id = %session_id, timeout_secs = deadline.as_secs(), "Turn deadline expired, escalating");
                TurnDecision {
                    outcome: ArbiterOutcome::Escalate {
                        reason: EscalationReason::RepeatedFailure,
                        confidence: 0.0,
                    },
                    context: None,
                    pending_summary: None,
                }
            }
        };

        // ── Build the response and commit ──────────────────────────────────
        let response = self
            .finish_turn(
                &session_id,
                &session,
                &request,
                user_message,
                decision,
                &signals,
                language,
                started,
            )
            .await?;

        Ok(response)
    }

    /// Streaming variant: text chunks, then the final response envelope.
    ///
    /// Confidence gating needs the full draft before the outcome is known,
    /// so chunk granularity degrades to the finished text when the
    /// underlying provider does not stream.
    pub fn handle_turn_stream(
        self: Arc<Self>,
        request: TurnRequest,
    ) -> mpsc::Receiver<TurnStreamEvent> {
        let (tx, rx) = mpsc::channel(16);
        let engine = self;

        tokio::spawn(async move {
            match engine.handle_turn(request).await {
                Ok(response) => {
                    let _ = tx
                        .send(TurnStreamEvent::Chunk { content: response.content.clone() })
                        .await;
                    let _ = tx.send(TurnStreamEvent::Completed { response }).await;
                }
                Err(e) => {
                    warn!(error = %e, "Streaming turn failed");
                    let _ = tx
                        .send(TurnStreamEvent::Error { message: user_facing_error(&e) })
                        .await;
                }
            }
        });

        rx
    }

    // ── Pipeline stages ───────────────────────────────────────────────────

    async fn run_pipeline(
        &self,
        session: &ConversationSession,
        request: &TurnRequest,
        query: &str,
        user_message: &Message,
        signals: &TurnSignals,
        language: Language,
    ) -> Result<TurnDecision> {
        // Retrieval failures propagate: answering ungrounded because the
        // backend is down is worse than failing the turn.
        let retrieval_started = Instant::now();
        let retrieved = self
            .retriever
            .search(query, self.config.retrieval.top_k_rerank, &ChunkFilters::default())
            .await?;

        self.events.publish(DomainEvent::RetrievalCompleted {
            session_id: session.id.0.clone(),
            chunks: retrieved.chunks.len(),
            reranking_applied: retrieved.reranking_applied,
            duration_ms: retrieval_started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });

        // Rolling-summary refresh. The summarizer sits behind the same
        // retry policy as generation; a failure here means the retry budget
        // is spent, so the turn is absorbed into an escalation outcome.
        let pending_summary = match self.refresh_summary(session).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Summarization failed after retries, escalating turn");
                return Ok(TurnDecision {
                    outcome: ArbiterOutcome::Escalate {
                        reason: EscalationReason::RepeatedFailure,
                        confidence: 0.0,
                    },
                    context: None,
                    pending_summary: None,
                });
            }
        };

        // Assemble against the refreshed view of the session.
        let mut view = session.clone();
        if let Some(summary) = &pending_summary {
            view.summary = Some(summary.clone());
        }

        let budget = TokenBudget::new(
            self.config.context.max_context_tokens,
            self.config.context.reserved_for_response,
        );
        let system_instructions = self.system_instructions(language);
        let context = self
            .assembler
            .assemble(
                &AssemblyInput {
                    system_instructions: &system_instructions,
                    retrieved: &retrieved,
                    session: &view,
                    profile: request.profile.as_ref(),
                    user_message: query,
                },
                budget,
            )
            .map_err(Error::from)?;

        debug!(
            used_tokens = context.used_tokens(),
            chunks = context.chunks_used.len(),
            "Context assembled"
        );

        let outcome = self.arbiter.decide(&context, user_message, signals).await;

        Ok(TurnDecision { outcome, context: Some(context), pending_summary })
    }

    async fn refresh_summary(
        &self,
        session: &ConversationSession,
    ) -> std::result::Result<Option<RollingSummary>, crabdesk_core::error::ProviderError> {
        let Some(span) = self.planner.plan(session) else {
            return Ok(None);
        };

        let mut messages: Vec<Message> = Vec::with_capacity(span.end - span.start + 1);
        if let Some(prior) = &session.summary {
            messages.push(Message::system(format!("Earlier summary: {}", prior.text)));
        }
        messages.extend_from_slice(&session.messages[span.start..span.end]);

        let output = self
            .summarizer
            .summarize(&messages, self.config.context.summary_max_tokens)
            .await?;
        let summary = SummaryPlanner::apply(&span, output);

        self.events.publish(DomainEvent::SummaryRefreshed {
            session_id: session.id.0.clone(),
            covers_messages: summary.covers_messages,
            timestamp: Utc::now(),
        });

        Ok(Some(summary))
    }

    /// Turn the arbitrated outcome into a response, deliver any ticket, and
    /// commit the turn.
    #[allow(clippy::too_many_arguments)]
    async fn finish_turn(
        &self,
        session_id: &SessionId,
        session: &ConversationSession,
        request: &TurnRequest,
        user_message: Message,
        decision: TurnDecision,
        signals: &TurnSignals,
        language: Language,
        started: Instant,
    ) -> Result<AgentResponse> {
        let message_id = Uuid::new_v4();

        // The grounding guard: a citation outside the assembled context is
        // an internal bug, converted to an escalation outcome, never shown
        // to the customer.
        let outcome = match (&decision.outcome, &decision.context) {
            (ArbiterOutcome::Respond { confidence, .. }, Some(context)) => {
                let citations = citations_from(&context.chunks_used);
                match verify_citations(&citations, context) {
                    Ok(()) => decision.outcome.clone(),
                    Err(e) => {
                        error!(error = %e, "Grounding violation caught before returning");
                        ArbiterOutcome::Escalate {
                            reason: EscalationReason::RepeatedFailure,
                            confidence: *confidence,
                        }
                    }
                }
            }
            _ => decision.outcome.clone(),
        };

        let mut response = AgentResponse {
            message_id,
            session_id: session_id.clone(),
            content: String::new(),
            confidence: 0.0,
            sources: vec![],
            suggested_actions: vec![],
            quick_replies: vec![],
            requires_followup: false,
            escalated: false,
            escalation_reason: None,
            detected_language: language,
            detected_intent: signals.intent,
            processing_time_ms: 0,
            model_used: String::new(),
            usage: None,
            timestamp: Utc::now(),
        };

        let final_status = match outcome {
            ArbiterOutcome::Respond { text, confidence, model, usage } => {
                let context = decision
                    .context
                    .as_ref()
                    .expect("Respond outcome always carries a context");
                response.content = text;
                response.confidence = confidence;
                response.sources = citations_from(&context.chunks_used);
                response.suggested_actions = analysis::suggested_actions(
                    signals.intent,
                    &self.config.business.support_email,
                );
                response.quick_replies = analysis::quick_replies(signals.intent);
                response.model_used = model;
                response.usage = usage;
                SessionStatus::Active
            }

            ArbiterOutcome::Clarify { question, confidence } => {
                response.content = question;
                response.confidence = confidence;
                response.requires_followup = true;
                SessionStatus::Active
            }

            ArbiterOutcome::Escalate { reason, confidence } => {
                let record = escalation::build_record(session, reason, &user_message.content);
                let ticket_id = match self.tickets.create_ticket(&record).await {
                    Ok(id) => Some(id),
                    Err(e) => {
                        // The handoff still stands; delivery is retried by
                        // the ticketing system's own reconciliation.
                        error!(error = %e, "Ticket delivery failed");
                        None
                    }
                };

                self.events.publish(DomainEvent::SessionEscalated {
                    session_id: session_id.0.clone(),
                    reason: reason.as_str().into(),
                    ticket_id,
                    timestamp: Utc::now(),
                });

                response.content = escalation::handoff_message(&self.config.business, reason);
                response.confidence = confidence;
                response.escalated = true;
                response.escalation_reason = Some(reason);
                SessionStatus::Escalated
            }
        };

        // ── All-or-nothing write-back ──────────────────────────────────────
        let mut assistant_message = Message::assistant(response.content.clone());
        assistant_message.id = message_id.to_string();
        assistant_message
            .metadata
            .insert("confidence".into(), serde_json::json!(response.confidence));
        if response.escalated {
            assistant_message.metadata.insert("escalated".into(), serde_json::json!(true));
        }

        self.sessions
            .append_turn(
                session_id,
                request.customer_id.as_deref(),
                user_message,
                assistant_message,
                TurnUpdate {
                    summary: decision.pending_summary,
                    status: Some(final_status),
                    language: Some(language),
                    intent: Some(signals.intent),
                    sentiment: Some(signals.sentiment),
                },
            )
            .await?;

        response.processing_time_ms = started.elapsed().as_millis() as u64;
        self.events.publish(DomainEvent::TurnCompleted {
            session_id: session_id.0.clone(),
            confidence: response.confidence,
            escalated: response.escalated,
            duration_ms: response.processing_time_ms,
            timestamp: Utc::now(),
        });

        info!(
            session_id = %session_id,
            confidence = response.confidence,
            escalated = response.escalated,
            duration_ms = response.processing_time_ms,
            "Turn completed"
        );

        Ok(response)
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    async fn acquire_session_lock(
        &self,
        id: &SessionId,
    ) -> Result<tokio::sync::OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(id.0.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        let wait = Duration::from_secs(self.config.arbiter.session_lock_wait_seconds);
        let waited = Instant::now();
        match tokio::time::timeout(wait, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(Error::SessionBusy {
                session_id: id.0.clone(),
                waited_ms: waited.elapsed().as_millis() as u64,
            }),
        }
    }

    fn system_instructions(&self, language: Language) -> String {
        let business = &self.config.business;
        let language_name = match language {
            Language::En => "English",
            Language::Zh => "Mandarin",
            Language::Ms => "Malay",
            Language::Ta => "Tamil",
        };
        let phone = business
            .support_phone
            .as_deref()
            .map(|p| format!(" or {p}"))
            .unwrap_or_default();

        format!(
            "You are the customer support assistant for {}. Answer using only the retrieved \
             knowledge provided in this context; when the answer is not there, say you are not \
             sure rather than guessing. Be concise and courteous.\n\
             Business hours: {}-{} {} on {}.\n\
             Support contact: {}{}.\n\
             Respond in {}.",
            business.name,
            business.hours_start,
            business.hours_end,
            business.timezone,
            business.days.replace(',', ", "),
            business.support_email,
            phone,
            language_name,
        )
    }

    /// Response for turns arriving after the session was handed to a human.
    fn acknowledgment_response(&self, session_id: &SessionId, started: Instant) -> AgentResponse {
        AgentResponse {
            message_id: Uuid::new_v4(),
            session_id: session_id.clone(),
            content: format!(
                "Our support team has taken over this conversation — a colleague will follow up \
                 during business hours ({}-{} {}).",
                self.config.business.hours_start,
                self.config.business.hours_end,
                self.config.business.timezone,
            ),
            confidence: 1.0,
            sources: vec![],
            suggested_actions: vec![],
            quick_replies: vec![],
            requires_followup: false,
            escalated: true,
            escalation_reason: None,
            detected_language: Language::default(),
            detected_intent: Default::default(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            model_used: String::new(),
            usage: None,
            timestamp: Utc::now(),
        }
    }
}

/// Customer-safe rendering of an internal error. Detail goes to the logs,
/// never to the end user.
pub fn user_facing_error(error: &Error) -> String {
    match error {
        Error::SessionBusy { .. } => {
            "We're still working on your previous message — please try again in a moment.".into()
        }
        _ => "Sorry, something went wrong on our side. Please try again shortly.".into(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
