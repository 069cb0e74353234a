//! Chat orchestrator: turns one user message into a classified,
//! parameterized, retried, streamed upstream request.
//!
//! `send()` classifies and assembles the payload synchronously, then hands
//! the request to a spawned task that owns the timers, the retry loop and
//! the event channel for that one call.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use selah_core::config::{RetryConfig, StreamingConfig};
use selah_core::{ConversationTurn, Intent, Lang, Persona, Reference, SelahConfig};

use crate::ai_error::{calculate_retry_delay, classify_error, should_retry, AiError, RawFailure};
use crate::cache::PromptCacheAnnotator;
use crate::context::{push_message, ContextOptimizer};
use crate::error::ChatError;
use crate::intent::IntentClassifier;
use crate::memory::SessionMemory;
use crate::params::ParameterSelector;
use crate::persona::PersonaDetector;
use crate::reference::ReferenceEnhancer;
use crate::state::{RequestState, RequestStateMachine};
use crate::suggest::SuggestionGenerator;
use crate::transport::{AnthropicTransport, CompletionTransport, StreamDelta};
use crate::types::{
    ChatMessage, CompletionMetadata, CompletionRequest, Credentials, RequestParameters,
    SendRequest, StreamEvent,
};

// =============================================================================
// ChatOrchestrator
// =============================================================================

/// Central coordinator wiring classification, context and transport.
pub struct ChatOrchestrator {
    config: SelahConfig,
    transport: Arc<dyn CompletionTransport>,
    memory: Arc<SessionMemory>,
    intents: IntentClassifier,
    personas: PersonaDetector,
    references: ReferenceEnhancer,
    params: ParameterSelector,
    context: ContextOptimizer,
    cache: PromptCacheAnnotator,
    suggestions: SuggestionGenerator,
}

impl ChatOrchestrator {
    pub fn new(
        config: SelahConfig,
        transport: Arc<dyn CompletionTransport>,
        memory: Arc<SessionMemory>,
    ) -> Self {
        let context = ContextOptimizer::from_config(&config.context);
        let cache = PromptCacheAnnotator::new(config.cache.min_cacheable_tokens);
        Self {
            config,
            transport,
            memory,
            intents: IntentClassifier::new(),
            personas: PersonaDetector::new(),
            references: ReferenceEnhancer::new(),
            params: ParameterSelector::new(),
            context,
            cache,
            suggestions: SuggestionGenerator::new(),
        }
    }

    /// Orchestrator backed by the real upstream service and a fresh session.
    pub fn with_anthropic(config: SelahConfig) -> Result<Self, ChatError> {
        let transport = AnthropicTransport::new(&config.upstream)?;
        let memory = Arc::new(SessionMemory::new(config.memory.max_turns));
        Ok(Self::new(config, Arc::new(transport), memory))
    }

    pub fn memory(&self) -> &Arc<SessionMemory> {
        &self.memory
    }

    pub fn config(&self) -> &SelahConfig {
        &self.config
    }

    /// Accept a message and start streaming the reply.
    ///
    /// Input problems are returned here; everything after acceptance is
    /// reported on the returned handle.
    pub fn send(&self, req: SendRequest) -> Result<RequestHandle, ChatError> {
        let max_chars = self.config.streaming.max_message_chars;
        if req.user_input.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if req.user_input.chars().count() > max_chars {
            return Err(ChatError::MessageTooLong(max_chars));
        }
        if req.credentials.api_key.trim().is_empty() {
            return Err(ChatError::MissingCredentials);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ChatError::NoRuntime)?;

        let lang = req.lang.unwrap_or(self.config.general.default_lang);
        let uses_memory = req.conversation_history.is_none();

        // Classification
        let intent = self.resolve_intent(&req.user_input, uses_memory);
        let persona = self.personas.detect(&req.user_input);
        let references = self.references.detect_references(&req.user_input);
        let reference_directive = self.references.enhance_with_context(&req.user_input, lang);
        let params = self.params.select(intent, persona, &self.config.streaming);

        // Context
        let history = match req.conversation_history {
            Some(history) => history,
            None => self.memory.get_conversation_history(),
        };
        let optimized = self.context.optimize(&history);
        let mut messages = self.context.build_messages(&optimized);
        push_message(&mut messages, ChatMessage::user(req.user_input.clone()));

        // Payload
        let system_text = compose_system_prompt(
            &req.system_prompt,
            intent,
            persona,
            reference_directive.as_deref(),
            lang,
        );
        let system = self.cache.annotate(system_text);
        let request = CompletionRequest {
            model: self.config.upstream.models.model_for(params.model_tier).to_string(),
            temperature: params.temperature,
            max_tokens: params.max_output_tokens,
            stream: true,
            system,
            messages,
        };

        let request_id = Uuid::new_v4();
        tracing::info!(
            request_id = %request_id,
            intent = %intent,
            persona = %persona,
            model_tier = %params.model_tier,
            input_chars = req.user_input.chars().count(),
            history_turns = history.len(),
            summarized = optimized.summary.is_some(),
            "Request accepted"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let _ = tx.send(StreamEvent::IntentDetected(intent));

        let run = RequestRun {
            request_id,
            cache_annotated: request.system.is_cached(),
            request,
            credentials: req.credentials,
            transport: Arc::clone(&self.transport),
            memory: uses_memory.then(|| Arc::clone(&self.memory)),
            retry: req.retry.unwrap_or(self.config.retry),
            streaming: self.config.streaming.clone(),
            params,
            intent,
            persona,
            references,
            lang,
            turn: ConversationTurn {
                resolved_intent: Some(intent),
                resolved_persona: Some(persona),
                ..ConversationTurn::user(req.user_input.clone())
            },
            user_input: req.user_input,
            suggestions: self.suggestions,
            suggestion_limit: self.config.suggestions.limit,
            summarized: optimized.summary.is_some(),
            estimated_context_tokens: optimized.estimated_token_count,
            tx,
            cancel: cancel.clone(),
        };
        runtime.spawn(run.run());

        Ok(RequestHandle {
            request_id,
            intent,
            rx,
            cancel,
        })
    }

    /// Classify, carrying the previous intent into a plain follow-up.
    fn resolve_intent(&self, text: &str, uses_memory: bool) -> Intent {
        let intent = self.intents.classify(text);
        if intent != Intent::General || !uses_memory || !self.memory.is_follow_up(text) {
            return intent;
        }
        match self.memory.last_intent() {
            Some(previous) => {
                tracing::debug!(intent = %previous, "Follow-up inherits previous intent");
                previous
            }
            None => intent,
        }
    }
}

/// Caller prompt plus tone, safety, language and reference directives.
pub fn compose_system_prompt(
    base: &str,
    intent: Intent,
    persona: Persona,
    reference_directive: Option<&str>,
    lang: Lang,
) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(5);
    let base = base.trim();
    if !base.is_empty() {
        parts.push(base);
    }
    parts.push(persona_directive(persona));
    if intent == Intent::Crisis {
        parts.push(CRISIS_DIRECTIVE);
    }
    if lang == Lang::Es {
        parts.push("Respond in Spanish.");
    }
    if let Some(directive) = reference_directive {
        parts.push(directive);
    }
    parts.join("\n\n")
}

const CRISIS_DIRECTIVE: &str = "The user may be in crisis or at risk of self-harm. Respond briefly and \
with compassion. Encourage them to contact local emergency services or a crisis line right away \
(in the US, call or text 988). Do not debate, lecture or speculate.";

fn persona_directive(persona: Persona) -> &'static str {
    match persona {
        Persona::Child => "Speak simply and warmly, as to a young child. Use short sentences and familiar words.",
        Persona::Teen => "Speak to a teenager: be genuine and relatable, never condescending.",
        Persona::YoungAdult => "Speak to a young adult: be direct, honest and practical.",
        Persona::Adult => "Speak to an adult with warmth and clarity.",
        Persona::Senior => "Speak respectfully and patiently to an older adult, with clear and unhurried language.",
    }
}

// =============================================================================
// RequestHandle
// =============================================================================

/// How a request ended, as seen by [`RequestHandle::collect`].
#[derive(Debug)]
pub enum RequestOutcome {
    Completed {
        text: String,
        metadata: Box<CompletionMetadata>,
    },
    Failed(AiError),
    Cancelled,
}

/// Caller side of one `send()`: an ordered event stream plus cancellation.
///
/// Dropping the handle cancels the request.
pub struct RequestHandle {
    request_id: Uuid,
    intent: Intent,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    cancel: CancellationToken,
}

impl RequestHandle {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Next event, or `None` once the request is finished or cancelled.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        }?;
        // An event may have been queued just before cancel()
        if self.cancel.is_cancelled() {
            return None;
        }
        Some(event)
    }

    /// Idempotent. No event is delivered after this returns.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(request_id = %self.request_id, "Request cancelled by caller");
            self.cancel.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drain the stream and return the terminal outcome.
    pub async fn collect(mut self) -> RequestOutcome {
        while let Some(event) = self.next_event().await {
            match event {
                StreamEvent::Completed { text, metadata } => {
                    return RequestOutcome::Completed { text, metadata }
                }
                StreamEvent::Failed(err) => return RequestOutcome::Failed(err),
                _ => {}
            }
        }
        RequestOutcome::Cancelled
    }
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// RequestRun: the per-request task
// =============================================================================

/// State for one connection attempt; rebuilt on every retry.
#[derive(Debug)]
struct RequestAttempt {
    attempt_number: u32,
    started_at: Instant,
    accumulated_text: String,
    last_token_at: Option<Instant>,
}

impl RequestAttempt {
    fn new(attempt_number: u32) -> Self {
        Self {
            attempt_number,
            started_at: Instant::now(),
            accumulated_text: String::new(),
            last_token_at: None,
        }
    }

    fn has_tokens(&self) -> bool {
        self.last_token_at.is_some()
    }
}

enum AttemptOutcome {
    Completed(String),
    Failed(RawFailure),
    Cancelled,
}

struct RequestRun {
    request_id: Uuid,
    request: CompletionRequest,
    credentials: Credentials,
    transport: Arc<dyn CompletionTransport>,
    /// Present when the exchange should be recorded in session memory.
    memory: Option<Arc<SessionMemory>>,
    retry: RetryConfig,
    streaming: StreamingConfig,
    params: RequestParameters,
    intent: Intent,
    persona: Persona,
    references: Vec<Reference>,
    lang: Lang,
    user_input: String,
    /// User turn stamped at acceptance, labeled with the resolved intent and persona.
    turn: ConversationTurn,
    suggestions: SuggestionGenerator,
    suggestion_limit: usize,
    cache_annotated: bool,
    summarized: bool,
    estimated_context_tokens: usize,
    tx: mpsc::UnboundedSender<StreamEvent>,
    cancel: CancellationToken,
}

impl RequestRun {
    /// Deliver an event unless the request was cancelled or the caller
    /// went away. Returns `false` when delivery is no longer possible.
    fn emit(&self, event: StreamEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(event).is_ok()
    }

    async fn run(self) {
        let started = Instant::now();
        let mut sm = RequestStateMachine::new();
        let mut retries: u32 = 0;

        if !self.emit(StreamEvent::Started {
            request_id: self.request_id,
        }) {
            let _ = sm.transition(RequestState::Cancelled);
            return;
        }

        loop {
            let _ = sm.transition(RequestState::Connecting);

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => AttemptOutcome::Cancelled,
                outcome = self.run_attempt(retries + 1, &mut sm) => outcome,
            };

            let raw = match outcome {
                AttemptOutcome::Completed(text) => {
                    self.complete(text, retries, started, &mut sm);
                    return;
                }
                AttemptOutcome::Cancelled => {
                    let _ = sm.transition(RequestState::Cancelled);
                    tracing::debug!(request_id = %self.request_id, "Request stopped after cancellation");
                    return;
                }
                AttemptOutcome::Failed(raw) => raw,
            };

            let err = classify_error(&raw, self.lang);
            if !should_retry(&err, retries, &self.retry) {
                self.fail(err, retries, &mut sm);
                return;
            }

            let delay = calculate_retry_delay(retries, &self.retry)
                .max(err.retry_after.unwrap_or(Duration::ZERO));
            retries += 1;
            let _ = sm.transition(RequestState::Retrying);
            tracing::warn!(
                request_id = %self.request_id,
                kind = %err.kind,
                attempt = retries,
                delay_ms = delay.as_millis() as u64,
                "Retrying upstream request"
            );

            if !self.emit(StreamEvent::Retry {
                attempt: retries,
                delay,
            }) {
                let _ = sm.transition(RequestState::Cancelled);
                return;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let _ = sm.transition(RequestState::Cancelled);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One connection attempt: connect timer until the first token, then
    /// a stall timer re-armed on every token.
    async fn run_attempt(&self, attempt_number: u32, sm: &mut RequestStateMachine) -> AttemptOutcome {
        let mut attempt = RequestAttempt::new(attempt_number);
        let connect_deadline = attempt.started_at + self.params.timeout;
        let stall = self.streaming.stall_timeout();

        tracing::debug!(request_id = %self.request_id, attempt = attempt.attempt_number, "Connecting");

        let mut stream = match timeout_at(
            connect_deadline,
            self.transport.open_stream(&self.request, &self.credentials),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(raw)) => return AttemptOutcome::Failed(raw),
            Err(_) => {
                return AttemptOutcome::Failed(RawFailure::timeout("no response before connect deadline"))
            }
        };

        loop {
            let deadline = match attempt.last_token_at {
                Some(at) => at + stall,
                None => connect_deadline,
            };

            let item = match timeout_at(deadline, stream.next()).await {
                Ok(item) => item,
                Err(_) if !attempt.has_tokens() => {
                    return AttemptOutcome::Failed(RawFailure::timeout("no first token before connect deadline"));
                }
                Err(_) if self.streaming.abort_on_stall => {
                    tracing::warn!(
                        request_id = %self.request_id,
                        attempt = attempt.attempt_number,
                        received_chars = attempt.accumulated_text.len(),
                        "Stream stalled, aborting attempt"
                    );
                    return AttemptOutcome::Failed(RawFailure::timeout("stream stalled"));
                }
                Err(_) => {
                    tracing::warn!(
                        request_id = %self.request_id,
                        attempt = attempt.attempt_number,
                        "Stream stalled, still waiting"
                    );
                    stream.next().await
                }
            };

            match item {
                Some(Ok(StreamDelta::Text(text))) => {
                    if !attempt.has_tokens() {
                        let _ = sm.transition(RequestState::Streaming);
                    }
                    attempt.last_token_at = Some(Instant::now());
                    attempt.accumulated_text.push_str(&text);
                    if !self.emit(StreamEvent::Chunk(text)) {
                        return AttemptOutcome::Cancelled;
                    }
                }
                Some(Ok(StreamDelta::Stop)) => {
                    if !attempt.has_tokens() {
                        let _ = sm.transition(RequestState::Streaming);
                    }
                    return AttemptOutcome::Completed(attempt.accumulated_text);
                }
                Some(Err(raw)) => return AttemptOutcome::Failed(raw),
                None => {
                    return AttemptOutcome::Failed(
                        RawFailure::new("stream ended before message_stop").with_marker("network"),
                    )
                }
            }
        }
    }

    fn complete(&self, text: String, retries: u32, started: Instant, sm: &mut RequestStateMachine) {
        if self.cancel.is_cancelled() {
            let _ = sm.transition(RequestState::Cancelled);
            return;
        }
        let _ = sm.transition(RequestState::Completed);

        if let Some(memory) = &self.memory {
            // One write so concurrent requests cannot cross replies
            let turn = ConversationTurn {
                assistant_text: Some(text.clone()),
                ..self.turn.clone()
            };
            if let Err(e) = memory.add_turn(turn) {
                tracing::warn!(error = %e, "Could not record exchange in session memory");
            }
        }

        let suggestions = self.suggestions.suggest(
            self.intent,
            &self.user_input,
            &text,
            self.lang,
            self.suggestion_limit,
        );
        let latency_ms = started.elapsed().as_millis() as u64;
        let metadata = CompletionMetadata {
            request_id: self.request_id,
            intent: self.intent,
            persona: self.persona,
            model_tier: self.params.model_tier,
            model: self.request.model.clone(),
            temperature: self.request.temperature,
            max_tokens: self.request.max_tokens,
            latency_ms,
            references: self.references.clone(),
            retry_count: retries,
            suggestions,
            cache_annotated: self.cache_annotated,
            summarized: self.summarized,
            estimated_context_tokens: self.estimated_context_tokens,
        };

        tracing::info!(
            request_id = %self.request_id,
            latency_ms,
            retries,
            output_chars = text.chars().count(),
            "Request completed"
        );
        self.emit(StreamEvent::Completed {
            text,
            metadata: Box::new(metadata),
        });
    }

    fn fail(&self, err: AiError, retries: u32, sm: &mut RequestStateMachine) {
        if self.cancel.is_cancelled() {
            let _ = sm.transition(RequestState::Cancelled);
            return;
        }
        let _ = sm.transition(RequestState::Failed);

        if let Some(memory) = &self.memory {
            if let Err(e) = memory.add_turn(self.turn.clone()) {
                tracing::warn!(error = %e, "Could not record failed turn in session memory");
            }
        }

        tracing::error!(
            request_id = %self.request_id,
            kind = %err.kind,
            retries,
            cause = %err.cause,
            "Request failed"
        );
        self.emit(StreamEvent::Failed(err));
    }
}
