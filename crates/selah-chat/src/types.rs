//! Request, payload, and event types shared across the chat pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use selah_core::config::RetryConfig;
use selah_core::{ConversationTurn, Intent, Lang, ModelTier, Persona, Reference};

use crate::ai_error::AiError;

// =============================================================================
// Upstream payload
// =============================================================================

/// Speaker of a message sent upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the upstream request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// System instruction, optionally marked as cacheable by the upstream service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SystemInstruction {
    Plain(String),
    Cached(String),
}

impl SystemInstruction {
    pub fn text(&self) -> &str {
        match self {
            SystemInstruction::Plain(t) | SystemInstruction::Cached(t) => t,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, SystemInstruction::Cached(_))
    }

    /// Wire form: a plain string, or a single text block carrying an
    /// ephemeral cache marker.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SystemInstruction::Plain(text) => json!(text),
            SystemInstruction::Cached(text) => json!([{
                "type": "text",
                "text": text,
                "cache_control": { "type": "ephemeral" }
            }]),
        }
    }
}

/// Immutable per-request generation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RequestParameters {
    pub model_tier: ModelTier,
    /// 0.0 - 1.0
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

/// Fully assembled upstream request.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub system: SystemInstruction,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    /// JSON body for the messages endpoint.
    pub fn to_body(&self) -> serde_json::Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": self.stream,
            "system": self.system.to_json(),
            "messages": self.messages,
        })
    }
}

/// Caller credentials for the upstream service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Context
// =============================================================================

/// History bounded for the upstream context window.
///
/// `recent_turns` is always a suffix of the full history; `summary` is
/// present only when older turns were folded away.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizedContext {
    pub summary: Option<String>,
    pub recent_turns: Vec<ConversationTurn>,
    pub estimated_token_count: usize,
}

// =============================================================================
// Caller-facing API
// =============================================================================

/// A localized follow-up prompt offered after a completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedPrompt {
    pub text: String,
    pub lang: Lang,
}

/// Everything the caller needs to send one message.
#[derive(Clone, Debug)]
pub struct SendRequest {
    pub system_prompt: String,
    pub user_input: String,
    pub credentials: Credentials,
    /// Explicit history. When `None`, the orchestrator's session memory is
    /// read and updated.
    pub conversation_history: Option<Vec<ConversationTurn>>,
    pub retry: Option<RetryConfig>,
    pub lang: Option<Lang>,
}

impl SendRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        user_input: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_input: user_input.into(),
            credentials,
            conversation_history: None,
            retry: None,
            lang: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.conversation_history = Some(history);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = Some(lang);
        self
    }
}

/// Structured metadata delivered once with a successful completion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionMetadata {
    pub request_id: Uuid,
    pub intent: Intent,
    pub persona: Persona,
    pub model_tier: ModelTier,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub latency_ms: u64,
    pub references: Vec<Reference>,
    pub retry_count: u32,
    pub suggestions: Vec<SuggestedPrompt>,
    pub cache_annotated: bool,
    pub summarized: bool,
    pub estimated_context_tokens: usize,
}

/// Progress of one `send()` call, delivered in order on the request channel.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    IntentDetected(Intent),
    Started { request_id: Uuid },
    /// Incremental text, forwarded as soon as it arrives.
    Chunk(String),
    /// The previous attempt failed transiently; its partial text is void.
    Retry { attempt: u32, delay: Duration },
    Completed {
        text: String,
        metadata: Box<CompletionMetadata>,
    },
    Failed(AiError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Completed { .. } | StreamEvent::Failed(_))
    }
}
