//! Conversational request orchestration for Selah.
//!
//! Classifies each user message, selects generation parameters, budgets
//! the conversation window, and streams the reply from the upstream
//! completion service with timeouts, retries and cancellation.

pub mod ai_error;
pub mod cache;
pub mod context;
pub mod error;
pub mod intent;
pub mod memory;
pub mod orchestrator;
pub mod params;
pub mod persona;
pub mod reference;
pub mod state;
pub mod suggest;
pub mod transport;
pub mod types;

pub use ai_error::{
    calculate_retry_delay, classify_error, should_retry, AiError, ErrorKind, RawFailure,
};
pub use cache::{estimate_tokens, PromptCacheAnnotator};
pub use context::ContextOptimizer;
pub use error::ChatError;
pub use intent::IntentClassifier;
pub use memory::SessionMemory;
pub use orchestrator::{ChatOrchestrator, RequestHandle, RequestOutcome};
pub use params::ParameterSelector;
pub use persona::PersonaDetector;
pub use reference::ReferenceEnhancer;
pub use state::{validate_transition, RequestState};
pub use suggest::SuggestionGenerator;
pub use transport::{AnthropicTransport, CompletionTransport, DeltaStream, StreamDelta};
pub use types::{
    ChatMessage, CompletionMetadata, CompletionRequest, Credentials, OptimizedContext,
    RequestParameters, Role, SendRequest, StreamEvent, SuggestedPrompt, SystemInstruction,
};
