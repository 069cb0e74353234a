//! In-process session memory.
//!
//! A bounded ring of recent turns, shared by reference with whatever owns a
//! conversation. Nothing here is ever written to disk.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use selah_core::{ConversationTurn, Intent, Persona};

use crate::error::ChatError;

/// Messages longer than this are never treated as follow-ups.
const FOLLOW_UP_MAX_CHARS: usize = 80;

const CONTINUATION_PHRASES: &[&str] = &[
    "tell me more",
    "more details",
    "what about",
    "and what",
    "what does that mean",
    "why is that",
    "can you elaborate",
    "explain that",
    "explain more",
    "go on",
    "continue",
    "cuéntame más",
    "dime más",
    "qué más",
    "y qué",
    "qué significa eso",
    "explica eso",
    "explícame más",
    "continúa",
];

const CONTINUATION_PREFIXES: &[&str] = &["and ", "but ", "also ", "so ", "y ", "pero ", "también "];

const REFERRING_WORDS: &[&str] = &[
    "it", "that", "this", "those", "these", "he", "she", "they", "him", "her", "them", "eso", "esto",
    "ese", "esa", "él", "ella", "ellos",
];

struct MemoryState {
    turns: VecDeque<ConversationTurn>,
    disposed: bool,
}

/// Bounded, non-persistent store of prior turns.
///
/// Safe for concurrent readers; writes are expected from one sequential
/// writer at a time (the orchestrator after a terminal state).
pub struct SessionMemory {
    id: Uuid,
    max_turns: usize,
    state: RwLock<MemoryState>,
}

impl SessionMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            max_turns: max_turns.max(1),
            state: RwLock::new(MemoryState {
                turns: VecDeque::with_capacity(max_turns.max(1)),
                disposed: false,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Record a user message with no labels attached.
    pub fn add_user_message(&self, text: impl Into<String>) -> Result<(), ChatError> {
        self.add_turn(ConversationTurn::user(text))
    }

    /// Record a user message with its resolved labels.
    pub fn add_labeled_user_message(
        &self,
        text: impl Into<String>,
        intent: Intent,
        persona: Persona,
    ) -> Result<(), ChatError> {
        let mut turn = ConversationTurn::user(text);
        turn.resolved_intent = Some(intent);
        turn.resolved_persona = Some(persona);
        self.add_turn(turn)
    }

    /// Append a turn, evicting the oldest when full.
    pub fn add_turn(&self, turn: ConversationTurn) -> Result<(), ChatError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.disposed {
            return Err(ChatError::MemoryDisposed);
        }
        while state.turns.len() >= self.max_turns {
            state.turns.pop_front();
        }
        state.turns.push_back(turn);
        Ok(())
    }

    /// Attach a reply to the most recent turn.
    ///
    /// Returns `false` when there is no turn awaiting a reply.
    pub fn add_assistant_response(&self, text: impl Into<String>) -> Result<bool, ChatError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.disposed {
            return Err(ChatError::MemoryDisposed);
        }
        match state.turns.back_mut() {
            Some(turn) if turn.assistant_text.is_none() => {
                turn.assistant_text = Some(text.into());
                Ok(true)
            }
            _ => {
                tracing::warn!(session = %self.id, "No pending turn for assistant response");
                Ok(false)
            }
        }
    }

    /// Snapshot of all retained turns, oldest first.
    pub fn get_conversation_history(&self) -> Vec<ConversationTurn> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.turns.iter().cloned().collect()
    }

    /// The last `n` user messages, oldest first.
    pub fn recent_user_messages(&self, n: usize) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let skip = state.turns.len().saturating_sub(n);
        state
            .turns
            .iter()
            .skip(skip)
            .map(|t| t.user_text.clone())
            .collect()
    }

    /// Intent resolved for the most recent labeled turn.
    pub fn last_intent(&self) -> Option<Intent> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.turns.iter().rev().find_map(|t| t.resolved_intent)
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_active_conversation(&self) -> bool {
        !self.is_empty()
    }

    pub fn clear_conversation(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.turns.clear();
        tracing::debug!(session = %self.id, "Conversation cleared");
    }

    /// Clear and refuse further writes.
    pub fn dispose(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.turns.clear();
        state.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).disposed
    }

    /// Whether `text` reads as a continuation of the active conversation.
    ///
    /// Short messages that use a continuation phrase, open with a
    /// conjunction, or lean on a referring pronoun count as follow-ups.
    pub fn is_follow_up(&self, text: &str) -> bool {
        if !self.has_active_conversation() {
            return false;
        }
        let lowered = text.trim().to_lowercase();
        if lowered.is_empty() || lowered.chars().count() > FOLLOW_UP_MAX_CHARS {
            return false;
        }

        if CONTINUATION_PHRASES.iter().any(|p| lowered.contains(p)) {
            return true;
        }
        if CONTINUATION_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
            return true;
        }
        lowered
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .any(|word| REFERRING_WORDS.contains(&word))
    }
}

impl Default for SessionMemory {
    fn default() -> Self {
        Self::new(selah_core::config::MemoryConfig::default().max_turns)
    }
}
