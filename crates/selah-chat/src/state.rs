//! Request lifecycle state machine.
//!
//! - Idle -> Connecting (request accepted)
//! - Connecting -> Streaming (first token)
//! - Connecting | Streaming -> Retrying (transient failure, retries left)
//! - Retrying -> Connecting (backoff elapsed)
//! - Streaming -> Completed (stop event)
//! - Connecting | Streaming -> Failed (permanent failure or retries exhausted)
//! - any non-terminal -> Cancelled

use std::fmt;

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Idle,
    Connecting,
    Streaming,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestState::Idle => "Idle",
            RequestState::Connecting => "Connecting",
            RequestState::Streaming => "Streaming",
            RequestState::Retrying => "Retrying",
            RequestState::Completed => "Completed",
            RequestState::Failed => "Failed",
            RequestState::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Failed | RequestState::Cancelled
        )
    }

    pub fn can_transition_to(&self, target: &RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, target),
            (Idle, Connecting)
                | (Connecting, Streaming)
                | (Connecting, Retrying)
                | (Connecting, Failed)
                | (Streaming, Completed)
                | (Streaming, Retrying)
                | (Streaming, Failed)
                | (Retrying, Connecting)
                // Cancel
                | (Idle, Cancelled)
                | (Connecting, Cancelled)
                | (Streaming, Cancelled)
                | (Retrying, Cancelled)
        )
    }
}

/// Check a transition without applying it.
pub fn validate_transition(from: RequestState, to: RequestState) -> Result<(), ChatError> {
    if from.can_transition_to(&to) {
        Ok(())
    } else {
        Err(ChatError::InvalidTransition(format!("{} -> {}", from, to)))
    }
}

/// Owned by the single task driving one request.
#[derive(Debug)]
pub struct RequestStateMachine {
    state: RequestState,
}

impl Default for RequestStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestStateMachine {
    pub fn new() -> Self {
        Self {
            state: RequestState::Idle,
        }
    }

    pub fn current(&self) -> RequestState {
        self.state
    }

    /// Apply a transition. Invalid transitions are logged and leave the
    /// state untouched.
    pub fn transition(&mut self, target: RequestState) -> Result<(), ChatError> {
        match validate_transition(self.state, target) {
            Ok(()) => {
                tracing::debug!("Request state: {} -> {}", self.state, target);
                self.state = target;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected request state transition");
                Err(e)
            }
        }
    }
}
