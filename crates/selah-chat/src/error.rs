//! Error types for the chat orchestrator.
//!
//! These cover rejected requests and misuse. Failures after a request is
//! accepted are reported on the event channel as [`crate::AiError`].

use selah_core::error::SelahError;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("missing API credentials")]
    MissingCredentials,
    #[error("no async runtime available to drive the request")]
    NoRuntime,
    #[error("session memory has been disposed")]
    MemoryDisposed,
    #[error("invalid request state transition: {0}")]
    InvalidTransition(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Core(#[from] SelahError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "message cannot be empty");
        assert_eq!(
            ChatError::MessageTooLong(4000).to_string(),
            "message exceeds maximum length of 4000 characters"
        );
        assert_eq!(ChatError::MissingCredentials.to_string(), "missing API credentials");
        assert_eq!(
            ChatError::Transport("tls handshake".to_string()).to_string(),
            "transport error: tls handshake"
        );
    }

    #[test]
    fn test_chat_error_from_selah_error() {
        let core = SelahError::Config("bad endpoint".to_string());
        let chat_err: ChatError = core.into();
        assert!(matches!(chat_err, ChatError::Core(_)));
        assert!(chat_err.to_string().contains("bad endpoint"));
    }

    #[test]
    fn test_message_too_long_large_value() {
        let msg = ChatError::MessageTooLong(usize::MAX).to_string();
        assert!(msg.contains(&usize::MAX.to_string()));
    }

    #[test]
    fn test_errors_implement_debug() {
        let dbg = format!("{:?}", ChatError::MemoryDisposed);
        assert!(dbg.contains("MemoryDisposed"));
    }
}
