//! Prompt cache annotation.

use crate::types::SystemInstruction;

/// Rough token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Marks system prompts large enough to be worth caching upstream.
#[derive(Debug, Clone, Copy)]
pub struct PromptCacheAnnotator {
    min_cacheable_tokens: usize,
}

impl PromptCacheAnnotator {
    pub fn new(min_cacheable_tokens: usize) -> Self {
        Self { min_cacheable_tokens }
    }

    pub fn should_cache(&self, prompt: &str) -> bool {
        estimate_tokens(prompt) >= self.min_cacheable_tokens
    }

    pub fn annotate(&self, prompt: impl Into<String>) -> SystemInstruction {
        let prompt = prompt.into();
        if self.should_cache(&prompt) {
            tracing::debug!(tokens = estimate_tokens(&prompt), "System prompt marked cacheable");
            SystemInstruction::Cached(prompt)
        } else {
            SystemInstruction::Plain(prompt)
        }
    }
}

impl Default for PromptCacheAnnotator {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // Counts chars, not bytes
        assert_eq!(estimate_tokens("ññññ"), 1);
    }

    #[test]
    fn test_short_prompt_plain() {
        let sys = PromptCacheAnnotator::default().annotate("You are helpful.");
        assert!(!sys.is_cached());
    }

    #[test]
    fn test_threshold_boundary() {
        let ann = PromptCacheAnnotator::new(10);
        assert!(!ann.annotate("x".repeat(36)).is_cached());
        assert!(ann.annotate("x".repeat(37)).is_cached());
        assert!(ann.annotate("x".repeat(40)).is_cached());
    }
}
