use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SelahError};
use crate::types::{Lang, ModelTier};

/// Top-level configuration for the Selah request orchestrator.
///
/// Loaded from `~/.selah/config.toml` by default. Each section corresponds
/// to one stage of the request pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelahConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub suggestions: SuggestionConfig,
}

impl SelahConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SelahConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SelahError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Language used when a request does not name one.
    pub default_lang: Lang,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_lang: Lang::En,
        }
    }
}

/// Upstream completion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Messages endpoint accepting streamed completion requests.
    pub endpoint: String,
    /// Value sent in the `anthropic-version` header.
    pub api_version: String,
    /// Model identifiers per tier.
    #[serde(default)]
    pub models: ModelTable,
    /// Whole-request HTTP timeout in seconds (outer bound, independent of
    /// the per-intent connect timeout).
    pub http_timeout_secs: u64,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            api_version: "2023-06-01".to_string(),
            models: ModelTable::default(),
            http_timeout_secs: 300,
            api_key_env: "SELAH_API_KEY".to_string(),
        }
    }
}

/// Model identifier for each [`ModelTier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTable {
    pub fast: String,
    pub standard: String,
    pub premium: String,
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            fast: "claude-3-5-haiku-latest".to_string(),
            standard: "claude-sonnet-4-0".to_string(),
            premium: "claude-opus-4-0".to_string(),
        }
    }
}

impl ModelTable {
    /// Resolve the model identifier for a tier.
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Standard => &self.standard,
            ModelTier::Premium => &self.premium,
        }
    }
}

/// Retry policy for transient upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (so at most `max_retries + 1` attempts).
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Exponential growth factor applied per attempt.
    pub backoff_factor: f64,
    /// Upper bound on the un-jittered delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

/// Connect, stall, and input limits for the streaming orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Connect timeout for fast intents (greetings, acknowledgments).
    pub fast_timeout_ms: u64,
    /// Connect timeout for most intents.
    pub standard_timeout_ms: u64,
    /// Connect timeout for reasoning-heavy intents.
    pub extended_timeout_ms: u64,
    /// Maximum silence between tokens once streaming has begun. Kept above
    /// every connect timeout.
    pub stall_timeout_ms: u64,
    /// Abort and retry a stalled stream instead of only logging it.
    pub abort_on_stall: bool,
    /// Longest accepted user message, in characters.
    pub max_message_chars: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            fast_timeout_ms: 15_000,
            standard_timeout_ms: 30_000,
            extended_timeout_ms: 60_000,
            stall_timeout_ms: 90_000,
            abort_on_stall: true,
            max_message_chars: 4000,
        }
    }
}

impl StreamingConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

/// Context window budgeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Number of newest turns always sent verbatim.
    pub recent_count: usize,
    /// Total history size (characters) at which older turns are summarized.
    pub summarize_threshold_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            recent_count: 6,
            summarize_threshold_chars: 8000,
        }
    }
}

/// In-process session memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Ring-buffer capacity in turns.
    pub max_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { max_turns: 20 }
    }
}

/// Prompt cache annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Minimum estimated system prompt size (tokens) worth caching upstream.
    pub min_cacheable_tokens: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_cacheable_tokens: 1024,
        }
    }
}

/// Follow-up suggestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// Maximum number of suggestions attached to a completion.
    pub limit: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self { limit: 3 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = SelahConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.default_lang, Lang::En);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.streaming.stall_timeout_ms, 90_000);
        assert!(config.streaming.abort_on_stall);
        assert_eq!(config.context.recent_count, 6);
        assert_eq!(config.memory.max_turns, 20);
        assert_eq!(config.cache.min_cacheable_tokens, 1024);
        assert_eq!(config.suggestions.limit, 3);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"
default_lang = "es"

[upstream]
endpoint = "http://localhost:8080/v1/messages"

[upstream.models]
fast = "small-model"

[retry]
max_retries = 5
base_delay_ms = 250

[context]
recent_count = 4
summarize_threshold_chars = 2000
"#;
        let file = create_temp_config(content);
        let config = SelahConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.default_lang, Lang::Es);
        assert_eq!(config.upstream.endpoint, "http://localhost:8080/v1/messages");
        assert_eq!(config.upstream.models.fast, "small-model");
        // Unlisted model tiers keep their defaults
        assert_eq!(config.upstream.models.standard, "claude-sonnet-4-0");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert!((config.retry.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.context.recent_count, 4);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "warn"
"#;
        let file = create_temp_config(content);
        let config = SelahConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.streaming.standard_timeout_ms, 30_000);
        assert_eq!(config.memory.max_turns, 20);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = SelahConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.upstream.api_key_env, "SELAH_API_KEY");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        let result = SelahConfig::load(file.path());
        assert!(matches!(result, Err(SelahError::Config(_))));
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("dir").join("config.toml");

        let mut config = SelahConfig::default();
        config.retry.max_retries = 7;
        config.save(&path).unwrap();

        assert!(path.exists());
        let reloaded = SelahConfig::load(&path).unwrap();
        assert_eq!(reloaded.retry.max_retries, 7);
        assert_eq!(reloaded.upstream.models.premium, config.upstream.models.premium);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = SelahConfig::load(file.path()).unwrap();
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.context.summarize_threshold_chars, 8000);
    }

    #[test]
    fn test_model_table_lookup() {
        let models = ModelTable::default();
        assert_eq!(models.model_for(ModelTier::Fast), models.fast);
        assert_eq!(models.model_for(ModelTier::Standard), models.standard);
        assert_eq!(models.model_for(ModelTier::Premium), models.premium);
    }

    #[test]
    fn test_stall_timeout_duration() {
        let streaming = StreamingConfig::default();
        assert_eq!(streaming.stall_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn test_stall_timeout_exceeds_connect_timeouts() {
        let s = StreamingConfig::default();
        for connect in [s.fast_timeout_ms, s.standard_timeout_ms, s.extended_timeout_ms] {
            assert!(s.stall_timeout_ms > connect);
        }
    }
}
