//! CLI argument definitions for the Selah binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use selah_core::Lang;

/// Selah: a Bible study companion that streams answers from a hosted model.
#[derive(Parser, Debug)]
#[command(name = "selah", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Response language (en, es).
    #[arg(long = "lang")]
    pub lang: Option<String>,

    /// Override the base system prompt.
    #[arg(short = 's', long = "system")]
    pub system: Option<String>,

    /// Message to send. Without one, messages are read from stdin line by line.
    pub message: Vec<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SELAH_CONFIG env var > platform default (~/.selah/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SELAH_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// `None` lets the orchestrator fall back to its configured default.
    pub fn resolve_lang(&self) -> Option<Lang> {
        self.lang.as_deref().map(Lang::from_tag)
    }

    /// The one-shot message, if any words were given.
    pub fn one_shot_message(&self) -> Option<String> {
        let joined = self.message.join(" ");
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".selah").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".selah").join("config.toml");
    }
    PathBuf::from("config.toml")
}
