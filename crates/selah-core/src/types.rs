use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Conversational purpose of one user message.
///
/// `Crisis` is a safety override: once matched, no other classification runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Greeting, acknowledgment, farewell.
    Simple,
    /// Personal struggle, grief, relationships.
    Pastoral,
    /// Languages, history, exegesis.
    Scholarly,
    /// Prayer, worship, daily devotion.
    Devotional,
    /// Defending or questioning the faith.
    Apologetics,
    #[default]
    General,
    /// Other religions and traditions.
    Interfaith,
    /// Self-harm or suicide language.
    Crisis,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::Simple,
        Intent::Pastoral,
        Intent::Scholarly,
        Intent::Devotional,
        Intent::Apologetics,
        Intent::General,
        Intent::Interfaith,
        Intent::Crisis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Simple => "simple",
            Intent::Pastoral => "pastoral",
            Intent::Scholarly => "scholarly",
            Intent::Devotional => "devotional",
            Intent::Apologetics => "apologetics",
            Intent::General => "general",
            Intent::Interfaith => "interfaith",
            Intent::Crisis => "crisis",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age-band tone category. Orthogonal to [`Intent`]; never used for safety.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Child,
    Teen,
    YoungAdult,
    #[default]
    Adult,
    Senior,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Child => "child",
            Persona::Teen => "teen",
            Persona::YoungAdult => "young_adult",
            Persona::Adult => "adult",
            Persona::Senior => "senior",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported input/output languages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lang {
    #[default]
    En,
    Es,
}

impl Lang {
    /// Parse a language tag such as `"es"`, `"ES"` or `"es-MX"`.
    ///
    /// Unknown tags resolve to English.
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "es" => Lang::Es,
            _ => Lang::En,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Es => "es",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream model tier. Resolved to a concrete model id through config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Lowest latency, short replies.
    Fast,
    /// Most reliable general-purpose tier.
    Standard,
    /// Deep reasoning.
    Premium,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelTier::Fast => "fast",
            ModelTier::Standard => "standard",
            ModelTier::Premium => "premium",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Structs
// =============================================================================

/// One user message and, once received, the assistant reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_text: String,
    pub assistant_text: Option<String>,
    /// Epoch milliseconds at which the user message was recorded.
    pub timestamp: i64,
    pub resolved_intent: Option<Intent>,
    pub resolved_persona: Option<Persona>,
}

impl ConversationTurn {
    /// A user-only turn stamped with the current time.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            user_text: text.into(),
            assistant_text: None,
            timestamp: Utc::now().timestamp_millis(),
            resolved_intent: None,
            resolved_persona: None,
        }
    }

    /// A complete exchange stamped with the current time.
    pub fn exchange(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            assistant_text: Some(assistant.into()),
            ..Self::user(user)
        }
    }

    /// Character count of both sides of the turn.
    pub fn char_len(&self) -> usize {
        self.user_text.chars().count()
            + self
                .assistant_text
                .as_deref()
                .map_or(0, |t| t.chars().count())
    }
}

/// A canonical scripture citation detected in free text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Language-independent book id (e.g. `"JHN"`).
    pub book_canonical_id: String,
    pub chapter: u32,
    pub verse_start: u32,
    pub verse_end: Option<u32>,
    /// The exact text matched in the input, e.g. `"Juan 3:16"`.
    pub raw_matched_text: String,
}
