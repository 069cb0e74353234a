//! Conversation context budgeting.
//!
//! Keeps the newest turns verbatim and folds everything older into one
//! synthetic summary turn once the history grows past a size threshold.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use selah_core::config::ContextConfig;
use selah_core::ConversationTurn;

use crate::cache::estimate_tokens;
use crate::types::{ChatMessage, OptimizedContext, Role};

/// Most prayer requests carried into a summary.
const MAX_PRAYER_REQUESTS: usize = 5;

const SUMMARY_ACK: &str = "Understood. I'll keep this earlier context in mind.";

// =============================================================================
// Summary vocabularies
// =============================================================================

static TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    ("family", &["family", "mother", "father", "mom", "dad", "son", "daughter", "children", "familia", "madre", "padre", "hijo", "hija"]),
    ("marriage", &["marriage", "husband", "wife", "spouse", "matrimonio", "esposo", "esposa"]),
    ("health", &["health", "sick", "illness", "cancer", "surgery", "hospital", "salud", "enfermo", "enferma", "cirugía"]),
    ("grief", &["grief", "passed away", "funeral", "loss", "duelo", "falleció", "pérdida"]),
    ("anxiety", &["anxiety", "anxious", "worried", "fear", "ansiedad", "preocupado", "preocupada", "miedo"]),
    ("work", &["job", "work", "career", "boss", "trabajo", "empleo", "jefe"]),
    ("doubt", &["doubt", "question my faith", "not sure god", "duda", "dudas"]),
    ("prayer", &["pray", "prayer", "orar", "oración", "oracion"]),
    ("forgiveness", &["forgive", "forgiveness", "perdón", "perdonar"]),
    ("scripture", &["verse", "chapter", "bible", "scripture", "versículo", "capítulo", "biblia"]),
    ("relationships", &["friend", "relationship", "dating", "amigo", "amiga", "relación", "novio", "novia"]),
];

/// Independent crisis list for the summary tone.
static TONE_CRISIS: &[&str] = &[
    "suicide", "suicidal", "kill myself", "end my life", "want to die", "self-harm", "self harm",
    "suicidio", "matarme", "quitarme la vida", "quiero morir", "no quiero vivir",
];

static TONE_STRUGGLING: &[&str] = &[
    "struggling", "hard time", "depressed", "hopeless", "lonely", "afraid", "anxious", "overwhelmed",
    "hurting", "broken", "lost", "difícil", "deprimido", "deprimida", "solo", "sola", "triste", "miedo",
];

static TONE_POSITIVE: &[&str] = &[
    "thank", "grateful", "blessed", "joy", "happy", "praise", "peace", "gracias", "agradecido",
    "agradecida", "bendecido", "bendecida", "feliz", "alegría", "paz",
];

static PRAYER_REQUEST_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bpray(?:ing)?\s+for\s+([^.!?\n]{3,80})",
        r"(?i)\bneed\s+prayer\s+(?:about|for|with)\s+([^.!?\n]{3,80})",
        r"(?i)\bor(?:a|en|ar|ad)\s+por\s+([^.!?\n]{3,80})",
        r"(?i)\bnecesito\s+oraci[oó]n\s+(?:por|para)\s+([^.!?\n]{3,80})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid prayer-request regex"))
    .collect()
});

/// Coarse emotional tone of the summarized turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tone {
    Crisis,
    Struggling,
    Positive,
    Neutral,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Crisis => "crisis",
            Tone::Struggling => "struggling",
            Tone::Positive => "positive",
            Tone::Neutral => "neutral",
        }
    }
}

// =============================================================================
// ContextOptimizer
// =============================================================================

/// Bounds the history sent upstream.
#[derive(Debug, Clone)]
pub struct ContextOptimizer {
    /// Turns always kept verbatim.
    pub recent_count: usize,
    /// Total character length at or above which older turns are summarized.
    pub threshold_chars: usize,
}

impl ContextOptimizer {
    pub fn new(recent_count: usize, threshold_chars: usize) -> Self {
        Self {
            recent_count,
            threshold_chars,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.recent_count, config.summarize_threshold_chars)
    }

    pub fn optimize(&self, history: &[ConversationTurn]) -> OptimizedContext {
        let total_chars: usize = history.iter().map(ConversationTurn::char_len).sum();

        if history.len() <= self.recent_count || total_chars < self.threshold_chars {
            return OptimizedContext {
                summary: None,
                recent_turns: history.to_vec(),
                estimated_token_count: history.iter().map(turn_tokens).sum(),
            };
        }

        let split = history.len() - self.recent_count;
        let (older, recent) = history.split_at(split);
        let summary = summarize(older);
        tracing::debug!(
            summarized_turns = older.len(),
            kept_turns = recent.len(),
            total_chars,
            "Folded older turns into summary"
        );

        let estimated_token_count =
            estimate_tokens(&summary) + estimate_tokens(SUMMARY_ACK) + recent.iter().map(turn_tokens).sum::<usize>();

        OptimizedContext {
            summary: Some(summary),
            recent_turns: recent.to_vec(),
            estimated_token_count,
        }
    }

    /// Request-shaped message list for an optimized context.
    pub fn build_messages(&self, context: &OptimizedContext) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(context.recent_turns.len() * 2 + 2);

        if let Some(summary) = &context.summary {
            messages.push(ChatMessage::user(summary.clone()));
            messages.push(ChatMessage::assistant(SUMMARY_ACK));
        }

        for turn in &context.recent_turns {
            push_message(&mut messages, ChatMessage::user(turn.user_text.clone()));
            if let Some(reply) = &turn.assistant_text {
                push_message(&mut messages, ChatMessage::assistant(reply.clone()));
            }
        }
        messages
    }
}

impl Default for ContextOptimizer {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default())
    }
}

/// Append a message, merging it into the previous one when both share a role
/// so the list keeps alternating.
pub fn push_message(messages: &mut Vec<ChatMessage>, message: ChatMessage) {
    match messages.last_mut() {
        Some(last) if last.role == message.role => {
            last.content.push_str("\n\n");
            last.content.push_str(&message.content);
        }
        _ => messages.push(message),
    }
}

fn turn_tokens(turn: &ConversationTurn) -> usize {
    estimate_tokens(&turn.user_text) + turn.assistant_text.as_deref().map_or(0, estimate_tokens)
}

// =============================================================================
// Summarization
// =============================================================================

fn summarize(turns: &[ConversationTurn]) -> String {
    let user_text = turns
        .iter()
        .map(|t| t.user_text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let all_text = turns
        .iter()
        .flat_map(|t| std::iter::once(t.user_text.as_str()).chain(t.assistant_text.as_deref()))
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();

    let topics = detect_topics(&all_text);
    let requests = extract_prayer_requests(&user_text);
    // Crisis language anywhere in the prefix forces the tone; softer tones
    // read only what the user wrote.
    let tone = if detect_tone(&all_text) == Tone::Crisis {
        Tone::Crisis
    } else {
        detect_tone(&user_text.to_lowercase())
    };

    let mut summary = format!("Summary of {} earlier exchanges.", turns.len());
    if !topics.is_empty() {
        summary.push_str(&format!(" Topics discussed: {}.", topics.join(", ")));
    }
    if !requests.is_empty() {
        summary.push_str(&format!(" Prayer requests: {}.", requests.join("; ")));
    }
    summary.push_str(&format!(" Emotional tone: {}.", tone.as_str()));
    summary
}

fn detect_topics(lowered: &str) -> Vec<&'static str> {
    TOPIC_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(tag, _)| *tag)
        .collect()
}

/// Up to five distinct "pray for X" phrases, in order of appearance.
pub fn extract_prayer_requests(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut found: Vec<(usize, String)> = Vec::new();

    for re in PRAYER_REQUEST_PATTERNS.iter() {
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let phrase = m.as_str().trim().trim_end_matches(',').to_string();
            if phrase.is_empty() {
                continue;
            }
            if seen.insert(phrase.to_lowercase()) {
                found.push((m.start(), phrase));
            }
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    found
        .into_iter()
        .take(MAX_PRAYER_REQUESTS)
        .map(|(_, p)| p)
        .collect()
}

/// Priority: crisis > struggling > positive > neutral.
pub fn detect_tone(lowered: &str) -> Tone {
    let hit = |words: &[&str]| words.iter().any(|w| lowered.contains(w));
    if hit(TONE_CRISIS) {
        Tone::Crisis
    } else if hit(TONE_STRUGGLING) {
        Tone::Struggling
    } else if hit(TONE_POSITIVE) {
        Tone::Positive
    } else {
        Tone::Neutral
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn exchanges(n: usize, filler: usize) -> Vec<ConversationTurn> {
        (0..n)
            .map(|i| ConversationTurn::exchange(format!("question {i} {}", "q".repeat(filler)), format!("answer {i}")))
            .collect()
    }

    // ---- Pass-through ----

    #[test]
    fn test_short_history_unchanged() {
        let opt = ContextOptimizer::new(6, 8000);
        let history = exchanges(4, 5000);
        let ctx = opt.optimize(&history);
        assert!(ctx.summary.is_none());
        assert_eq!(ctx.recent_turns, history);
    }

    #[test]
    fn test_small_total_unchanged() {
        let opt = ContextOptimizer::new(6, 8000);
        let history = exchanges(30, 10);
        let ctx = opt.optimize(&history);
        assert!(ctx.summary.is_none());
        assert_eq!(ctx.recent_turns.len(), 30);
    }

    #[test]
    fn test_build_messages_pass_through_preserves_turns() {
        let opt = ContextOptimizer::new(6, 8000);
        let history = exchanges(3, 10);
        let messages = opt.build_messages(&opt.optimize(&history));
        assert_eq!(messages.len(), 6);
        for (i, turn) in history.iter().enumerate() {
            assert_eq!(messages[2 * i], ChatMessage::user(turn.user_text.clone()));
            assert_eq!(
                messages[2 * i + 1],
                ChatMessage::assistant(turn.assistant_text.clone().unwrap())
            );
        }
    }

    // ---- Summarization ----

    #[test]
    fn test_large_history_summarized() {
        let opt = ContextOptimizer::new(6, 8000);
        let history = exchanges(12, 1000);
        let ctx = opt.optimize(&history);
        assert!(ctx.summary.as_deref().is_some_and(|s| !s.is_empty()));
        assert_eq!(ctx.recent_turns.len(), 6);
        assert_eq!(ctx.recent_turns.as_slice(), &history[6..]);
    }

    #[test]
    fn test_summary_prepended_with_ack() {
        let opt = ContextOptimizer::new(2, 100);
        let history = exchanges(5, 50);
        let messages = opt.build_messages(&opt.optimize(&history));
        assert_eq!(messages[0].role, Role::User);
        assert!(messages[0].content.starts_with("Summary of 3 earlier exchanges."));
        assert_eq!(messages[1], ChatMessage::assistant(SUMMARY_ACK));
        assert_eq!(messages.len(), 2 + 4);
    }

    #[test]
    fn test_summary_contents() {
        let mut history = vec![
            ConversationTurn::exchange("Please pray for my mother's surgery.", "I will."),
            ConversationTurn::exchange("I'm struggling at work and my boss is harsh", "That sounds hard."),
            ConversationTurn::exchange("Can you pray for my mother's surgery?", "Of course."),
        ];
        history.extend(exchanges(2, 200));
        let ctx = ContextOptimizer::new(2, 100).optimize(&history);
        let summary = ctx.summary.unwrap();
        assert!(summary.contains("family"), "{summary}");
        assert!(summary.contains("health"), "{summary}");
        assert!(summary.contains("work"), "{summary}");
        assert!(summary.contains("my mother's surgery"), "{summary}");
        assert_eq!(summary.matches("my mother's surgery").count(), 1);
        assert!(summary.contains("Emotional tone: struggling"), "{summary}");
    }

    #[test]
    fn test_summary_tone_crisis_dominates() {
        let mut history = vec![ConversationTurn::exchange(
            "Thank you, I'm grateful, but sometimes I want to die",
            "Please reach out for help.",
        )];
        history.extend(exchanges(2, 200));
        let summary = ContextOptimizer::new(2, 100).optimize(&history).summary.unwrap();
        assert!(summary.contains("Emotional tone: crisis"));
    }

    #[test]
    fn test_summary_tone_crisis_in_reply_counts() {
        let mut history = vec![ConversationTurn::exchange(
            "My friend said something worrying",
            "If your friend talks about suicide, encourage them to call 988.",
        )];
        history.extend(exchanges(2, 200));
        let summary = ContextOptimizer::new(2, 100).optimize(&history).summary.unwrap();
        assert!(summary.contains("Emotional tone: crisis"), "{summary}");
    }

    #[test]
    fn test_summary_softer_tones_ignore_reply() {
        let mut history = vec![ConversationTurn::exchange(
            "What is a parable?",
            "A story that can help when you feel lonely or anxious.",
        )];
        history.extend(exchanges(2, 200));
        let summary = ContextOptimizer::new(2, 100).optimize(&history).summary.unwrap();
        assert!(!summary.contains("Emotional tone: struggling"), "{summary}");
    }

    // ---- Helpers ----

    #[test]
    fn test_prayer_requests_capped_and_deduplicated() {
        let text = "pray for Ana. pray for Luis. pray for ana. pray for Marta. \
                    need prayer about my exam. ora por mi hermano. pray for Tomas.";
        let requests = extract_prayer_requests(text);
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[0], "Ana");
        assert!(!requests.iter().any(|r| r == "ana"));
    }

    #[test]
    fn test_spanish_prayer_request() {
        let requests = extract_prayer_requests("Por favor necesito oración por mi familia");
        assert_eq!(requests, vec!["mi familia".to_string()]);
    }

    #[test]
    fn test_tone_priority() {
        assert_eq!(detect_tone("i feel hopeless but grateful"), Tone::Struggling);
        assert_eq!(detect_tone("so blessed today"), Tone::Positive);
        assert_eq!(detect_tone("what is a parable"), Tone::Neutral);
    }

    #[test]
    fn test_push_message_merges_same_role() {
        let mut messages = vec![ChatMessage::user("first")];
        push_message(&mut messages, ChatMessage::user("second"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "first\n\nsecond");
        push_message(&mut messages, ChatMessage::assistant("reply"));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_token_estimate_populated() {
        let ctx = ContextOptimizer::default().optimize(&exchanges(2, 40));
        assert!(ctx.estimated_token_count > 0);
    }
}
