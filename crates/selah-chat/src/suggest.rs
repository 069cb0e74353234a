//! Follow-up prompt suggestions offered after a completion.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use selah_core::{Intent, Lang};

use crate::types::SuggestedPrompt;

/// A suggestion with both language renderings.
type Pair = (&'static str, &'static str);

fn intent_suggestions(intent: Intent) -> &'static [Pair] {
    match intent {
        Intent::Simple => &[
            ("What does the Bible say about gratitude?", "¿Qué dice la Biblia sobre la gratitud?"),
            ("Share a verse for today", "Comparte un versículo para hoy"),
        ],
        Intent::Pastoral => &[
            ("Can you pray with me about this?", "¿Puedes orar conmigo por esto?"),
            ("What verses bring comfort in hard times?", "¿Qué versículos consuelan en tiempos difíciles?"),
            ("How can I find peace right now?", "¿Cómo puedo encontrar paz ahora mismo?"),
        ],
        Intent::Scholarly => &[
            ("What is the historical context?", "¿Cuál es el contexto histórico?"),
            ("What do the original languages say?", "¿Qué dicen los idiomas originales?"),
            ("How have scholars interpreted this?", "¿Cómo lo han interpretado los estudiosos?"),
        ],
        Intent::Devotional => &[
            ("Give me a short prayer for today", "Dame una oración corta para hoy"),
            ("How can I apply this to my life?", "¿Cómo puedo aplicar esto a mi vida?"),
            ("Suggest a psalm for reflection", "Sugiéreme un salmo para reflexionar"),
        ],
        Intent::Apologetics => &[
            ("What is the strongest counter-argument?", "¿Cuál es el contraargumento más fuerte?"),
            ("What historical evidence supports this?", "¿Qué evidencia histórica respalda esto?"),
            ("How would you explain this to a skeptic?", "¿Cómo se lo explicarías a un escéptico?"),
        ],
        Intent::Interfaith => &[
            ("What do these traditions have in common?", "¿Qué tienen en común estas tradiciones?"),
            ("How can I have respectful conversations about faith?", "¿Cómo puedo hablar de fe con respeto?"),
        ],
        Intent::Crisis => &[
            ("Where can I find someone to talk to right now?", "¿Dónde puedo encontrar a alguien con quien hablar ahora?"),
            ("Can you pray with me?", "¿Puedes orar conmigo?"),
        ],
        Intent::General => &[
            ("Tell me more about this", "Cuéntame más sobre esto"),
            ("Share a related verse", "Comparte un versículo relacionado"),
        ],
    }
}

/// Topic keywords in the user's message and the suggestion they trigger.
static TOPIC_SUGGESTIONS: &[(&[&str], Pair)] = &[
    (
        &["anxiety", "anxious", "worried", "ansiedad", "preocupado", "preocupada"],
        ("What does the Bible say about worry?", "¿Qué dice la Biblia sobre la preocupación?"),
    ),
    (
        &["grief", "passed away", "loss", "duelo", "falleció", "pérdida"],
        ("How do I grieve with hope?", "¿Cómo vivo el duelo con esperanza?"),
    ),
    (
        &["forgive", "forgiveness", "perdonar", "perdón"],
        ("How do I forgive someone who hurt me?", "¿Cómo perdono a alguien que me lastimó?"),
    ),
    (
        &["marriage", "husband", "wife", "matrimonio", "esposo", "esposa"],
        ("What does Scripture teach about marriage?", "¿Qué enseña la Escritura sobre el matrimonio?"),
    ),
    (
        &["doubt", "doubts", "duda", "dudas"],
        ("Is it okay to have doubts?", "¿Está bien tener dudas?"),
    ),
];

const EXPLAIN_DEEPER: Pair = (
    "Explain this passage more deeply",
    "Explica este pasaje más a fondo",
);
const PRAY_ABOUT_THIS: Pair = ("Help me pray about this", "Ayúdame a orar por esto");

static CITATION_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\p{L}+\.?\s+\d{1,3}:\d{1,3}").expect("Invalid citation regex")
});

const PRAYER_LANGUAGE: &[&str] = &["pray", "prayer", "amen", "lord,", "orar", "oración", "amén", "señor,"];

/// Builds localized follow-up suggestions.
#[derive(Debug, Default, Clone, Copy)]
pub struct SuggestionGenerator;

impl SuggestionGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Response-triggered first, then topic-triggered, then the intent table.
    /// De-duplicated by exact text and cut to `limit`.
    pub fn suggest(
        &self,
        intent: Intent,
        user_text: &str,
        completed_text: &str,
        lang: Lang,
        limit: usize,
    ) -> Vec<SuggestedPrompt> {
        let mut candidates: Vec<Pair> = Vec::new();

        // Response content
        let response_lower = completed_text.to_lowercase();
        if CITATION_SHAPE.is_match(completed_text) {
            candidates.push(EXPLAIN_DEEPER);
        }
        if intent != Intent::Devotional && PRAYER_LANGUAGE.iter().any(|w| response_lower.contains(w)) {
            candidates.push(PRAY_ABOUT_THIS);
        }

        // Topic keywords in the user's message
        let user_lower = user_text.to_lowercase();
        for (keywords, pair) in TOPIC_SUGGESTIONS {
            if keywords.iter().any(|k| user_lower.contains(k)) {
                candidates.push(*pair);
            }
        }

        candidates.extend_from_slice(intent_suggestions(intent));

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .map(|(en, es)| match lang {
                Lang::En => en,
                Lang::Es => es,
            })
            .filter(|text| seen.insert(*text))
            .take(limit)
            .map(|text| SuggestedPrompt {
                text: text.to_string(),
                lang,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(prompts: &[SuggestedPrompt]) -> Vec<&str> {
        prompts.iter().map(|p| p.text.as_str()).collect()
    }

    #[test]
    fn test_limit_respected() {
        let generator = SuggestionGenerator::new();
        for limit in 0..=4 {
            let out = generator.suggest(Intent::Pastoral, "I feel anxious", "Pray with me. John 14:27", Lang::En, limit);
            assert!(out.len() <= limit);
        }
    }

    #[test]
    fn test_citation_triggers_explain_deeper() {
        let out = SuggestionGenerator::new().suggest(Intent::General, "hi", "See John 3:16.", Lang::En, 3);
        assert_eq!(out[0].text, EXPLAIN_DEEPER.0);
    }

    #[test]
    fn test_prayer_language_triggers_pray_about_this() {
        let out = SuggestionGenerator::new().suggest(Intent::Pastoral, "", "Let us pray together.", Lang::En, 3);
        assert!(texts(&out).contains(&PRAY_ABOUT_THIS.0));
    }

    #[test]
    fn test_topic_trigger() {
        let out = SuggestionGenerator::new().suggest(Intent::General, "I can't forgive my brother", "", Lang::En, 3);
        assert_eq!(out[0].text, "How do I forgive someone who hurt me?");
    }

    #[test]
    fn test_spanish_output() {
        let out = SuggestionGenerator::new().suggest(Intent::Scholarly, "", "", Lang::Es, 2);
        assert_eq!(texts(&out), vec!["¿Cuál es el contexto histórico?", "¿Qué dicen los idiomas originales?"]);
        assert!(out.iter().all(|p| p.lang == Lang::Es));
    }

    #[test]
    fn test_no_duplicates() {
        // Response and topic triggers plus the intent table never repeat text
        let out = SuggestionGenerator::new().suggest(
            Intent::Crisis,
            "I'm anxious",
            "Lord, we pray. Psalm 34:18",
            Lang::En,
            10,
        );
        let unique: HashSet<_> = out.iter().map(|p| p.text.clone()).collect();
        assert_eq!(unique.len(), out.len());
    }

    #[test]
    fn test_every_intent_has_suggestions() {
        for intent in Intent::ALL {
            assert!(!SuggestionGenerator::new().suggest(intent, "", "", Lang::En, 3).is_empty());
        }
    }
}
