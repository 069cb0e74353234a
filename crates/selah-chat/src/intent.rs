//! Intent classification.
//!
//! Order is fixed: crisis keywords, then short simple-message patterns,
//! then per-category keyword scoring, then `General`. Crisis detection is
//! never reachable after any other branch.

use regex::Regex;
use std::sync::LazyLock;

use selah_core::Intent;

// =============================================================================
// Keyword tables
// =============================================================================

/// Crisis substrings in both supported languages. Any hit returns `Crisis`.
static CRISIS_KEYWORDS: &[&str] = &[
    "kill myself",
    "killing myself",
    "suicide",
    "suicidal",
    "end my life",
    "end it all",
    "want to die",
    "wanna die",
    "better off dead",
    "no reason to live",
    "self harm",
    "self-harm",
    "hurt myself",
    "cut myself",
    "take my own life",
    "matarme",
    "suicidio",
    "suicidarme",
    "quitarme la vida",
    "quiero morir",
    "me quiero morir",
    "no quiero vivir",
    "acabar con mi vida",
    "hacerme daño",
    "autolesión",
    "autolesion",
];

/// Scored categories and their keyword substrings.
static CATEGORY_KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::Pastoral,
        &[
            "grief", "grieving", "lonely", "loneliness", "anxious", "anxiety", "worried",
            "struggling", "depressed", "marriage", "divorce", "forgive", "hurt", "afraid",
            "scared", "lost my", "passed away", "funeral", "addiction", "temptation",
            "broken", "my husband", "my wife", "duelo", "solo", "sola", "ansiedad",
            "preocupado", "preocupada", "matrimonio", "divorcio", "perdonar", "miedo",
            "falleció", "tentación", "adicción", "mi esposo", "mi esposa",
        ],
    ),
    (
        Intent::Scholarly,
        &[
            "greek", "hebrew", "aramaic", "exegesis", "hermeneutic", "manuscript",
            "translation", "historical", "author", "authorship", "original language",
            "septuagint", "canon", "theology", "theological", "commentary", "context of",
            "dead sea", "griego", "hebreo", "exégesis", "manuscrito", "traducción",
            "histórico", "autor", "teología", "comentario",
        ],
    ),
    (
        Intent::Devotional,
        &[
            "pray", "prayer", "devotional", "devotion", "worship", "praise", "meditate",
            "daily verse", "verse of the day", "blessing", "bless", "quiet time", "psalm",
            "orar", "oración", "oracion", "devocional", "adoración", "alabanza", "meditar",
            "bendición", "versículo del día", "salmo",
        ],
    ),
    (
        Intent::Apologetics,
        &[
            "evidence", "prove", "proof", "contradiction", "contradict", "science",
            "evolution", "atheist", "atheism", "why does god allow", "does god exist",
            "reliable", "historicity", "resurrection really", "problem of evil", "skeptic",
            "evidencia", "probar", "prueba", "contradicción", "ciencia", "evolución",
            "ateo", "ateísmo", "existe dios", "por qué dios permite", "escéptico",
        ],
    ),
    (
        Intent::Interfaith,
        &[
            "islam", "muslim", "quran", "koran", "buddhism", "buddhist", "hindu",
            "hinduism", "judaism", "jewish", "mormon", "other religions", "religions",
            "sikh", "tao", "musulmán", "musulman", "corán", "budismo", "budista",
            "hinduismo", "judaísmo", "judío", "otras religiones", "religiones",
        ],
    ),
];

// =============================================================================
// Simple-message patterns
// =============================================================================

/// Messages at or under this length may be `Simple`.
const SIMPLE_MAX_CHARS: usize = 20;
/// Relaxed length for "greeting + single token" messages.
const SIMPLE_RELAXED_MAX_CHARS: usize = 50;

const GREETING_ALTS: &str = r"hi|hello|hey|hiya|howdy|good morning|good afternoon|good evening|good night|thanks|thank you|thx|ty|ok|okay|cool|great|nice|amen|bye|goodbye|see you|hola|buenos días|buenos dias|buenas tardes|buenas noches|gracias|muchas gracias|vale|amén|adiós|adios|hasta luego|chao";

static SIMPLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        format!(r"^[¡¿!]*(?:{GREETING_ALTS})(?:\s+(?:so much|a lot|again|there|everyone|todos))?[\s!.?¡¿,]*$"),
        r"^[¡¿!]*(?:yes|no|yep|nope|sure|sí|si|claro|of course|got it|understood|entendido|perfecto|perfect)[\s!.?¡¿,]*$"
            .to_string(),
        r"^[¡¿!]*(?:hi|hello|hey|hola)[\s!.?,]*$".to_string(),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid simple-message regex"))
    .collect()
});

static GREETING_PLUS_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^[¡¿]*(?:{GREETING_ALTS})[\s,!.]+[\p{{L}}\p{{N}}'’]+[\s!.?,]*$"
    ))
    .expect("Invalid greeting regex")
});

// =============================================================================
// IntentClassifier
// =============================================================================

/// Keyword/pattern intent classifier. Total and deterministic.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a raw user message.
    pub fn classify(&self, text: &str) -> Intent {
        let normalized = text.trim().to_lowercase();

        if is_crisis(&normalized) {
            tracing::debug!("Crisis keyword matched");
            return Intent::Crisis;
        }

        if is_simple(&normalized) {
            return Intent::Simple;
        }

        let scores = category_scores(&normalized);
        let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
        if best == 0 {
            return Intent::General;
        }

        let mut leaders = scores.iter().filter(|(_, s)| *s == best);
        match (leaders.next(), leaders.next()) {
            (Some((intent, _)), None) => *intent,
            // Tie between categories
            _ => Intent::General,
        }
    }

    /// Per-category keyword hit counts, in table order. Exposed for diagnostics.
    pub fn scores(&self, text: &str) -> Vec<(Intent, usize)> {
        category_scores(&text.trim().to_lowercase())
    }
}

fn is_crisis(normalized: &str) -> bool {
    CRISIS_KEYWORDS.iter().any(|k| normalized.contains(k))
}

fn is_simple(normalized: &str) -> bool {
    let len = normalized.chars().count();
    if len == 0 {
        return false;
    }
    if len <= SIMPLE_MAX_CHARS && SIMPLE_PATTERNS.iter().any(|re| re.is_match(normalized)) {
        return true;
    }
    len <= SIMPLE_RELAXED_MAX_CHARS && GREETING_PLUS_TOKEN.is_match(normalized)
}

fn category_scores(normalized: &str) -> Vec<(Intent, usize)> {
    CATEGORY_KEYWORDS
        .iter()
        .map(|(intent, keywords)| {
            let hits = keywords.iter().filter(|k| normalized.contains(*k)).count();
            (*intent, hits)
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Intent {
        IntentClassifier::new().classify(text)
    }

    // ---- Crisis ----

    #[test]
    fn test_crisis_basic() {
        assert_eq!(classify("I want to kill myself"), Intent::Crisis);
    }

    #[test]
    fn test_crisis_spanish() {
        assert_eq!(classify("A veces pienso en quitarme la vida"), Intent::Crisis);
        assert_eq!(classify("ya no quiero vivir"), Intent::Crisis);
    }

    #[test]
    fn test_crisis_dominates_other_keywords() {
        let text = "Is there historical evidence in the Greek manuscripts? \
                    Honestly I am suicidal and the science of evolution does not help";
        assert_eq!(classify(text), Intent::Crisis);
    }

    #[test]
    fn test_crisis_dominates_short_greeting_shape() {
        assert_eq!(classify("hi suicide"), Intent::Crisis);
    }

    #[test]
    fn test_crisis_case_insensitive() {
        assert_eq!(classify("I WANT TO DIE"), Intent::Crisis);
    }

    #[test]
    fn test_crisis_regardless_of_length() {
        let long = format!("{} i have been thinking about self-harm", "word ".repeat(400));
        assert_eq!(classify(&long), Intent::Crisis);
    }

    // ---- Simple ----

    #[test]
    fn test_simple_greetings() {
        for text in ["Thank you!", "hi", "Hello!", "thanks", "Gracias", "hola", "Amen", "bye", "ok"] {
            assert_eq!(classify(text), Intent::Simple, "{text}");
        }
    }

    #[test]
    fn test_simple_spanish_inverted_punctuation() {
        for text in ["¡Gracias!", "¡Buenos días!", "¡Adiós!", "¿Hola?", "¡Sí!", "¡Hola pastor!"] {
            assert_eq!(classify(text), Intent::Simple, "{text}");
        }
    }

    #[test]
    fn test_simple_greeting_plus_token() {
        assert_eq!(classify("Hello pastor!"), Intent::Simple);
        assert_eq!(classify("gracias hermano"), Intent::Simple);
    }

    #[test]
    fn test_simple_relaxed_length_gate() {
        let long_name = "a".repeat(60);
        assert_ne!(classify(&format!("hello {long_name}")), Intent::Simple);
    }

    #[test]
    fn test_not_simple_when_sentence() {
        assert_ne!(classify("thanks, but why does god allow suffering?"), Intent::Simple);
    }

    // ---- Keyword scoring ----

    #[test]
    fn test_scholarly() {
        assert_eq!(
            classify("What does the Greek word mean in the original language?"),
            Intent::Scholarly
        );
    }

    #[test]
    fn test_pastoral() {
        assert_eq!(
            classify("I'm struggling with grief since my dad passed away"),
            Intent::Pastoral
        );
    }

    #[test]
    fn test_devotional() {
        assert_eq!(classify("Can you give me a short prayer for worship tonight"), Intent::Devotional);
    }

    #[test]
    fn test_apologetics() {
        assert_eq!(
            classify("Is there evidence for the resurrection, or is it a contradiction with science?"),
            Intent::Apologetics
        );
    }

    #[test]
    fn test_interfaith() {
        assert_eq!(classify("How is the Quran different from what Muslims believe about Jesus"), Intent::Interfaith);
    }

    #[test]
    fn test_spanish_keywords() {
        assert_eq!(classify("¿Qué dice el texto en hebreo y griego?"), Intent::Scholarly);
    }

    // ---- Defaults ----

    #[test]
    fn test_zero_score_is_general() {
        assert_eq!(classify("What should I cook for dinner tomorrow evening?"), Intent::General);
    }

    #[test]
    fn test_tie_is_general() {
        // One scholarly hit ("greek"), one interfaith hit ("buddhism")
        assert_eq!(classify("greek buddhism"), Intent::General);
    }

    #[test]
    fn test_empty_is_general() {
        assert_eq!(classify(""), Intent::General);
        assert_eq!(classify("   "), Intent::General);
    }

    // ---- Determinism ----

    #[test]
    fn test_deterministic() {
        let inputs = ["hello", "I want to die", "greek exegesis", "", "¿?"];
        for text in inputs {
            assert_eq!(classify(text), classify(text));
        }
    }

    #[test]
    fn test_scores_exposed_in_table_order() {
        let scores = IntentClassifier::new().scores("prayer and worship");
        assert_eq!(scores.len(), CATEGORY_KEYWORDS.len());
        let devotional = scores.iter().find(|(i, _)| *i == Intent::Devotional).unwrap();
        assert!(devotional.1 >= 2);
    }
}
