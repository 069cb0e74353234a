//! Age-band persona detection.
//!
//! Four pattern groups are checked in fixed order (child, teen, young adult,
//! senior); the first match wins and no match yields `Adult`. Shares no
//! state with intent classification.

use regex::Regex;
use std::sync::LazyLock;

use selah_core::Persona;

struct PersonaPatterns {
    child: Vec<Regex>,
    teen: Vec<Regex>,
    young_adult: Vec<Regex>,
    senior: Vec<Regex>,
}

static PERSONA_PATTERNS: LazyLock<PersonaPatterns> = LazyLock::new(|| {
    let mk = |pats: &[&str]| -> Vec<Regex> {
        pats.iter()
            .map(|p| Regex::new(p).expect("Invalid persona regex"))
            .collect()
    };

    PersonaPatterns {
        child: mk(&[
            r"(?i)\bi['’]?m\s+(?:[5-9]|1[0-2])\s*(?:years?\s*old|yrs?\s*old|y/?o)?\b(?:[^\d]|$)",
            r"(?i)\bi\s+am\s+(?:[5-9]|1[0-2])\s*(?:years?\s*old)\b",
            r"(?i)\b(?:my\s+mommy|my\s+daddy|my\s+teacher\s+at\s+school|elementary\s+school|(?:first|second|third|fourth|fifth)\s+grade|recess)\b",
            r"(?i)\btengo\s+(?:[5-9]|1[0-2])\s+años\b",
            r"(?i)\b(?:soy\s+un\s+niño|soy\s+una\s+niña|mi\s+mami|mi\s+papi|la\s+primaria)\b",
        ]),
        teen: mk(&[
            r"(?i)\bi['’]?m\s+1[3-7]\b",
            r"(?i)\bi\s+am\s+1[3-7]\b",
            r"(?i)\b(?:high\s+school|middle\s+school|teenager|my\s+parents\s+(?:won['’]?t|don['’]?t|never)|youth\s+group|homework|prom)\b",
            r"(?i)\btengo\s+1[3-7]\s+años\b",
            r"(?i)\b(?:secundaria|preparatoria|adolescente|mis\s+papás\s+no|grupo\s+de\s+jóvenes)\b",
        ]),
        young_adult: mk(&[
            r"(?i)\bi['’]?m\s+(?:1[89]|2[0-5])\b",
            r"(?i)\bi\s+am\s+(?:1[89]|2[0-5])\b",
            r"(?i)\b(?:college|university|my\s+roommate|first\s+job|dorm|campus|grad\s+school|dating)\b",
            r"(?i)\btengo\s+(?:1[89]|2[0-5])\s+años\b",
            r"(?i)\b(?:universidad|mi\s+compañero\s+de\s+cuarto|primer\s+trabajo|facultad)\b",
        ]),
        senior: mk(&[
            r"(?i)\bi['’]?m\s+(?:6[5-9]|[7-9]\d|1[01]\d)\b",
            r"(?i)\bi\s+am\s+(?:6[5-9]|[7-9]\d|1[01]\d)\b",
            r"(?i)\b(?:my\s+grandchildren|my\s+grandkids|my\s+great-grandchildren|retired|retirement|nursing\s+home|widow(?:er)?)\b",
            r"(?i)\btengo\s+(?:6[5-9]|[7-9]\d|1[01]\d)\s+años\b",
            r"(?i)\b(?:mis\s+nietos|jubilado|jubilada|jubilación|viudo|viuda|asilo)\b",
        ]),
    }
});

/// Regex-based age-band detector. Total and deterministic.
#[derive(Debug, Default, Clone, Copy)]
pub struct PersonaDetector;

impl PersonaDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect the persona of a raw user message.
    pub fn detect(&self, text: &str) -> Persona {
        let pats = &*PERSONA_PATTERNS;
        let groups = [
            (Persona::Child, &pats.child),
            (Persona::Teen, &pats.teen),
            (Persona::YoungAdult, &pats.young_adult),
            (Persona::Senior, &pats.senior),
        ];

        for (persona, patterns) in groups {
            if patterns.iter().any(|re| re.is_match(text)) {
                return persona;
            }
        }
        Persona::Adult
    }
}
