//! Scripture reference detection and formatting.
//!
//! Book names from both supported languages are folded into one
//! alternation (longest first, so "1 John" wins over "John") and matched
//! against a `<book> <chapter>:<verse>(-<verse_end>)?` shape.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use selah_core::{Lang, Reference};

/// (canonical id, English display, Spanish display, extra aliases).
static BOOKS: &[(&str, &str, &str, &[&str])] = &[
    ("GEN", "Genesis", "Génesis", &["gen", "genesis"]),
    ("EXO", "Exodus", "Éxodo", &["exodo"]),
    ("LEV", "Leviticus", "Levítico", &["levitico"]),
    ("NUM", "Numbers", "Números", &["numeros"]),
    ("DEU", "Deuteronomy", "Deuteronomio", &[]),
    ("JOS", "Joshua", "Josué", &["josue"]),
    ("JDG", "Judges", "Jueces", &[]),
    ("RUT", "Ruth", "Rut", &[]),
    ("1SA", "1 Samuel", "1 Samuel", &[]),
    ("2SA", "2 Samuel", "2 Samuel", &[]),
    ("1KI", "1 Kings", "1 Reyes", &[]),
    ("2KI", "2 Kings", "2 Reyes", &[]),
    ("1CH", "1 Chronicles", "1 Crónicas", &["1 cronicas"]),
    ("2CH", "2 Chronicles", "2 Crónicas", &["2 cronicas"]),
    ("EZR", "Ezra", "Esdras", &[]),
    ("NEH", "Nehemiah", "Nehemías", &["nehemias"]),
    ("EST", "Esther", "Ester", &[]),
    ("JOB", "Job", "Job", &[]),
    ("PSA", "Psalms", "Salmos", &["psalm", "ps", "salmo"]),
    ("PRO", "Proverbs", "Proverbios", &["prov"]),
    ("ECC", "Ecclesiastes", "Eclesiastés", &["eclesiastes"]),
    ("SNG", "Song of Songs", "Cantares", &["song of solomon", "cantar de los cantares"]),
    ("ISA", "Isaiah", "Isaías", &["isaias"]),
    ("JER", "Jeremiah", "Jeremías", &["jeremias"]),
    ("LAM", "Lamentations", "Lamentaciones", &[]),
    ("EZK", "Ezekiel", "Ezequiel", &[]),
    ("DAN", "Daniel", "Daniel", &[]),
    ("HOS", "Hosea", "Oseas", &[]),
    ("JOL", "Joel", "Joel", &[]),
    ("AMO", "Amos", "Amós", &["amos"]),
    ("OBA", "Obadiah", "Abdías", &["abdias"]),
    ("JON", "Jonah", "Jonás", &["jonas"]),
    ("MIC", "Micah", "Miqueas", &[]),
    ("NAM", "Nahum", "Nahúm", &["nahum"]),
    ("HAB", "Habakkuk", "Habacuc", &[]),
    ("ZEP", "Zephaniah", "Sofonías", &["sofonias"]),
    ("HAG", "Haggai", "Hageo", &[]),
    ("ZEC", "Zechariah", "Zacarías", &["zacarias"]),
    ("MAL", "Malachi", "Malaquías", &["malaquias"]),
    ("MAT", "Matthew", "Mateo", &["matt"]),
    ("MRK", "Mark", "Marcos", &[]),
    ("LUK", "Luke", "Lucas", &[]),
    ("JHN", "John", "Juan", &[]),
    ("ACT", "Acts", "Hechos", &[]),
    ("ROM", "Romans", "Romanos", &["rom"]),
    ("1CO", "1 Corinthians", "1 Corintios", &["1 cor"]),
    ("2CO", "2 Corinthians", "2 Corintios", &["2 cor"]),
    ("GAL", "Galatians", "Gálatas", &["galatas"]),
    ("EPH", "Ephesians", "Efesios", &["eph"]),
    ("PHP", "Philippians", "Filipenses", &["phil"]),
    ("COL", "Colossians", "Colosenses", &[]),
    ("1TH", "1 Thessalonians", "1 Tesalonicenses", &[]),
    ("2TH", "2 Thessalonians", "2 Tesalonicenses", &[]),
    ("1TI", "1 Timothy", "1 Timoteo", &[]),
    ("2TI", "2 Timothy", "2 Timoteo", &[]),
    ("TIT", "Titus", "Tito", &[]),
    ("PHM", "Philemon", "Filemón", &["filemon"]),
    ("HEB", "Hebrews", "Hebreos", &["heb"]),
    ("JAS", "James", "Santiago", &[]),
    ("1PE", "1 Peter", "1 Pedro", &[]),
    ("2PE", "2 Peter", "2 Pedro", &[]),
    ("1JN", "1 John", "1 Juan", &[]),
    ("2JN", "2 John", "2 Juan", &[]),
    ("3JN", "3 John", "3 Juan", &[]),
    ("JUD", "Jude", "Judas", &[]),
    ("REV", "Revelation", "Apocalipsis", &["revelations", "rev"]),
];

/// Lowercased book name (any language or alias) to canonical id.
static NAME_TO_ID: LazyLock<HashMap<String, &'static str>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for (id, en, es, aliases) in BOOKS {
        map.insert(en.to_lowercase(), *id);
        map.insert(es.to_lowercase(), *id);
        for alias in *aliases {
            map.insert(alias.to_lowercase(), *id);
        }
    }
    map
});

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let mut names: Vec<&String> = NAME_TO_ID.keys().collect();
    // Longest first so numbered books and multi-word names win
    names.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    let alts: Vec<String> = names
        .iter()
        .map(|n| regex::escape(n).replace(r"\ ", r"\s+").replace(' ', r"\s+"))
        .collect();
    Regex::new(&format!(
        r"(?i)\b({})\.?\s+(\d{{1,3}}):(\d{{1,3}})(?:\s*[-–]\s*(\d{{1,3}}))?\b",
        alts.join("|")
    ))
    .expect("Invalid reference regex")
});

/// Detects and renders canonical scripture references.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceEnhancer;

impl ReferenceEnhancer {
    pub fn new() -> Self {
        Self
    }

    /// All distinct references in `text`, in order of first appearance.
    pub fn detect_references(&self, text: &str) -> Vec<Reference> {
        let mut seen = HashSet::new();
        let mut refs = Vec::new();

        for caps in REFERENCE_RE.captures_iter(text) {
            let (Some(whole), Some(book)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let key = normalize_book(book.as_str());
            let Some(id) = NAME_TO_ID.get(&key) else {
                continue;
            };
            let chapter = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
            let verse_start = caps.get(3).and_then(|m| m.as_str().parse::<u32>().ok());
            let (Some(chapter), Some(verse_start)) = (chapter, verse_start) else {
                continue;
            };
            let verse_end = caps
                .get(4)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .filter(|end| *end > verse_start);

            if seen.insert((*id, chapter, verse_start, verse_end)) {
                refs.push(Reference {
                    book_canonical_id: (*id).to_string(),
                    chapter,
                    verse_start,
                    verse_end,
                    raw_matched_text: whole.as_str().to_string(),
                });
            }
        }

        refs
    }

    /// Display string for a reference in the requested language.
    ///
    /// Unknown canonical ids fall back to the book text that was matched.
    pub fn format_reference(&self, reference: &Reference, lang: Lang) -> String {
        let book = BOOKS
            .iter()
            .find(|(id, ..)| *id == reference.book_canonical_id)
            .map(|(_, en, es, _)| match lang {
                Lang::En => (*en).to_string(),
                Lang::Es => (*es).to_string(),
            })
            .unwrap_or_else(|| raw_book_text(&reference.raw_matched_text));

        match reference.verse_end {
            Some(end) => format!("{} {}:{}-{}", book, reference.chapter, reference.verse_start, end),
            None => format!("{} {}:{}", book, reference.chapter, reference.verse_start),
        }
    }

    /// A short directive naming every detected reference, or `None`.
    pub fn enhance_with_context(&self, text: &str, lang: Lang) -> Option<String> {
        let refs = self.detect_references(text);
        if refs.is_empty() {
            return None;
        }
        let listed = refs
            .iter()
            .map(|r| self.format_reference(r, lang))
            .collect::<Vec<_>>()
            .join(", ");

        Some(match lang {
            Lang::En => format!(
                "The user referenced: {}. Quote these passages accurately and explain them in context.",
                listed
            ),
            Lang::Es => format!(
                "El usuario citó: {}. Cita estos pasajes con precisión y explícalos en su contexto.",
                listed
            ),
        })
    }
}

fn normalize_book(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Everything before the chapter number in a matched reference.
fn raw_book_text(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.rfind(char::is_whitespace) {
        Some(idx) => trimmed[..idx].trim_end_matches('.').trim().to_string(),
        None => trimmed.to_string(),
    }
}
