//! Rule-augmented language detection.
//!
//! `lingua` supplies confidence values for RU / KZ / ENG; a layer of
//! character-ratio and function-word rules corrects its known failure
//! modes on short banking tickets (Kazakh misread as Russian, English
//! over-detected on transliterated text).

use std::collections::HashSet;
use std::sync::LazyLock as Lazy;

use lingua::{Language as Lingua, LanguageDetector, LanguageDetectorBuilder};
use regex::Regex;
use tracing::debug;

use crate::domain::Language;

static DETECTOR: Lazy<LanguageDetector> = Lazy::new(|| {
    LanguageDetectorBuilder::from_languages(&[Lingua::Russian, Lingua::Kazakh, Lingua::English])
        .build()
});

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"http\S+").unwrap());
static REPLY_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"FW:|RE:").unwrap());

/// Letters that exist in Kazakh Cyrillic but not in Russian.
const KZ_CHARS: &str = "әғқңөұүһіӘҒҚҢӨҰҮҺІ";

static KZ_FUNCTION_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "және", "бұл", "мен", "бар", "деп", "үшін", "бір", "не", "да", "де", "ол", "біз",
        "сіз", "жоқ", "болды", "бола", "туралы", "дейін", "егер", "немесе", "себебі",
    ]
    .into_iter()
    .collect()
});

static ENGLISH_COMMON_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "i", "the", "is", "are", "you", "my", "me", "we", "it", "to", "in", "of", "and", "a",
        "an", "this", "that", "for", "not", "can", "do", "have", "please", "hello", "hi",
        "hey", "your", "with", "from", "been", "was", "am", "be", "but", "they", "there",
        "what", "how", "why", "when", "will", "no",
    ]
    .into_iter()
    .collect()
});

const HIGH_CONFIDENCE: f64 = 0.80;
const LOW_CONFIDENCE: f64 = 0.40;
const ENG_MIN_CONFIDENCE: f64 = 0.90;
const KZ_CHAR_NOISE_THRESHOLD: f64 = 0.03;
const KZ_CHAR_STRONG_THRESHOLD: f64 = 0.15;

fn preprocess(text: &str) -> String {
    let text = URL_RE.replace_all(text, "");
    let text = REPLY_MARKER_RE.replace_all(&text, "");
    text.trim().to_string()
}

/// Fraction of alphabetic characters drawn from the Kazakh-specific set.
fn kz_char_ratio(text: &str) -> f64 {
    let mut alpha = 0usize;
    let mut kz = 0usize;
    for c in text.chars() {
        if c.is_alphabetic() {
            alpha += 1;
            if KZ_CHARS.contains(c) {
                kz += 1;
            }
        }
    }
    if alpha == 0 {
        0.0
    } else {
        kz as f64 / alpha as f64
    }
}

fn has_kz_function_words(text: &str) -> bool {
    text.to_lowercase()
        .split_whitespace()
        .any(|w| KZ_FUNCTION_WORDS.contains(w))
}

fn has_english_words(text: &str) -> bool {
    text.to_lowercase()
        .split_whitespace()
        .any(|w| ENGLISH_COMMON_WORDS.contains(w))
}

fn to_domain(lang: Lingua) -> Language {
    match lang {
        Lingua::Russian => Language::Ru,
        Lingua::Kazakh => Language::Kz,
        Lingua::English => Language::Eng,
    }
}

/// Detect the ticket language. Deterministic; empty input → RU.
pub fn detect_language(text: &str) -> Language {
    if text.trim().is_empty() {
        return Language::Ru;
    }

    let text = preprocess(text);
    if text.is_empty() {
        return Language::Ru;
    }

    let kz_ratio = kz_char_ratio(&text);
    let has_kz_words = has_kz_function_words(&text);

    let confidences = DETECTOR.compute_language_confidence_values(text.as_str());
    let (top_lang, top_conf) = confidences
        .iter()
        .map(|(lang, conf)| (to_domain(*lang), *conf))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((Language::Ru, 0.0));

    let conf_of = |wanted: Language| {
        confidences
            .iter()
            .find(|(lang, _)| to_domain(*lang) == wanted)
            .map(|(_, conf)| *conf)
            .unwrap_or(0.0)
    };

    debug!(?top_lang, top_conf, kz_ratio, has_kz_words, "language confidences");

    if top_conf >= HIGH_CONFIDENCE {
        if top_lang == Language::Eng
            && (top_conf < ENG_MIN_CONFIDENCE || !has_english_words(&text))
        {
            return Language::Ru;
        }
        return top_lang;
    }

    if (LOW_CONFIDENCE..HIGH_CONFIDENCE).contains(&top_conf) {
        if kz_ratio >= KZ_CHAR_STRONG_THRESHOLD || has_kz_words {
            return Language::Kz;
        }
        if top_lang == Language::Kz
            && top_conf < 0.55
            && kz_ratio < KZ_CHAR_NOISE_THRESHOLD
            && !has_kz_words
        {
            // Weak KZ with no Kazakh signal at all is a lingua artifact;
            // fall back to whichever of ENG/RU it believes more.
            return if conf_of(Language::Eng) > conf_of(Language::Ru) {
                Language::Eng
            } else {
                Language::Ru
            };
        }
        return top_lang;
    }

    if kz_ratio >= KZ_CHAR_STRONG_THRESHOLD || has_kz_words {
        return Language::Kz;
    }

    Language::Ru
}
