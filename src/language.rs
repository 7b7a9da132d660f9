//! Heuristic language detection and catalog matching.
//!
//! Detection only looks at which Unicode script dominates the sample, so its
//! output is advisory: callers should offer it as a suggestion, never force it.

use std::collections::HashMap;

use crate::catalog::Language;
use crate::text::script::{classify, Script};

/// Samples shorter than this (in characters, after trimming) carry too little signal.
pub const MIN_SAMPLE_CHARS: usize = 10;

/// Share of script letters the dominant script must reach.
pub const CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Share of kana within Han+kana text that marks it as Japanese.
const KANA_SHARE_FOR_JAPANESE: f32 = 0.1;

/// Guess the locale code of `text` from its dominant script.
///
/// Returns `None` for empty or short samples and when no script clears
/// [`CONFIDENCE_THRESHOLD`].
pub fn detect_language(text: &str) -> Option<&'static str> {
    let sample = text.trim();
    if sample.chars().count() < MIN_SAMPLE_CHARS {
        return None;
    }

    let mut counts: HashMap<Script, usize> = HashMap::new();
    for ch in sample.chars() {
        let script = classify(ch);
        if script != Script::Other {
            *counts.entry(script).or_default() += 1;
        }
    }

    let total: usize = counts.values().sum();
    if total == 0 {
        return None;
    }

    // Han and kana share ideographs, so Japanese and Chinese compete as one group.
    let han = counts.remove(&Script::Han).unwrap_or(0);
    let kana = counts.remove(&Script::Kana).unwrap_or(0);

    let (script, count) = counts
        .into_iter()
        .chain(std::iter::once((Script::Han, han + kana)))
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))?;

    let confidence = count as f32 / total as f32;
    if confidence < CONFIDENCE_THRESHOLD {
        log::debug!("Language detection inconclusive ({script:?} at {confidence:.2})");
        return None;
    }

    let code = match script {
        Script::Latin => "en_US",
        Script::Han if kana as f32 / count as f32 >= KANA_SHARE_FOR_JAPANESE => "ja_JP",
        Script::Han => "zh_CN",
        Script::Kana => "ja_JP",
        Script::Hangul => "ko_KR",
        Script::Cyrillic => "ru_RU",
        Script::Greek => "el_GR",
        Script::Arabic => "ar_JO",
        Script::Hebrew => "he_IL",
        Script::Devanagari => "hi_IN",
        Script::Thai => "th_TH",
        Script::Other => return None,
    };
    Some(code)
}

/// Primary subtag of a locale code (`en_US` → `en`, `pt-BR` → `pt`).
pub fn family_of(code: &str) -> &str {
    code.split(['_', '-']).next().unwrap_or(code)
}

/// Match a detected locale against the supported languages.
///
/// Prefers an exact code match, then the first language (in the given order)
/// of the same family.
pub fn find_matching_language_code(
    detected: Option<&str>,
    languages: Option<&[Language]>,
) -> Option<String> {
    let (detected, languages) = (detected?, languages?);

    if let Some(exact) = languages.iter().find(|l| l.code == detected) {
        return Some(exact.code.clone());
    }

    let family = family_of(detected);
    languages
        .iter()
        .find(|l| l.family_subtag() == family)
        .map(|l| l.code.clone())
}
