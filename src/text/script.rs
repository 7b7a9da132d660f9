/// Unicode script families the segmenter and language detector care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Script {
    Latin,
    Han,
    Kana,
    Hangul,
    Cyrillic,
    Greek,
    Arabic,
    Hebrew,
    Devanagari,
    Thai,
    /// Digits, punctuation, whitespace, symbols and anything unlisted.
    Other,
}

/// Classify a character by Unicode block.
pub fn classify(ch: char) -> Script {
    match ch as u32 {
        0x41..=0x5A | 0x61..=0x7A => Script::Latin,
        0xC0..=0x24F if ch != '×' && ch != '÷' => Script::Latin,
        0x1E00..=0x1EFF => Script::Latin,
        0x370..=0x3FF => Script::Greek,
        0x400..=0x4FF => Script::Cyrillic,
        0x590..=0x5FF => Script::Hebrew,
        0x600..=0x6FF | 0x750..=0x77F => Script::Arabic,
        0x900..=0x97F => Script::Devanagari,
        0xE00..=0xE7F => Script::Thai,
        0x1100..=0x11FF | 0x3130..=0x318F | 0xAC00..=0xD7AF => Script::Hangul,
        0x3040..=0x30FF => Script::Kana,
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2A6DF => Script::Han,
        _ => Script::Other,
    }
}

/// True for CJK ideographs, kana and hangul.
pub fn is_cjk(ch: char) -> bool {
    matches!(classify(ch), Script::Han | Script::Kana | Script::Hangul)
}

/// CJK symbols and full-width punctuation blocks.
pub fn is_cjk_punctuation(ch: char) -> bool {
    matches!(ch as u32, 0x3000..=0x303F | 0xFF00..=0xFFEF)
}

/// Full-width sentence terminators.
pub fn is_cjk_terminal(ch: char) -> bool {
    matches!(ch, '。' | '！' | '？' | '．' | '｡')
}

/// Latin sentence terminators; only a boundary when followed by whitespace.
pub fn is_latin_terminal(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}

/// Closing quotes and brackets that stay attached to the preceding sentence.
pub fn is_closing(ch: char) -> bool {
    matches!(
        ch,
        '"' | '\'' | ')' | ']' | '}' | '\u{201d}' | '\u{2019}' | '」' | '』' | '）' | '】' | '》'
    )
}

/// True when CJK letters outnumber every other letter in `text`.
pub fn is_cjk_dominant(text: &str) -> bool {
    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), ch| {
        match classify(ch) {
            Script::Han | Script::Kana | Script::Hangul => (cjk + 1, other),
            Script::Other => (cjk, other),
            _ => (cjk, other + 1),
        }
    });
    cjk > other
}
