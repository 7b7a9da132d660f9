use std::sync::LazyLock;

use regex::Regex;

use super::script::{is_closing, is_cjk_terminal, is_latin_terminal};

/// Character budget used when the caller does not pass one.
pub const DEFAULT_MAX_CHARS: usize = 500;

/// Two or more line breaks, allowing blank lines that hold only spaces or tabs.
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n(?:[ \t]*\r?\n)+").expect("valid paragraph regex"));

/// One ordered segment of a synthesis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence_index: usize,
    pub text: String,
}

impl Chunk {
    /// Number chunks in order.
    pub fn sequence(texts: Vec<String>) -> Vec<Chunk> {
        texts
            .into_iter()
            .enumerate()
            .map(|(sequence_index, text)| Chunk {
                sequence_index,
                text,
            })
            .collect()
    }
}

/// Split `text` into ordered chunks of at most `max_chars` characters.
///
/// Paragraph breaks always end a chunk. Within a paragraph, sentences are
/// packed greedily. A sentence longer than the budget (typically unpunctuated
/// CJK, where every character is a valid break) is cut at character
/// boundaries into budget-sized pieces.
///
/// Never returns an empty vector: empty or whitespace-only input comes back as
/// a single chunk holding the original string.
pub fn chunk_text(text: &str, max_chars: Option<usize>) -> Vec<String> {
    let max_chars = max_chars.unwrap_or(DEFAULT_MAX_CHARS).max(1);

    if text.trim().is_empty() {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    for paragraph in PARAGRAPH_BREAK.split(text) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        pack_paragraph(paragraph, max_chars, &mut chunks);
    }

    if chunks.is_empty() {
        vec![text.to_string()]
    } else {
        chunks
    }
}

/// Greedily pack one paragraph's sentences into `out`.
fn pack_paragraph(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut current = String::new();

    for sentence in split_sentences(paragraph) {
        let sentence_len = sentence.trim().chars().count();
        if sentence_len == 0 {
            continue;
        }

        if sentence_len > max_chars {
            flush(&mut current, out);
            let mut pieces = hard_split(sentence.trim(), max_chars);
            // The tail piece can still share a chunk with what follows.
            let tail = pieces.pop().unwrap_or_default();
            out.extend(pieces);
            current = tail;
            if sentence.ends_with(char::is_whitespace) {
                current.push(' ');
            }
            continue;
        }

        let candidate_len = current.chars().count() + sentence.trim_end().chars().count();
        if !current.trim().is_empty() && candidate_len > max_chars {
            flush(&mut current, out);
        }
        current.push_str(sentence);
    }

    flush(&mut current, out);
}

fn flush(current: &mut String, out: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

/// Cut `text` into pieces of at most `max_chars` characters.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect::<String>())
        .filter(|piece| !piece.trim().is_empty())
        .map(|piece| piece.trim().to_string())
        .collect()
}

/// Split a paragraph into sentence slices, each keeping its trailing whitespace.
///
/// Latin `. ! ?` end a sentence only when followed by whitespace; full-width
/// CJK terminators end one immediately. Closing quotes and brackets stay with
/// the sentence they close.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = paragraph.char_indices().collect();
    let byte_at = |i: usize| chars.get(i).map(|&(b, _)| b).unwrap_or(paragraph.len());

    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i].1;
        let mut end = None;

        if is_cjk_terminal(ch) {
            let mut j = i + 1;
            while j < chars.len() && (is_cjk_terminal(chars[j].1) || is_closing(chars[j].1)) {
                j += 1;
            }
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            end = Some(j);
        } else if is_latin_terminal(ch) {
            let mut j = i + 1;
            while j < chars.len() && (is_latin_terminal(chars[j].1) || is_closing(chars[j].1)) {
                j += 1;
            }
            if j < chars.len() && chars[j].1.is_whitespace() {
                while j < chars.len() && chars[j].1.is_whitespace() {
                    j += 1;
                }
                end = Some(j);
            }
        }

        match end {
            Some(j) => {
                let byte_end = byte_at(j);
                sentences.push(&paragraph[start..byte_end]);
                start = byte_end;
                i = j;
            }
            None => i += 1,
        }
    }

    if start < paragraph.len() {
        sentences.push(&paragraph[start..]);
    }
    sentences
}
