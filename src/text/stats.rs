use super::script::is_cjk;

/// Count words, treating every CJK character as its own word.
///
/// Runs of non-CJK, non-whitespace characters count as one word each.
pub fn word_count(text: &str) -> usize {
    let mut count = 0;
    let mut in_word = false;

    for ch in text.chars() {
        if is_cjk(ch) {
            count += 1;
            in_word = false;
        } else if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            count += 1;
            in_word = true;
        }
    }

    count
}

/// Count Unicode scalar values, whitespace included.
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}
