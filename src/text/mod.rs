//! Text processing: script classification, chunking and statistics.

pub mod script;
pub mod segmenter;
pub mod stats;

pub use script::{classify, is_cjk, is_cjk_dominant, Script};
pub use segmenter::{chunk_text, Chunk, DEFAULT_MAX_CHARS};
pub use stats::{char_count, word_count};
