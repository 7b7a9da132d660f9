use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::config::PiperConfig;
use super::model::PiperError;
use crate::text::script::is_cjk_punctuation;

/// Where to find espeak-ng.
///
/// Both fields fall back to the system install when `None`.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    fn command(&self) -> Command {
        let mut command = match &self.bin_path {
            Some(bin) => Command::new(bin),
            None => Command::new("espeak-ng"),
        };
        if let Some(data) = &self.data_path {
            command.arg(format!("--path={}", data.display()));
        }
        command
    }
}

/// Convert text to Piper model input ids via espeak-ng.
///
/// Clause punctuation is passed through as its own phoneme, so the model
/// sees pauses where the text has them. All clauses go to espeak-ng in one
/// call.
pub fn phonemize(
    text: &str,
    config: &PiperConfig,
    espeak: &EspeakConfig,
) -> Result<Vec<i64>, PiperError> {
    let clauses = split_clauses(text);
    if clauses.is_empty() {
        return Ok(Vec::new());
    }

    let spoken: Vec<&str> = clauses
        .iter()
        .map(|clause| clause.words.as_str())
        .filter(|words| !words.is_empty())
        .collect();
    let mut ipa = espeak_ipa(&spoken, &config.espeak.voice, espeak)?.into_iter();

    let mut phonemes = Vec::with_capacity(clauses.len());
    for clause in &clauses {
        let mut piece = if clause.words.is_empty() {
            String::new()
        } else {
            ipa.next().unwrap_or_default()
        };
        if let Some(mark) = clause.mark {
            piece.push(mark);
        }
        if !piece.is_empty() {
            phonemes.push(piece);
        }
    }

    Ok(config.phonemes_to_ids(phonemes.join(" ").chars()))
}

/// Words up to a pause, and the punctuation that closed them.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    words: String,
    mark: Option<char>,
}

fn split_clauses(text: &str) -> Vec<Clause> {
    let chars: Vec<char> = text.chars().collect();
    let mut clauses = Vec::new();
    let mut pending = String::new();

    for (i, &ch) in chars.iter().enumerate() {
        if let Some(mark) = pause_mark(ch).filter(|_| !joins_digits(&chars, i)) {
            clauses.push(Clause {
                words: collapse_whitespace(&pending),
                mark: Some(mark),
            });
            pending.clear();
        } else {
            pending.push(ch);
        }
    }

    let words = collapse_whitespace(&pending);
    if !words.is_empty() {
        clauses.push(Clause { words, mark: None });
    }
    clauses
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Punctuation Piper phoneme maps carry, with full-width forms folded to
/// ASCII.
fn pause_mark(ch: char) -> Option<char> {
    let ascii = match ch {
        '。' | '｡' => '.',
        '、' => ',',
        _ if is_cjk_punctuation(ch) => (ch as u32)
            .checked_sub(0xFEE0)
            .and_then(char::from_u32)
            .filter(char::is_ascii)?,
        _ => ch,
    };
    matches!(ascii, '.' | '!' | '?' | ',' | ';' | ':').then_some(ascii)
}

/// `.` or `,` inside a number such as `2.0` or `1,000`.
fn joins_digits(chars: &[char], i: usize) -> bool {
    matches!(chars[i], '.' | ',')
        && i > 0
        && chars[i - 1].is_ascii_digit()
        && chars.get(i + 1).is_some_and(char::is_ascii_digit)
}

/// IPA for each entry of `lines`, in order.
///
/// espeak-ng answers one line per input line; if it merges or splits lines
/// the entries are phonemized one call each instead.
fn espeak_ipa(
    lines: &[&str],
    voice: &str,
    espeak: &EspeakConfig,
) -> Result<Vec<String>, PiperError> {
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let output = run_espeak(&lines.join("\n"), voice, espeak)?;
    let answered: Vec<&str> = output.lines().map(str::trim).collect();
    if answered.len() == lines.len() {
        return Ok(answered.into_iter().map(clean_ipa).collect());
    }

    log::debug!(
        "espeak-ng returned {} lines for {}, phonemizing one at a time",
        answered.len(),
        lines.len()
    );
    lines
        .iter()
        .map(|line| run_espeak(line, voice, espeak).map(|ipa| clean_ipa(&ipa)))
        .collect()
}

/// Join multi-line output and drop espeak's word-joining underscores.
fn clean_ipa(ipa: &str) -> String {
    ipa.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('_', "")
}

fn run_espeak(input: &str, voice: &str, espeak: &EspeakConfig) -> Result<String, PiperError> {
    let mut child = espeak
        .command()
        .args(["--ipa", "--stdin", "-q", "-v", voice])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PiperError::EspeakNotFound,
            _ => PiperError::Io(e),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(stdin_payload(input).as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(PiperError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// espeak-ng under-processes a final line without a terminator.
fn stdin_payload(input: &str) -> String {
    let mut payload = input.to_owned();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }
    payload
}
