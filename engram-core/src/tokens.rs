//! Token accounting and boundary-aware truncation.
//!
//! All budgets are measured with the `cl100k_base` encoding. Truncation is
//! never a hard byte slice: every reduced text either fits its budget
//! unchanged or carries an explicit marker.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// Marker appended by [`smart_end`].
pub const END_MARKER: &str = " [...]";
/// Marker inserted by [`first_last`].
pub const MIDDLE_MARKER: &str = "[... truncated middle ...]";
/// Collection-wide ceiling applied to otherwise-untruncated types.
pub const COLLECTION_TOKEN_CEILING: usize = 8192;

#[allow(clippy::expect_used)]
fn bpe() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| {
        tiktoken_rs::cl100k_base().expect("cl100k_base tables ship with the binary")
    })
}

/// Count tokens in `text` under `cl100k_base`.
#[must_use]
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    bpe().encode_ordinary(text).len()
}

/// Decode the first `n` tokens of `tokens` back to text.
///
/// A token prefix can end mid-codepoint; back off one token at a time
/// until the prefix decodes cleanly.
fn decode_prefix(tokens: &[u32], mut n: usize) -> String {
    while n > 0 {
        if let Ok(text) = bpe().decode(tokens[..n].to_vec()) {
            return text;
        }
        n -= 1;
    }
    String::new()
}

/// Decode the last `n` tokens of `tokens` back to text.
fn decode_suffix(tokens: &[u32], mut n: usize) -> String {
    while n > 0 {
        let start = tokens.len() - n;
        if let Ok(text) = bpe().decode(tokens[start..].to_vec()) {
            return text;
        }
        n -= 1;
    }
    String::new()
}

/// End-truncate at the nearest sentence boundary within `max_tokens`,
/// appending ` [...]`.
///
/// Falls back to a word boundary when the last complete sentence would
/// cover less than half of the budget. Content already under budget is
/// returned unchanged, with no marker.
#[must_use]
pub fn smart_end(text: &str, max_tokens: usize) -> String {
    let tokens = bpe().encode_ordinary(text);
    if tokens.len() <= max_tokens {
        return text.to_string();
    }

    let marker_tokens = count_tokens(END_MARKER);
    let budget = max_tokens.saturating_sub(marker_tokens).max(1);
    let prefix = decode_prefix(&tokens, budget.min(tokens.len()));

    let cut = match last_sentence_end(&prefix) {
        // Sentence boundary must not waste more than half the budget.
        Some(pos) if pos >= prefix.len() / 2 => pos,
        _ => last_word_end(&prefix),
    };

    let mut result = prefix[..cut].trim_end().to_string();
    result.push_str(END_MARKER);
    result
}

/// Head+tail truncation preserving the beginning and end of `text` with a
/// middle marker. `first_ratio` controls the head share of the budget.
#[must_use]
pub fn first_last(text: &str, max_tokens: usize, first_ratio: f64) -> String {
    let tokens = bpe().encode_ordinary(text);
    if tokens.len() <= max_tokens {
        return text.to_string();
    }

    let marker_tokens = count_tokens(MIDDLE_MARKER);
    let budget = max_tokens.saturating_sub(marker_tokens).max(2);
    let ratio = first_ratio.clamp(0.1, 0.9);
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let head = ((budget as f64) * ratio) as usize;
    let head = head.clamp(1, budget - 1);
    let tail = budget - head;

    let head_text = decode_prefix(&tokens, head);
    let tail_text = decode_suffix(&tokens, tail);

    format!(
        "{}\n{MIDDLE_MARKER}\n{}",
        head_text.trim_end(),
        tail_text.trim_start()
    )
}

/// Default head share for [`first_last`].
#[must_use]
pub fn first_last_default(text: &str, max_tokens: usize) -> String {
    first_last(text, max_tokens, 0.7)
}

/// Truncate an error context without ever touching the command or the
/// error message: only the bulky output field is reduced (head+tail).
#[must_use]
pub fn structured_truncate(
    command: &str,
    error_message: &str,
    output: &str,
    max_output_tokens: usize,
) -> String {
    let reduced_output = first_last_default(output, max_output_tokens);
    let mut sections = vec![format!("Command: {command}"), format!("Error: {error_message}")];
    if !reduced_output.trim().is_empty() {
        sections.push(format!("Output:\n{reduced_output}"));
    }
    sections.join("\n")
}

/// Apply the collection-wide ceiling to content with no per-type rule.
#[must_use]
pub fn ceiling_truncate(text: &str) -> String {
    smart_end(text, COLLECTION_TOKEN_CEILING)
}

fn last_sentence_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut last = None;
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') {
            let at_boundary = bytes
                .get(i + 1)
                .is_none_or(|&next| next.is_ascii_whitespace());
            if at_boundary {
                last = Some(i + 1);
            }
        }
    }
    last
}

fn last_word_end(text: &str) -> usize {
    text.rfind(char::is_whitespace)
        .filter(|&pos| pos > 0)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_counts_zero() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn under_budget_is_untouched() {
        let text = "Short sentence.";
        assert_eq!(smart_end(text, 100), text);
        assert!(!smart_end(text, 100).contains(END_MARKER));
    }

    #[test]
    fn smart_end_cuts_at_sentence_boundary() {
        let text = "First sentence here. Second sentence here. Third sentence here. \
                    Fourth sentence here. Fifth sentence here.";
        let result = smart_end(text, 15);
        assert!(result.ends_with(END_MARKER));
        assert!(result.contains("First sentence here."));
        assert!(!result.contains("Fifth sentence"));
    }

    #[test]
    fn smart_end_falls_back_to_word_boundary() {
        let text = "word ".repeat(500);
        let result = smart_end(&text, 20);
        assert!(result.ends_with(END_MARKER));
        let body = result.trim_end_matches(END_MARKER);
        assert!(!body.is_empty());
        assert!(count_tokens(&result) <= 20);
    }

    #[test]
    fn smart_end_respects_budget() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota kappa lambda. ".repeat(40);
        let result = smart_end(&text, 50);
        assert!(count_tokens(&result) <= 50);
    }

    #[test]
    fn first_last_preserves_both_ends() {
        let text = format!("BEGINNING {} ENDING", "middle filler ".repeat(300));
        let result = first_last(&text, 30, 0.7);
        assert!(result.contains("BEGINNING"));
        assert!(result.contains("ENDING"));
        assert!(result.contains(MIDDLE_MARKER));
    }

    #[test]
    fn structured_keeps_error_verbatim() {
        let error = "ModuleNotFoundError: No module named 'requests'";
        let output = "line ".repeat(2000);
        let result = structured_truncate("python app.py", error, &output, 50);
        assert!(result.contains("Command: python app.py"));
        assert!(result.contains(error));
        assert!(result.contains(MIDDLE_MARKER));
    }

    #[test]
    fn structured_omits_empty_output() {
        let result = structured_truncate("make", "build failed", "", 50);
        assert!(result.contains("Command: make"));
        assert!(result.contains("build failed"));
        assert!(!result.contains("Output:"));
    }
}
