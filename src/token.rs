//! Token counting.
//!
//! The batch ceiling is only a hard limit when it is measured with the same
//! tokenizer the serving model uses. The BPE kinds count exactly for the
//! OpenAI model families they name. Any other pairing (including a Gemini
//! model behind an OpenAI-compatible endpoint) turns the ceiling into a close
//! approximation, and the heuristic kinds always do.

use crate::error::{Error, Result};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

const SIMPLE_CHARS_PER_TOKEN: usize = 4;
const ENHANCED_WORD_MULTIPLIER: f64 = 1.3;
const ENHANCED_SPECIAL_DIVISOR: usize = 10;

/// Type of tokenizer to use for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    /// Simple character-based tokenizer (~4 chars per token)
    Simple,
    /// Enhanced tokenizer with word and special character analysis
    Enhanced,
    /// `cl100k_base` BPE (GPT-4 / GPT-3.5 family)
    Cl100k,
    /// `o200k_base` BPE (GPT-4o family)
    O200k,
}

impl TokenizerKind {
    /// Creates a new tokenizer instance of this kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the BPE ranks cannot be loaded.
    pub fn create(self) -> Result<Arc<dyn TokenEstimator>> {
        Ok(match self {
            Self::Simple => Arc::new(SimpleTokenizer),
            Self::Enhanced => Arc::new(EnhancedTokenizer),
            Self::Cl100k => Arc::new(BpeTokenizer::new(
                tiktoken_rs::cl100k_base().map_err(|e| Error::config(e.to_string()))?,
            )),
            Self::O200k => Arc::new(BpeTokenizer::new(
                tiktoken_rs::o200k_base().map_err(|e| Error::config(e.to_string()))?,
            )),
        })
    }

    /// Returns true if this kind produces exact counts rather than estimates.
    #[must_use]
    pub const fn is_exact(self) -> bool {
        matches!(self, Self::Cl100k | Self::O200k)
    }
}

/// Trait for counting tokens in text.
///
/// Implementations must be deterministic and thread-safe.
pub trait TokenEstimator: Send + Sync {
    /// Returns the number of tokens the text consumes.
    fn estimate(&self, text: &str) -> usize;

    /// Estimates tokens for a batch of texts.
    ///
    /// Default implementation calls `estimate` for each text.
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }
}

/// Simple character-based tokenizer.
///
/// Uses a heuristic of approximately 4 characters per token,
/// which works reasonably well for source code.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimpleTokenizer;

impl TokenEstimator for SimpleTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count();
        char_count
            .saturating_add(SIMPLE_CHARS_PER_TOKEN - 1)
            .saturating_div(SIMPLE_CHARS_PER_TOKEN)
            .max(1)
    }
}

/// Enhanced tokenizer with multiple heuristics.
///
/// This tokenizer considers:
/// - Word count (weighted by 1.3)
/// - Character count (divided by 4)
/// - Special characters (penalty factor)
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnhancedTokenizer;

impl TokenEstimator for EnhancedTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let words = count_words(text);
        let chars = text.chars().count();
        let special_chars = count_special_chars(text);

        let word_estimate = (words as f64 * ENHANCED_WORD_MULTIPLIER) as usize;
        let char_estimate = chars.saturating_div(SIMPLE_CHARS_PER_TOKEN);
        let special_penalty = special_chars.saturating_div(ENHANCED_SPECIAL_DIVISOR);

        let base_estimate = word_estimate
            .saturating_add(char_estimate)
            .saturating_div(2);

        base_estimate.saturating_add(special_penalty).max(1)
    }
}

/// Exact BPE token counter backed by `tiktoken-rs`.
pub(crate) struct BpeTokenizer {
    bpe: CoreBPE,
}

impl BpeTokenizer {
    pub(crate) const fn new(bpe: CoreBPE) -> Self {
        Self { bpe }
    }
}

impl TokenEstimator for BpeTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Counts words in text (whitespace-separated).
#[inline]
fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Counts special (non-alphanumeric) characters.
#[inline]
fn count_special_chars(text: &str) -> usize {
    text.chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tokenizer_empty() {
        let tokenizer = SimpleTokenizer;
        assert_eq!(tokenizer.estimate(""), 0);
    }

    #[test]
    fn test_simple_tokenizer_basic() {
        let tokenizer = SimpleTokenizer;
        assert_eq!(tokenizer.estimate("test"), 1); // 4 chars = 1 token
        assert_eq!(tokenizer.estimate("hello world"), 3); // 11 chars = 3 tokens
    }

    #[test]
    fn test_simple_tokenizer_long_text() {
        let tokenizer = SimpleTokenizer;
        let text = "a".repeat(1000);
        assert_eq!(tokenizer.estimate(&text), 250);
    }

    #[test]
    fn test_enhanced_tokenizer_code() {
        let tokenizer = EnhancedTokenizer;
        let code = r#"
            fn main() {
                println!("Hello, world!");
            }
        "#;
        let result = tokenizer.estimate(code);
        assert!(result > 5);
        assert!(result < 30);
    }

    #[test]
    fn test_bpe_tokenizer_counts_exactly() {
        let tokenizer = TokenizerKind::Cl100k.create().unwrap();
        assert_eq!(tokenizer.estimate(""), 0);
        // "hello world" is two cl100k tokens
        assert_eq!(tokenizer.estimate("hello world"), 2);
    }

    #[test]
    fn test_tokenizers_are_deterministic() {
        let text = "export default function App() { return <div>hi</div> }";
        for kind in [
            TokenizerKind::Simple,
            TokenizerKind::Enhanced,
            TokenizerKind::Cl100k,
            TokenizerKind::O200k,
        ] {
            let tokenizer = kind.create().unwrap();
            assert_eq!(tokenizer.estimate(text), tokenizer.estimate(text));
            assert!(tokenizer.estimate(text) > 0);
        }
    }

    #[test]
    fn test_is_exact() {
        assert!(TokenizerKind::Cl100k.is_exact());
        assert!(TokenizerKind::O200k.is_exact());
        assert!(!TokenizerKind::Simple.is_exact());
        assert!(!TokenizerKind::Enhanced.is_exact());
    }

    #[test]
    fn test_estimate_batch() {
        let tokenizer = SimpleTokenizer;
        let results = tokenizer.estimate_batch(&["hello", "world", "test"]);

        assert_eq!(results, vec![2, 2, 1]);
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("hello world"), 2);
        assert_eq!(count_words("  hello   world  "), 2);
    }

    #[test]
    fn test_count_special_chars() {
        assert_eq!(count_special_chars("hello"), 0);
        assert_eq!(count_special_chars("fn main() {}"), 4);
    }
}
