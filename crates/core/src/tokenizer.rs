//! Token counting backends.
//!
//! Mirrors `codescope_core::tokenizer`: an injectable `Tokenizer` trait so
//! the budget fitter never hardcodes a counting strategy.

use std::sync::Arc;

pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
    fn name(&self) -> &str;
}

/// Cheap, model-agnostic estimate: one token per ~3 bytes.
pub struct BytesEstimateTokenizer;

impl Tokenizer for BytesEstimateTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(3)
    }

    fn name(&self) -> &str {
        "bytes-estimate"
    }
}

#[cfg(feature = "tiktoken")]
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl TiktokenTokenizer {
    pub fn cl100k() -> Result<Self, String> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| e.to_string())?;
        Ok(Self { bpe })
    }
}

#[cfg(feature = "tiktoken")]
impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn name(&self) -> &str {
        "cl100k_base"
    }
}

/// Resolve a tokenizer by name, falling back to the byte estimate for
/// any unrecognized name or when the `tiktoken` feature is disabled.
pub fn create_tokenizer(name: &str) -> Arc<dyn Tokenizer> {
    #[cfg(feature = "tiktoken")]
    {
        if matches!(name, "cl100k_base" | "gpt-4" | "gpt-3.5-turbo" | "tiktoken") {
            match TiktokenTokenizer::cl100k() {
                Ok(t) => return Arc::new(t),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load tiktoken encoder, falling back to byte estimate");
                }
            }
        }
    }
    let _ = name;
    Arc::new(BytesEstimateTokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_estimate_rounds_up() {
        let t = BytesEstimateTokenizer;
        assert_eq!(t.count_tokens(""), 0);
        assert_eq!(t.count_tokens("ab"), 1);
        assert_eq!(t.count_tokens("abc"), 1);
        assert_eq!(t.count_tokens("abcd"), 2);
    }

    #[test]
    fn unknown_name_falls_back() {
        let t = create_tokenizer("not-a-real-model");
        assert_eq!(t.name(), "bytes-estimate");
    }
}
