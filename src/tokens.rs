//! Token counting for cost estimation.
//!
//! A model-aware tokenizer can be plugged in through [`TokenCounter`]. When
//! none is available (or it declines a model) the character-ratio estimator
//! is used; its divisors are calibrated per text style.

/// Characters per token for flowing prose.
const PROSE_CHARS_PER_TOKEN: f64 = 4.0;

/// Dutch clinical text: long compound words and abbreviations split into
/// more tokens per character than English prose.
const CLINICAL_CHARS_PER_TOKEN: f64 = 3.3;

/// Markdown/JSON-heavy text: punctuation mostly tokenizes on its own.
const STRUCTURED_CHARS_PER_TOKEN: f64 = 3.0;

/// Share of markup characters above which text counts as structured.
const STRUCTURED_MARKUP_RATIO: f64 = 0.08;

/// Average word length above which text counts as clinical.
const CLINICAL_AVG_WORD_LEN: f64 = 6.5;

pub trait TokenCounter: Send + Sync {
    /// Exact token count for `text` under `model`, or `None` when the
    /// tokenizer does not know the model.
    fn count(&self, model: &str, text: &str) -> Option<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStyle {
    Prose,
    Clinical,
    Structured,
}

impl TextStyle {
    pub fn chars_per_token(&self) -> f64 {
        match self {
            Self::Prose => PROSE_CHARS_PER_TOKEN,
            Self::Clinical => CLINICAL_CHARS_PER_TOKEN,
            Self::Structured => STRUCTURED_CHARS_PER_TOKEN,
        }
    }

    pub fn detect(text: &str) -> Self {
        let total = text.chars().count();
        if total == 0 {
            return Self::Prose;
        }

        let markup = text
            .chars()
            .filter(|c| matches!(c, '*' | '#' | '{' | '}' | '[' | ']' | '"' | ':' | '|' | '-'))
            .count();
        if markup as f64 / total as f64 > STRUCTURED_MARKUP_RATIO {
            return Self::Structured;
        }

        let (letters, words) = text
            .split_whitespace()
            .fold((0usize, 0usize), |(l, w), word| (l + word.chars().count(), w + 1));
        if words > 0 && letters as f64 / words as f64 > CLINICAL_AVG_WORD_LEN {
            return Self::Clinical;
        }

        Self::Prose
    }
}

/// Character-ratio estimate. Zero for empty text, at least 1 otherwise.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count();
    if chars == 0 {
        return 0;
    }
    let divisor = TextStyle::detect(text).chars_per_token();
    ((chars as f64 / divisor).ceil() as u64).max(1)
}

/// Count with the model-aware tokenizer when it answers, else estimate.
pub fn count_tokens(counter: Option<&dyn TokenCounter>, model: &str, text: &str) -> u64 {
    counter
        .and_then(|c| c.count(model, text))
        .unwrap_or_else(|| estimate_tokens(text))
}
