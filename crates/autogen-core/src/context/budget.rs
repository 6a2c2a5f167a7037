//! Token estimation and prompt budgets.

use serde::{Deserialize, Serialize};

/// Context window used when the model is not in the table.
pub const DEFAULT_CONTEXT_WINDOW: usize = 8192;

/// Overrides the table lookup for every model.
pub const CONTEXT_WINDOW_ENV: &str = "AUTOGEN_MODEL_CONTEXT_WINDOW";

/// Known context windows, in tokens.
const MODEL_CONTEXT_WINDOWS: &[(&str, usize)] = &[
    ("llama3.2", 8192),
    ("llama3.1", 131_072),
    ("mistral", 32_768),
    ("mixtral", 32_768),
    ("codellama", 16_384),
    ("phi3", 4096),
    ("gemma2", 8192),
    ("qwen2.5", 32_768),
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-3.5-turbo", 16_385),
];

/// Context window for `model`: exact match, then the name before any
/// `:tag` suffix, then `claude-*`, then [`DEFAULT_CONTEXT_WINDOW`].
pub fn context_window_for(model: &str) -> usize {
    let lookup = |name: &str| {
        MODEL_CONTEXT_WINDOWS
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, window)| *window)
    };
    let base = model.split(':').next().unwrap_or(model);
    lookup(model)
        .or_else(|| lookup(base))
        .or_else(|| base.starts_with("claude-").then_some(200_000))
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

/// Like [`context_window_for`] but honours [`CONTEXT_WINDOW_ENV`].
pub fn resolve_context_window(model: &str) -> usize {
    std::env::var(CONTEXT_WINDOW_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|w| *w > 0)
        .unwrap_or_else(|| context_window_for(model))
}

/// Character-count based size estimate. Deterministic and monotonic in
/// input length; no tokenizer is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEstimator {
    chars_per_token: usize,
}

impl TokenEstimator {
    /// `chars_per_token` of zero is treated as one.
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }

    /// Estimated tokens, rounded up so a non-empty text never costs zero.
    pub fn estimate(&self, text: &str) -> usize {
        text.len().div_ceil(self.chars_per_token)
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(3)
    }
}

/// How the context ceiling for one request was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetPlan {
    pub context_window: usize,
    /// Estimated size of everything in the prompt except the context block.
    pub prompt_overhead: usize,
    pub output_reserve: usize,
    /// What remains for context lines.
    pub ceiling: usize,
}

impl BudgetPlan {
    /// `ceiling = window - overhead - reserve`, floored at zero.
    pub fn new(context_window: usize, prompt_overhead: usize, output_reserve: usize) -> Self {
        Self {
            context_window,
            prompt_overhead,
            output_reserve,
            ceiling: context_window
                .saturating_sub(prompt_overhead)
                .saturating_sub(output_reserve),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_window_lookup() {
        assert_eq!(context_window_for("llama3.1"), 131_072);
        assert_eq!(context_window_for("llama3.1:8b"), 131_072);
        assert_eq!(context_window_for("gpt-4o-mini"), 128_000);
        assert_eq!(context_window_for("claude-sonnet"), 200_000);
        assert_eq!(context_window_for("tinyllama"), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn test_estimate_rounds_up() {
        let est = TokenEstimator::default();
        assert_eq!(est.estimate(""), 0);
        assert_eq!(est.estimate("a"), 1);
        assert_eq!(est.estimate("abc"), 1);
        assert_eq!(est.estimate("abcd"), 2);
    }

    #[test]
    fn test_zero_chars_per_token_is_clamped() {
        assert_eq!(TokenEstimator::new(0).estimate("abcd"), 4);
    }

    #[test]
    fn test_budget_plan_saturates() {
        let plan = BudgetPlan::new(4096, 3000, 2048);
        assert_eq!(plan.ceiling, 0);
        assert_eq!(BudgetPlan::new(8192, 1000, 2048).ceiling, 5144);
    }
}
