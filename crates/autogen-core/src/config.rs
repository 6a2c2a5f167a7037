//! Runtime configuration.
//!
//! Every field has a default, so an empty file (or none at all) is a valid
//! configuration. CLI flags override values loaded here.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::{resolve_context_window, RelevancePolicy, TokenEstimator};
use crate::error::ConfigError;
use crate::prompt::DEFAULT_PRIOR_ERROR_CAP;
use crate::sensitive::SensitivePolicy;

/// Highest accepted `repair_ceiling`.
pub const MAX_REPAIR_CEILING: u32 = 5;

/// Size-budget parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Overrides the model table lookup.
    pub context_window: Option<usize>,
    /// Tokens kept free for the backend's reply.
    pub output_reserve: usize,
    pub chars_per_token: usize,
    /// Characters of prior-error text carried into a repair prompt.
    pub prior_error_chars: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            context_window: None,
            output_reserve: 2048,
            chars_per_token: 3,
            prior_error_chars: DEFAULT_PRIOR_ERROR_CAP,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutogenConfig {
    /// Upper bound on candidates considered, regardless of score.
    pub max_context_entities: usize,
    /// Cap on full-detail items in packed context.
    pub full_detail_floor: usize,
    /// Repairs after the first generation; total generations is this plus one.
    pub repair_ceiling: u32,
    /// Added to the built-in sensitive domains.
    pub sensitive_domains: Vec<String>,
    pub budget: BudgetConfig,
    pub relevance: RelevancePolicy,
    pub refresh_interval_secs: u64,
    pub backend_timeout_secs: u64,
}

impl Default for AutogenConfig {
    fn default() -> Self {
        Self {
            max_context_entities: 200,
            full_detail_floor: 60,
            repair_ceiling: 2,
            sensitive_domains: Vec::new(),
            budget: BudgetConfig::default(),
            relevance: RelevancePolicy::default(),
            refresh_interval_secs: 300,
            backend_timeout_secs: 120,
        }
    }
}

impl AutogenConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget.chars_per_token == 0 {
            return Err(ConfigError::Invalid(
                "budget.chars_per_token must be at least 1".to_string(),
            ));
        }
        if self.repair_ceiling > MAX_REPAIR_CEILING {
            return Err(ConfigError::Invalid(format!(
                "repair_ceiling {} exceeds the maximum of {MAX_REPAIR_CEILING}",
                self.repair_ceiling
            )));
        }
        if self.max_context_entities == 0 {
            return Err(ConfigError::Invalid(
                "max_context_entities must be at least 1".to_string(),
            ));
        }
        if self.backend_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "backend_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Relevance policy with the candidate cap applied.
    pub fn relevance_policy(&self) -> RelevancePolicy {
        RelevancePolicy {
            max_candidates: self.max_context_entities,
            ..self.relevance.clone()
        }
    }

    pub fn sensitive_policy(&self) -> SensitivePolicy {
        SensitivePolicy::with_additional(self.sensitive_domains.iter().cloned())
    }

    pub fn estimator(&self) -> TokenEstimator {
        TokenEstimator::new(self.budget.chars_per_token)
    }

    /// Configured window, else the environment override, else the model table.
    pub fn context_window(&self, model: &str) -> usize {
        self.budget
            .context_window
            .unwrap_or_else(|| resolve_context_window(model))
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AutogenConfig::from_toml_str("").expect("defaults");
        assert_eq!(config, AutogenConfig::default());
        assert_eq!(config.repair_ceiling, 2);
        assert_eq!(config.relevance_policy().max_candidates, 200);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let config = AutogenConfig::from_toml_str(
            r#"
repair_ceiling = 1
sensitive_domains = ["valve"]

[budget]
context_window = 32768

[relevance.weights]
domain = 5.0
"#,
        )
        .expect("config");
        assert_eq!(config.repair_ceiling, 1);
        assert_eq!(config.budget.output_reserve, 2048);
        assert_eq!(config.context_window("anything"), 32768);
        assert_eq!(config.relevance.weights.domain, 5.0);
        assert_eq!(config.relevance.weights.id, 2.0);
        assert!(config.relevance.stopwords.contains("the"));
        assert!(config.sensitive_policy().is_sensitive_domain("valve"));
        assert!(config.sensitive_policy().is_sensitive_domain("lock"));
    }

    #[test]
    fn test_rejects_zero_chars_per_token() {
        let err = AutogenConfig::from_toml_str("[budget]\nchars_per_token = 0\n")
            .expect_err("invalid");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_large_repair_ceiling() {
        assert!(AutogenConfig::from_toml_str("repair_ceiling = 9").is_err());
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = AutogenConfig::from_toml_str("repair_ceiling = ").expect_err("syntax");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = AutogenConfig::load(dir.path().join("absent.toml")).expect_err("missing");
        assert!(err.to_string().contains("absent.toml"));
    }
}
