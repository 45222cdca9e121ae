//! Workflow configuration
//!
//! Every struct is `#[serde(default)]`, so a YAML file only needs the keys it
//! overrides. Call `validate()` (done by the loaders) before use.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};
use crate::lexicon::{DEFAULT_SINK_KEYWORDS, DEFAULT_SOURCE_KEYWORDS};

fn range_error(
    field: &str,
    value: impl ToString,
    min: impl ToString,
    max: impl ToString,
    hint: &str,
) -> WorkflowError {
    WorkflowError::Config(format!(
        "{} = {} is outside {}..={} ({})",
        field,
        value.to_string(),
        min.to_string(),
        max.to_string(),
        hint
    ))
}

// ============================================================================
// Workflow
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub name: String,
    pub description: String,

    /// Fail the run when no completion port is configured
    pub require_llm: bool,

    /// Candidates confirmed concurrently (1..=64)
    pub max_concurrency: usize,

    /// Write confirmed entities back to the graph
    pub persist: bool,

    pub funnel: FunnelConfig,
    pub llm: LlmConfig,
    pub documentation: DocumentationConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            name: "sources_and_sinks".to_string(),
            description: "Identify taint sources and sinks and the data flows between them"
                .to_string(),
            require_llm: false,
            max_concurrency: 1,
            persist: true,
            funnel: FunnelConfig::default(),
            llm: LlmConfig::default(),
            documentation: DocumentationConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::config("name must not be empty"));
        }

        if self.max_concurrency == 0 || self.max_concurrency > 64 {
            return Err(range_error(
                "max_concurrency",
                self.max_concurrency,
                1,
                64,
                "Concurrent confirmations must be bounded",
            ));
        }

        self.funnel.validate()?;
        self.llm.validate()?;
        self.documentation.validate()?;
        Ok(())
    }
}

// ============================================================================
// Keyword funnel
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelConfig {
    pub source_keywords: Vec<String>,
    pub sink_keywords: Vec<String>,

    /// Row cap per candidate query; `None` leaves it to the store
    pub limit: Option<usize>,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            source_keywords: DEFAULT_SOURCE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            sink_keywords: DEFAULT_SINK_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            limit: None,
        }
    }
}

impl FunnelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(WorkflowError::config("funnel.source_keywords must not be empty"));
        }
        if self.sink_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(WorkflowError::config("funnel.sink_keywords must not be empty"));
        }
        if self.limit == Some(0) {
            return Err(WorkflowError::config("funnel.limit must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// LLM analyzer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Sampling temperature (0.0..=2.0)
    pub temperature: f32,

    /// Response cap for confirmation and flow prompts
    pub max_tokens: u32,

    /// Response cap for the narrative summary
    pub summary_max_tokens: u32,

    /// Characters of code per entity in a flow prompt
    pub code_char_budget: usize,

    /// Characters of code in a single-candidate prompt
    pub candidate_code_budget: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 1024,
            summary_max_tokens: 800,
            code_char_budget: 2000,
            candidate_code_budget: 8000,
        }
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(range_error(
                "llm.temperature",
                self.temperature,
                0.0,
                2.0,
                "Sampling temperature",
            ));
        }
        if self.max_tokens == 0 || self.summary_max_tokens == 0 {
            return Err(WorkflowError::config("llm token limits must be at least 1"));
        }
        if self.code_char_budget < 100 {
            return Err(range_error(
                "llm.code_char_budget",
                self.code_char_budget,
                100,
                usize::MAX,
                "Too little code leaves nothing to reason about",
            ));
        }
        if self.candidate_code_budget < self.code_char_budget {
            return Err(WorkflowError::config(
                "llm.candidate_code_budget must be >= llm.code_char_budget",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Documentation analyzer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentationConfig {
    /// Longest call path accepted as a flow (1..=10)
    pub max_call_hops: u32,

    /// Confidence assigned to call-path flows
    pub flow_confidence: f64,
}

impl Default for DocumentationConfig {
    fn default() -> Self {
        Self {
            max_call_hops: 3,
            flow_confidence: 0.6,
        }
    }
}

impl DocumentationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_call_hops == 0 || self.max_call_hops > 10 {
            return Err(range_error(
                "documentation.max_call_hops",
                self.max_call_hops,
                1,
                10,
                "Call paths are bounded",
            ));
        }
        if !(0.0..=1.0).contains(&self.flow_confidence) {
            return Err(range_error(
                "documentation.flow_confidence",
                self.flow_confidence,
                0.0,
                1.0,
                "Confidence is a unit score",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = WorkflowConfig::default();
        config.validate().unwrap();
        assert_eq!(config.name, "sources_and_sinks");
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.documentation.max_call_hops, 3);
        assert!(config.persist);
        assert!(!config.require_llm);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = WorkflowConfig::from_yaml_str(
            "name: nightly\nmax_concurrency: 8\nllm:\n  temperature: 0.0\n",
        )
        .unwrap();
        assert_eq!(config.name, "nightly");
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.llm.max_tokens, 1024);
        assert_eq!(config.funnel, FunnelConfig::default());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = WorkflowConfig {
            require_llm: true,
            ..Default::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(WorkflowConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let err = WorkflowConfig::from_yaml_str("max_concurrency: 0").unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));

        let err = WorkflowConfig::from_yaml_str("documentation:\n  max_call_hops: 11").unwrap_err();
        assert!(err.to_string().contains("documentation.max_call_hops"));

        let err = WorkflowConfig::from_yaml_str("llm:\n  temperature: 3.5").unwrap_err();
        assert!(err.to_string().contains("llm.temperature"));

        let err = WorkflowConfig::from_yaml_str("llm:\n  code_char_budget: 10").unwrap_err();
        assert!(err.to_string().contains("llm.code_char_budget"));
    }

    #[test]
    fn test_rejects_empty_keyword_sets() {
        let err = WorkflowConfig::from_yaml_str("funnel:\n  source_keywords: []").unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));
    }

    #[test]
    fn test_malformed_yaml_is_a_yaml_error() {
        let err = WorkflowConfig::from_yaml_str("max_concurrency: [1, 2").unwrap_err();
        assert!(matches!(err, WorkflowError::Yaml(_)));
    }
}
