use codegraph_ports::PortError;
use thiserror::Error;

use crate::stage::WorkflowStage;

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Completion service required but not configured")]
    CompletionServiceMissing,

    #[error("Investigation not found: {0}")]
    InvestigationNotFound(String),

    #[error("Run cancelled before stage {stage}")]
    Cancelled { stage: WorkflowStage },

    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidStageTransition { from: String, to: String },

    #[error("Graph error: {0}")]
    Graph(PortError),

    #[error("Completion error: {0}")]
    Completion(PortError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    pub fn serialization<E: std::fmt::Display>(e: E) -> Self {
        Self::Serialization(e.to_string())
    }

    pub fn parse<E: std::fmt::Display>(e: E) -> Self {
        Self::Parse(e.to_string())
    }

    /// Where this error sits in the failure taxonomy.
    ///
    /// Port errors surface inside per-item boundaries, so they classify by the
    /// stage that observed them rather than here; callers that see one at the
    /// top level received it from the investigation lookup.
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkflowError::Config(_)
            | WorkflowError::CompletionServiceMissing
            | WorkflowError::Yaml(_)
            | WorkflowError::Io(_) => ErrorCategory::Configuration,
            WorkflowError::InvestigationNotFound(_) | WorkflowError::Graph(_) => {
                ErrorCategory::Lookup
            }
            WorkflowError::Cancelled { .. } => ErrorCategory::Cancelled,
            WorkflowError::InvalidStageTransition { .. } => ErrorCategory::Configuration,
            WorkflowError::Completion(_)
            | WorkflowError::Serialization(_)
            | WorkflowError::Parse(_) => ErrorCategory::Candidate,
        }
    }
}

/// Failure taxonomy
///
/// Only configuration, lookup and cancellation end a run; the rest are
/// recovered at the boundary of the item that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing investigation id, missing completion service, invalid config
    Configuration,
    /// Investigation does not exist in the graph
    Lookup,
    /// One candidate could not be analyzed
    Candidate,
    /// One per-file or per-pair flow synthesis failed
    Synthesis,
    /// One create/link call failed
    Persistence,
    /// Run aborted at a stage boundary
    Cancelled,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Lookup => "lookup",
            ErrorCategory::Candidate => "candidate",
            ErrorCategory::Synthesis => "synthesis",
            ErrorCategory::Persistence => "persistence",
            ErrorCategory::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "configuration" => Ok(ErrorCategory::Configuration),
            "lookup" => Ok(ErrorCategory::Lookup),
            "candidate" => Ok(ErrorCategory::Candidate),
            "synthesis" => Ok(ErrorCategory::Synthesis),
            "persistence" => Ok(ErrorCategory::Persistence),
            "cancelled" => Ok(ErrorCategory::Cancelled),
            _ => Err(WorkflowError::parse(format!(
                "Invalid error category: {}",
                s
            ))),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Configuration | ErrorCategory::Lookup | ErrorCategory::Cancelled
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-item failures one run recovered from
///
/// Fatal categories end the run and are never tallied. Failures an analyzer
/// absorbs itself (one file group, one call-path pair) are logged by that
/// analyzer and not counted here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RecoveredFailures {
    pub candidate: usize,
    pub synthesis: usize,
    pub persistence: usize,
}

impl RecoveredFailures {
    pub fn record(&mut self, category: ErrorCategory, count: usize) {
        match category {
            ErrorCategory::Candidate => self.candidate += count,
            ErrorCategory::Synthesis => self.synthesis += count,
            ErrorCategory::Persistence => self.persistence += count,
            ErrorCategory::Configuration | ErrorCategory::Lookup | ErrorCategory::Cancelled => {}
        }
    }

    pub fn total(&self) -> usize {
        self.candidate + self.synthesis + self.persistence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_roundtrip() {
        for category in &[
            ErrorCategory::Configuration,
            ErrorCategory::Lookup,
            ErrorCategory::Candidate,
            ErrorCategory::Synthesis,
            ErrorCategory::Persistence,
            ErrorCategory::Cancelled,
        ] {
            let parsed = ErrorCategory::from_str(category.as_str()).unwrap();
            assert_eq!(*category, parsed);
        }
    }

    #[test]
    fn test_error_category_invalid() {
        assert!(ErrorCategory::from_str("transient").is_err());
    }

    #[test]
    fn test_fatal_categories() {
        assert!(ErrorCategory::Configuration.is_fatal());
        assert!(ErrorCategory::Lookup.is_fatal());
        assert!(!ErrorCategory::Candidate.is_fatal());
        assert!(!ErrorCategory::Synthesis.is_fatal());
        assert!(!ErrorCategory::Persistence.is_fatal());
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            WorkflowError::InvestigationNotFound("inv".into()).category(),
            ErrorCategory::Lookup
        );
        assert_eq!(
            WorkflowError::CompletionServiceMissing.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            WorkflowError::Cancelled {
                stage: WorkflowStage::Persist
            }
            .category(),
            ErrorCategory::Cancelled
        );
        assert_eq!(
            WorkflowError::Completion(PortError::completion("timeout")).category(),
            ErrorCategory::Candidate
        );
    }

    #[test]
    fn test_recovered_failures_ignore_fatal_categories() {
        let mut failures = RecoveredFailures::default();
        failures.record(ErrorCategory::Candidate, 2);
        failures.record(ErrorCategory::Synthesis, 1);
        failures.record(ErrorCategory::Persistence, 3);
        failures.record(ErrorCategory::Lookup, 5);
        assert_eq!(
            failures,
            RecoveredFailures {
                candidate: 2,
                synthesis: 1,
                persistence: 3
            }
        );
        assert_eq!(failures.total(), 6);
    }

    #[test]
    fn test_error_messages() {
        let err = WorkflowError::InvestigationNotFound("inv-9".into());
        assert_eq!(err.to_string(), "Investigation not found: inv-9");

        let err = WorkflowError::Cancelled {
            stage: WorkflowStage::SynthesizeFlows,
        };
        assert_eq!(err.to_string(), "Run cancelled before stage synthesize_flows");
    }
}
