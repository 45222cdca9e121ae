/*
 * Codegraph Source/Sink Analysis
 *
 * Finds taint sources and sinks in a code property graph and proposes
 * data-flow paths between them for security review.
 *
 * Architecture:
 * - Funnels (cheap keyword candidate queries)
 * - Analyzers (documentation heuristics, LLM judgement)
 * - Workflow (staged orchestration, additive persistence)
 * - Ports (graph store and completion service, injected)
 */

// Public modules
pub mod analyzer;
pub mod config;
pub mod error;
pub mod extract;
pub mod funnel;
pub mod lexicon;
pub mod model;
pub mod persist;
pub mod queries;
pub mod stage;
pub mod telemetry;
pub mod workflow;

// Re-exports
pub use analyzer::{Analyzer, CodeContext, DocumentationAnalyzer, LlmAnalyzer, Summarizer};
pub use config::{DocumentationConfig, FunnelConfig, LlmConfig, WorkflowConfig};
pub use error::{ErrorCategory, RecoveredFailures, Result, WorkflowError};
pub use extract::extract_flows;
pub use funnel::{Funnel, KeywordFunnel};
pub use model::{
    AnalysisResult, Candidate, DataFlowPath, FlowEndpoint, ImpactLevel, Metadata, SinkCandidate,
    SinkNode, SourceCandidate, SourceNode, SourceSinkCategory,
};
pub use persist::{Investigation, PersistCounts, Persister};
pub use stage::{StageTracker, WorkflowStage};
pub use telemetry::init_tracing;
pub use workflow::{fallback_summary, SourceSinkWorkflow};
