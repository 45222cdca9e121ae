//! Candidate generation
//!
//! A funnel narrows the graph to plausible sources and sinks with cheap
//! heuristics. It never judges truthfulness; analyzers do that.

pub mod keyword;

use async_trait::async_trait;

use crate::model::{SinkCandidate, SourceCandidate};

pub use keyword::KeywordFunnel;

/// Candidate generation strategy
///
/// Implementations log query failures and return an empty list; a failing
/// funnel never aborts a run.
#[async_trait]
pub trait Funnel: Send + Sync {
    /// Name recorded in result metadata
    fn name(&self) -> &str;

    async fn query_sources(&self, investigation_id: &str) -> Vec<SourceCandidate>;

    async fn query_sinks(&self, investigation_id: &str) -> Vec<SinkCandidate>;
}
