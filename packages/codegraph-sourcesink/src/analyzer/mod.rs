//! Confirmation, classification and flow synthesis
//!
//! # Strategies
//!
//! - `DocumentationAnalyzer`: keyword evidence in docstrings and summaries,
//!   call-graph adjacency for flows
//! - `LlmAnalyzer`: completion-backed judgement for candidates, per-file flow
//!   prompts and the narrative summary
//!
//! Both fetch candidate code through the graph port. A candidate without
//! retrievable code is never confirmed.

pub mod documentation;
pub mod llm;

use std::collections::BTreeMap;

use async_trait::async_trait;
use codegraph_ports::{params, GraphPort, NodeId, RecordExt};
use serde_json::json;

use crate::error::{Result, WorkflowError};
use crate::model::{
    DataFlowPath, FlowEndpoint, SinkCandidate, SinkNode, SourceCandidate, SourceNode,
};
use crate::queries::NODE_CODE;

pub use documentation::DocumentationAnalyzer;
pub use llm::LlmAnalyzer;

/// Confirmation and flow-synthesis strategy
///
/// Errors returned from any method are recovered by the caller at the
/// boundary of the candidate or synthesis call that produced them.
/// Implementations must not mutate their inputs.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Name recorded in result metadata
    fn name(&self) -> &str;

    /// `None` when the candidate is not a source or has no retrievable code.
    async fn analyze_source(
        &self,
        candidate: &SourceCandidate,
        investigation_id: &str,
    ) -> Result<Option<SourceNode>>;

    /// `None` when the candidate is not a sink or has no retrievable code.
    async fn analyze_sink(
        &self,
        candidate: &SinkCandidate,
        investigation_id: &str,
    ) -> Result<Option<SinkNode>>;

    /// Paths between confirmed endpoints. Empty when either side is empty.
    async fn analyze_data_flow(
        &self,
        sources: &[SourceNode],
        sinks: &[SinkNode],
        investigation_id: &str,
    ) -> Result<Vec<DataFlowPath>>;
}

/// Narrative summary of a finished analysis
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn generate_summary(
        &self,
        sources: &[SourceNode],
        sinks: &[SinkNode],
        paths: &[DataFlowPath],
        investigation_id: &str,
    ) -> Result<String>;
}

/// Code and documentation attached to one graph node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeContext {
    pub code: String,
    pub docstring: Option<String>,
    pub file_path: Option<String>,
}

/// Fetch the code of `node_id`; `Ok(None)` when the node has none.
pub async fn fetch_code(graph: &dyn GraphPort, node_id: NodeId) -> Result<Option<CodeContext>> {
    let rows = graph
        .run_query(NODE_CODE, params([("node_id", json!(node_id))]))
        .await
        .map_err(WorkflowError::Graph)?;

    let Some(row) = rows.first() else {
        return Ok(None);
    };
    let Some(code) = row.get_non_empty("code") else {
        return Ok(None);
    };

    Ok(Some(CodeContext {
        code,
        docstring: row.get_non_empty("docstring"),
        file_path: row.get_non_empty("file_path"),
    }))
}

/// Cut `text` to at most `budget` characters on a char boundary, marking the cut.
pub fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}\n... [truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

/// Endpoint counts keyed by category tag
pub fn count_by_category<T: FlowEndpoint>(nodes: &[T]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for node in nodes {
        *counts.entry(node.category().as_str()).or_insert(0) += 1;
    }
    counts
}

/// Path counts keyed by impact tag
pub fn count_by_impact(paths: &[DataFlowPath]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for path in paths {
        *counts.entry(path.impact.as_str()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImpactLevel, SourceSinkCategory};
    use codegraph_ports::MemoryGraph;
    use serde_json::Value;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo\n... [truncated]");
    }

    #[test]
    fn test_counts() {
        let sources = vec![
            SourceNode::new(1, "a", SourceSinkCategory::UserInput),
            SourceNode::new(2, "b", SourceSinkCategory::UserInput),
            SourceNode::new(3, "c", SourceSinkCategory::FileRead),
        ];
        let counts = count_by_category(&sources);
        assert_eq!(counts["user_input"], 2);
        assert_eq!(counts["file_read"], 1);

        let sink = SinkNode::new(4, "d", SourceSinkCategory::Logging);
        let paths = vec![
            DataFlowPath::new(sources[0].clone(), sink.clone(), "x").with_impact(ImpactLevel::High),
            DataFlowPath::new(sources[1].clone(), sink, "y"),
        ];
        let counts = count_by_impact(&paths);
        assert_eq!(counts["high"], 1);
        assert_eq!(counts["medium"], 1);
    }

    #[tokio::test]
    async fn test_fetch_code() {
        let graph = MemoryGraph::new();
        graph.on_query(NODE_CODE, |params, _| {
            let rows = match params["node_id"].as_i64() {
                Some(1) => vec![json!({"code": "def f(): pass", "docstring": null})],
                Some(2) => vec![json!({"code": "   "})],
                _ => vec![],
            };
            Ok(rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect())
        });

        let context = fetch_code(&graph, 1).await.unwrap().unwrap();
        assert_eq!(context.code, "def f(): pass");
        assert_eq!(context.docstring, None);

        assert!(fetch_code(&graph, 2).await.unwrap().is_none());
        assert!(fetch_code(&graph, 3).await.unwrap().is_none());
    }
}
