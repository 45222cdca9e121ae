//! Documentation-keyword analyzer
//!
//! Confirms candidates whose docstring or summary mentions category keywords
//! and links sources to sinks reachable over a short call path. Text alone is
//! never conclusive, so candidate confidence is capped below certainty.

use std::sync::Arc;

use async_trait::async_trait;
use codegraph_ports::{params, GraphPort, RecordExt};
use serde_json::json;
use tracing::{debug, warn};

use super::{fetch_code, Analyzer};
use crate::config::DocumentationConfig;
use crate::error::{ErrorCategory, Result, WorkflowError};
use crate::lexicon::{
    best_matching_category, matched_keywords, vulnerability_profile, CategoryTable,
    SINK_CATEGORY_KEYWORDS, SOURCE_CATEGORY_KEYWORDS,
};
use crate::model::{
    Candidate, DataFlowPath, ImpactLevel, SinkNode, SourceNode, SourceSinkCategory,
};
use crate::queries::CALL_PATH;

const BASE_CONFIDENCE: f64 = 0.3;
const CONFIDENCE_PER_HIT: f64 = 0.1;
const CONFIDENCE_CAP: f64 = 0.8;

/// `min(0.3 + 0.1 × hits, 0.8)`
pub fn keyword_confidence(hits: usize) -> f64 {
    (BASE_CONFIDENCE + CONFIDENCE_PER_HIT * hits as f64).min(CONFIDENCE_CAP)
}

/// Keyword evidence for one candidate
#[derive(Debug, Clone, PartialEq)]
struct Evidence {
    category: SourceSinkCategory,
    keywords: Vec<&'static str>,
}

pub struct DocumentationAnalyzer {
    graph: Arc<dyn GraphPort>,
    config: DocumentationConfig,
}

impl DocumentationAnalyzer {
    pub fn new(graph: Arc<dyn GraphPort>, config: DocumentationConfig) -> Self {
        Self { graph, config }
    }

    async fn gather_evidence(
        &self,
        candidate: &Candidate,
        table: &CategoryTable,
    ) -> Result<Option<Evidence>> {
        let Some(context) = fetch_code(self.graph.as_ref(), candidate.node_id).await? else {
            debug!(
                "DocumentationAnalyzer: no code for node {} ({}), skipping",
                candidate.node_id, candidate.name
            );
            return Ok(None);
        };

        let text = format!(
            "{}\n{}",
            context.docstring.unwrap_or_default(),
            candidate.description
        )
        .to_lowercase();

        let Some((category, _)) = best_matching_category(&text, table) else {
            return Ok(None);
        };

        let keywords = table
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, keywords)| matched_keywords(&text, keywords))
            .unwrap_or_default();

        Ok(Some(Evidence { category, keywords }))
    }
}

fn rationale(role: &str, evidence: &Evidence) -> String {
    format!(
        "Documentation suggests a {} {} (keywords: {})",
        evidence.category,
        role,
        evidence.keywords.join(", ")
    )
}

#[async_trait]
impl Analyzer for DocumentationAnalyzer {
    fn name(&self) -> &str {
        "documentation"
    }

    async fn analyze_source(
        &self,
        candidate: &Candidate,
        _investigation_id: &str,
    ) -> Result<Option<SourceNode>> {
        let Some(evidence) = self.gather_evidence(candidate, SOURCE_CATEGORY_KEYWORDS).await? else {
            return Ok(None);
        };

        let node = SourceNode::from_candidate(
            candidate,
            evidence.category,
            keyword_confidence(evidence.keywords.len()),
            rationale("source", &evidence),
        )
        .with_metadata("analyzer", json!(self.name()))
        .with_metadata("keywords", json!(evidence.keywords));
        Ok(Some(node))
    }

    async fn analyze_sink(
        &self,
        candidate: &Candidate,
        _investigation_id: &str,
    ) -> Result<Option<SinkNode>> {
        let Some(evidence) = self.gather_evidence(candidate, SINK_CATEGORY_KEYWORDS).await? else {
            return Ok(None);
        };

        let node = SinkNode::from_candidate(
            candidate,
            evidence.category,
            keyword_confidence(evidence.keywords.len()),
            rationale("sink", &evidence),
        )
        .with_metadata("analyzer", json!(self.name()))
        .with_metadata("keywords", json!(evidence.keywords));
        Ok(Some(node))
    }

    async fn analyze_data_flow(
        &self,
        sources: &[SourceNode],
        sinks: &[SinkNode],
        investigation_id: &str,
    ) -> Result<Vec<DataFlowPath>> {
        let mut paths = Vec::new();
        if sources.is_empty() || sinks.is_empty() {
            return Ok(paths);
        }

        for source in sources {
            for sink in sinks {
                let rows = match self
                    .graph
                    .run_query(
                        CALL_PATH,
                        params([
                            ("source_id", json!(source.node_id)),
                            ("sink_id", json!(sink.node_id)),
                            ("max_hops", json!(self.config.max_call_hops)),
                        ]),
                    )
                    .await
                    .map_err(WorkflowError::Graph)
                {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!(
                            category = %ErrorCategory::Synthesis,
                            "DocumentationAnalyzer: call path lookup {} -> {} failed for investigation {}: {}",
                            source.name, sink.name, investigation_id, e
                        );
                        continue;
                    }
                };

                let Some(path_ids) = rows.first().map(|row| row.get_i64_list("path_ids")) else {
                    continue;
                };
                if path_ids.len() < 2 {
                    continue;
                }
                let hops = path_ids.len() - 1;
                if hops > self.config.max_call_hops as usize {
                    continue;
                }

                let profile = vulnerability_profile(sink.category);
                let path = DataFlowPath::new(source.clone(), sink.clone(), profile.vulnerability_type)
                    .with_impact(ImpactLevel::Medium)
                    .with_confidence(self.config.flow_confidence)
                    .with_intermediate_nodes(path_ids[1..path_ids.len() - 1].to_vec())
                    .with_description(format!(
                        "{} reaches {} through {} call hop(s)",
                        source.name, sink.name, hops
                    ))
                    .with_recommendations(
                        profile.recommendations.iter().map(|r| r.to_string()).collect(),
                    )
                    .with_metadata("analyzer", json!(self.name()))
                    .with_metadata("call_hops", json!(hops));
                paths.push(path);
            }
        }

        debug!(
            "DocumentationAnalyzer: {} call-path flows for investigation {}",
            paths.len(),
            investigation_id
        );
        Ok(paths)
    }
}
