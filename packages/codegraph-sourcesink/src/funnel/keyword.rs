use std::sync::Arc;

use async_trait::async_trait;
use codegraph_ports::{params, GraphPort};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::Funnel;
use crate::config::FunnelConfig;
use crate::error::{Result, WorkflowError};
use crate::model::Candidate;
use crate::queries::{KEYWORD_SINK_CANDIDATES, KEYWORD_SOURCE_CANDIDATES};

/// Keyword containment over existing code summaries and names
pub struct KeywordFunnel {
    graph: Arc<dyn GraphPort>,
    source_keywords: Vec<String>,
    sink_keywords: Vec<String>,
    limit: Option<usize>,
}

impl KeywordFunnel {
    pub fn new(graph: Arc<dyn GraphPort>, config: &FunnelConfig) -> Self {
        Self {
            graph,
            source_keywords: normalize(&config.source_keywords),
            sink_keywords: normalize(&config.sink_keywords),
            limit: config.limit,
        }
    }

    pub fn source_keywords(&self) -> &[String] {
        &self.source_keywords
    }

    pub fn sink_keywords(&self) -> &[String] {
        &self.sink_keywords
    }

    async fn query(
        &self,
        statement: &str,
        keywords: &[String],
        investigation_id: &str,
    ) -> Result<Vec<Candidate>> {
        let limit = self.limit.map_or(Value::Null, |limit| json!(limit));
        let rows = self
            .graph
            .run_query(
                statement,
                params([
                    ("investigation_id", json!(investigation_id)),
                    ("keywords", json!(keywords)),
                    ("limit", limit),
                ]),
            )
            .await
            .map_err(WorkflowError::Graph)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            match Candidate::from_record(row) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => warn!("KeywordFunnel: skipping malformed row: {}", e),
            }
        }
        Ok(candidates)
    }

    async fn query_or_empty(
        &self,
        role: &str,
        statement: &str,
        keywords: &[String],
        investigation_id: &str,
    ) -> Vec<Candidate> {
        match self.query(statement, keywords, investigation_id).await {
            Ok(candidates) => {
                debug!(
                    "KeywordFunnel: {} {} candidates for investigation {}",
                    candidates.len(),
                    role,
                    investigation_id
                );
                candidates
            }
            Err(e) => {
                error!(
                    "KeywordFunnel: {} query failed for investigation {}: {}",
                    role, investigation_id, e
                );
                Vec::new()
            }
        }
    }
}

/// Lower-case, trim and drop empty or repeated keywords, keeping order.
fn normalize(keywords: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() && !seen.contains(&keyword) {
            seen.push(keyword);
        }
    }
    seen
}

#[async_trait]
impl Funnel for KeywordFunnel {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn query_sources(&self, investigation_id: &str) -> Vec<Candidate> {
        self.query_or_empty(
            "source",
            KEYWORD_SOURCE_CANDIDATES,
            &self.source_keywords,
            investigation_id,
        )
        .await
    }

    async fn query_sinks(&self, investigation_id: &str) -> Vec<Candidate> {
        self.query_or_empty(
            "sink",
            KEYWORD_SINK_CANDIDATES,
            &self.sink_keywords,
            investigation_id,
        )
        .await
    }
}
