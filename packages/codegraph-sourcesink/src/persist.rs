//! Write-back of confirmed entities
//!
//! Persistence is additive: every run creates new `Source`, `Sink` and
//! `DataFlowPath` nodes and never updates or deletes. Sources and sinks are
//! written first; each path then re-queries its endpoints by the original
//! code `node_id`. A path whose source or sink did not persist in this run is
//! skipped without a create call.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use codegraph_ports::{params, GraphPort, NodeId, Params, Record, RecordExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{ErrorCategory, Result, WorkflowError};
use crate::model::{DataFlowPath, FlowEndpoint, Metadata, SinkNode, SourceNode};
use crate::queries::{
    DATA_FLOW_PATH_LABEL, FIND_SINK_BY_NODE_ID, FIND_SOURCE_BY_NODE_ID, FLOWS_TO,
    HAS_DATA_FLOW_PATH, HAS_SINK, HAS_SOURCE, IN_FILE, REPRESENTS, SINK_LABEL, SOURCE_LABEL,
};

/// Investigation as found in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct Investigation {
    pub id: String,
    pub node_id: Option<NodeId>,
    pub graph_id: Option<NodeId>,
}

impl Investigation {
    pub fn from_record(id: &str, record: &Record) -> Self {
        Self {
            id: record
                .get_non_empty("investigation_id")
                .unwrap_or_else(|| id.to_string()),
            node_id: record.get_i64("node_id"),
            graph_id: record.get_i64("graph_id"),
        }
    }

    /// Node that owns persisted entities: the code graph if the
    /// investigation has one, otherwise the investigation itself.
    pub fn owner_node(&self) -> Option<NodeId> {
        self.graph_id.or(self.node_id)
    }
}

/// Entities that reached the graph, and writes that failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistCounts {
    pub sources: usize,
    pub sinks: usize,
    pub paths: usize,
    /// Failed or unassigned creates plus failed links; skipped paths are not counted
    pub failed: usize,
}

pub struct Persister<'a> {
    graph: &'a dyn GraphPort,
    investigation: &'a Investigation,
    failed: AtomicUsize,
}

impl<'a> Persister<'a> {
    pub fn new(graph: &'a dyn GraphPort, investigation: &'a Investigation) -> Self {
        Self {
            graph,
            investigation,
            failed: AtomicUsize::new(0),
        }
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Persist everything; individual failures are logged and skipped.
    pub async fn persist_all(
        &self,
        sources: &[SourceNode],
        sinks: &[SinkNode],
        paths: &[DataFlowPath],
    ) -> PersistCounts {
        let mut counts = PersistCounts::default();
        let mut persisted_sources = HashSet::new();
        let mut persisted_sinks = HashSet::new();

        for source in sources {
            match self.persist_endpoint(SOURCE_LABEL, HAS_SOURCE, source).await {
                Ok(true) => {
                    counts.sources += 1;
                    persisted_sources.insert(source.node_id);
                }
                Ok(false) => {
                    self.record_failure();
                    warn!(
                        category = %ErrorCategory::Persistence,
                        "Persist: source {} ({}) was not assigned an id",
                        source.name, source.node_id
                    );
                }
                Err(e) => {
                    self.record_failure();
                    warn!(
                        category = %ErrorCategory::Persistence,
                        "Persist: source {} ({}) failed: {}",
                        source.name, source.node_id, e
                    );
                }
            }
        }

        for sink in sinks {
            match self.persist_endpoint(SINK_LABEL, HAS_SINK, sink).await {
                Ok(true) => {
                    counts.sinks += 1;
                    persisted_sinks.insert(sink.node_id);
                }
                Ok(false) => {
                    self.record_failure();
                    warn!(
                        category = %ErrorCategory::Persistence,
                        "Persist: sink {} ({}) was not assigned an id",
                        sink.name, sink.node_id
                    );
                }
                Err(e) => {
                    self.record_failure();
                    warn!(
                        category = %ErrorCategory::Persistence,
                        "Persist: sink {} ({}) failed: {}",
                        sink.name, sink.node_id, e
                    );
                }
            }
        }

        for path in paths {
            if !persisted_sources.contains(&path.source_node.node_id)
                || !persisted_sinks.contains(&path.sink_node.node_id)
            {
                debug!(
                    "Persist: skipping path {} -> {}, an endpoint did not persist",
                    path.source_node.name, path.sink_node.name
                );
                continue;
            }
            match self.persist_path(path).await {
                Ok(true) => counts.paths += 1,
                Ok(false) => self.record_failure(),
                Err(e) => {
                    self.record_failure();
                    warn!(
                        category = %ErrorCategory::Persistence,
                        "Persist: path {} -> {} failed: {}",
                        path.source_node.name, path.sink_node.name, e
                    );
                }
            }
        }

        counts.failed = self.failed.load(Ordering::Relaxed);
        info!(
            "Persist: investigation {} wrote {} sources, {} sinks, {} paths ({} failed writes)",
            self.investigation.id, counts.sources, counts.sinks, counts.paths, counts.failed
        );
        counts
    }

    async fn create_node(&self, label: &str, properties: Params) -> Result<Option<NodeId>> {
        self.graph
            .create_node(&[label], properties)
            .await
            .map_err(WorkflowError::Graph)
    }

    /// Link two nodes; a failed link is logged and does not undo the node.
    async fn link(&self, from: NodeId, to: NodeId, rel_type: &str) {
        match self.graph.create_relationship(from, to, rel_type, Params::new()).await {
            Ok(true) => {}
            Ok(false) => debug!("Persist: {} {} -> {} had no endpoint", rel_type, from, to),
            Err(e) => {
                self.record_failure();
                warn!(
                    category = %ErrorCategory::Persistence,
                    "Persist: {} {} -> {} failed: {}",
                    rel_type, from, to, e
                );
            }
        }
    }

    async fn persist_endpoint<T>(&self, label: &str, owner_rel: &str, node: &T) -> Result<bool>
    where
        T: FlowEndpoint + Serialize,
    {
        let properties = endpoint_properties(&self.investigation.id, node)?;
        let Some(entity_id) = self.create_node(label, properties).await? else {
            return Ok(false);
        };

        self.link(entity_id, node.node_id(), REPRESENTS).await;
        if let Some(file_node_id) = node.file_node_id() {
            self.link(entity_id, file_node_id, IN_FILE).await;
        }
        if let Some(owner) = self.investigation.owner_node() {
            self.link(owner, entity_id, owner_rel).await;
        }
        Ok(true)
    }

    async fn find_entity(&self, statement: &str, node_id: NodeId) -> Result<Option<NodeId>> {
        let rows = self
            .graph
            .run_query(
                statement,
                params([
                    ("investigation_id", json!(self.investigation.id)),
                    ("node_id", json!(node_id)),
                ]),
            )
            .await
            .map_err(WorkflowError::Graph)?;
        Ok(rows.first().and_then(|row| row.get_i64("id")))
    }

    async fn persist_path(&self, path: &DataFlowPath) -> Result<bool> {
        let Some(source_entity) = self
            .find_entity(FIND_SOURCE_BY_NODE_ID, path.source_node.node_id)
            .await?
        else {
            warn!(
                category = %ErrorCategory::Persistence,
                "Persist: source entity for node {} not found",
                path.source_node.node_id
            );
            return Ok(false);
        };
        let Some(sink_entity) = self
            .find_entity(FIND_SINK_BY_NODE_ID, path.sink_node.node_id)
            .await?
        else {
            warn!(
                category = %ErrorCategory::Persistence,
                "Persist: sink entity for node {} not found",
                path.sink_node.node_id
            );
            return Ok(false);
        };

        let properties = path_properties(&self.investigation.id, path)?;
        let Some(path_entity) = self.create_node(DATA_FLOW_PATH_LABEL, properties).await? else {
            warn!(
                category = %ErrorCategory::Persistence,
                "Persist: path {} -> {} was not assigned an id",
                path.source_node.name, path.sink_node.name
            );
            return Ok(false);
        };

        self.link(source_entity, path_entity, FLOWS_TO).await;
        self.link(path_entity, sink_entity, FLOWS_TO).await;
        if let Some(owner) = self.investigation.owner_node() {
            self.link(owner, path_entity, HAS_DATA_FLOW_PATH).await;
        }
        Ok(true)
    }
}

/// Graph stores take scalar and list properties only, so the open
/// metadata bag is stored as a JSON string.
fn metadata_json(metadata: &Metadata) -> Result<Value> {
    serde_json::to_string(metadata)
        .map(Value::String)
        .map_err(WorkflowError::serialization)
}

fn endpoint_properties<T: Serialize>(investigation_id: &str, node: &T) -> Result<Params> {
    let mut properties = match serde_json::to_value(node).map_err(WorkflowError::serialization)? {
        Value::Object(map) => map,
        _ => return Err(WorkflowError::serialization("endpoint is not a JSON object")),
    };
    let metadata = match properties.remove("metadata") {
        Some(Value::Object(map)) => map,
        _ => Metadata::new(),
    };
    properties.retain(|_, value| !value.is_null());
    properties.insert("metadata".to_string(), metadata_json(&metadata)?);
    properties.insert("investigation_id".to_string(), json!(investigation_id));
    Ok(properties)
}

fn path_properties(investigation_id: &str, path: &DataFlowPath) -> Result<Params> {
    Ok(params([
        ("investigation_id", json!(investigation_id)),
        ("source_node_id", json!(path.source_node.node_id)),
        ("sink_node_id", json!(path.sink_node.node_id)),
        ("intermediate_nodes", json!(path.intermediate_nodes)),
        ("vulnerability_type", json!(path.vulnerability_type)),
        ("impact", json!(path.impact)),
        ("description", json!(path.description)),
        ("recommendations", json!(path.recommendations)),
        ("confidence", json!(path.confidence)),
        ("metadata", metadata_json(&path.metadata)?),
    ]))
}
