//! In-memory `GraphPort` adapter
//!
//! The adapter does not interpret query text. Each statement is registered
//! with a handler that computes rows from the parameters and the current
//! store contents; unregistered statements return no rows. Writes go to a
//! plain node/relationship store so handlers can answer lookups over
//! entities created earlier in the same run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use crate::domain::{GraphPort, NodeId, Params, Record};
use crate::error::PortError;
use crate::Result;

/// Node held by the in-memory store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub id: NodeId,
    pub labels: Vec<String>,
    pub properties: Params,
}

impl StoredNode {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Relationship held by the in-memory store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRelationship {
    pub from: NodeId,
    pub to: NodeId,
    pub rel_type: String,
    pub properties: Params,
}

/// One recorded `run_query` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCall {
    pub statement: String,
    pub params: Params,
}

/// Read view handed to query handlers
#[derive(Debug, Default)]
pub struct GraphSnapshot {
    nodes: Vec<StoredNode>,
    relationships: Vec<StoredRelationship>,
}

impl GraphSnapshot {
    pub fn nodes(&self) -> &[StoredNode] {
        &self.nodes
    }

    pub fn relationships(&self) -> &[StoredRelationship] {
        &self.relationships
    }

    pub fn node(&self, id: NodeId) -> Option<&StoredNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Nodes with `label` whose `key` property equals `value`
    pub fn find_nodes(&self, label: &str, key: &str, value: &Value) -> Vec<&StoredNode> {
        self.nodes
            .iter()
            .filter(|n| n.has_label(label) && n.property(key) == Some(value))
            .collect()
    }

    /// Ids of nodes reachable from `from` over one `rel_type` relationship
    pub fn neighbours(&self, from: NodeId, rel_type: &str) -> Vec<NodeId> {
        self.relationships
            .iter()
            .filter(|r| r.from == from && r.rel_type == rel_type)
            .map(|r| r.to)
            .collect()
    }
}

/// Query handler: rows for one statement given its parameters.
pub type QueryHandler = Arc<dyn Fn(&Params, &GraphSnapshot) -> Result<Vec<Record>> + Send + Sync>;

#[derive(Default)]
struct WriteFaults {
    /// Labels whose `create_node` returns `Ok(None)`
    unassigned_labels: HashSet<String>,
    /// Labels whose `create_node` errors
    failing_labels: HashSet<String>,
    /// Relationship types whose creation errors
    failing_relationships: HashSet<String>,
}

/// In-memory graph store
pub struct MemoryGraph {
    store: Mutex<GraphSnapshot>,
    next_id: Mutex<NodeId>,
    handlers: RwLock<HashMap<String, QueryHandler>>,
    failing_statements: RwLock<HashSet<String>>,
    faults: RwLock<WriteFaults>,
    query_log: Mutex<Vec<QueryCall>>,
    create_attempts: Mutex<Vec<Vec<String>>>,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(GraphSnapshot::default()),
            next_id: Mutex::new(1),
            handlers: RwLock::new(HashMap::new()),
            failing_statements: RwLock::new(HashSet::new()),
            faults: RwLock::new(WriteFaults::default()),
            query_log: Mutex::new(Vec::new()),
            create_attempts: Mutex::new(Vec::new()),
        }
    }

    /// Seed a node with a caller-chosen id (fixtures for code entities).
    pub fn insert_node(&self, id: NodeId, labels: &[&str], properties: Params) {
        let mut store = self.store.lock();
        store.nodes.retain(|n| n.id != id);
        store.nodes.push(StoredNode {
            id,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties,
        });
        let mut next = self.next_id.lock();
        if *next <= id {
            *next = id + 1;
        }
    }

    /// Seed a relationship between existing nodes.
    pub fn insert_relationship(&self, from: NodeId, to: NodeId, rel_type: &str) {
        self.store.lock().relationships.push(StoredRelationship {
            from,
            to,
            rel_type: rel_type.to_string(),
            properties: Params::new(),
        });
    }

    /// Register a handler computing the rows of `statement`.
    pub fn on_query<F>(&self, statement: &str, handler: F)
    where
        F: Fn(&Params, &GraphSnapshot) -> Result<Vec<Record>> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .insert(statement.to_string(), Arc::new(handler));
    }

    /// Register fixed rows for `statement`.
    pub fn on_query_rows(&self, statement: &str, rows: Vec<Record>) {
        self.on_query(statement, move |_, _| Ok(rows.clone()));
    }

    /// Make every execution of `statement` fail with a query error.
    pub fn fail_query(&self, statement: &str) {
        self.failing_statements.write().insert(statement.to_string());
    }

    /// Make `create_node` for `label` succeed without assigning an id.
    pub fn withhold_ids_for(&self, label: &str) {
        self.faults.write().unassigned_labels.insert(label.to_string());
    }

    /// Make `create_node` for `label` fail with a write error.
    pub fn fail_writes_for(&self, label: &str) {
        self.faults.write().failing_labels.insert(label.to_string());
    }

    /// Make `create_relationship` of `rel_type` fail with a write error.
    pub fn fail_relationships_of(&self, rel_type: &str) {
        self.faults
            .write()
            .failing_relationships
            .insert(rel_type.to_string());
    }

    pub fn nodes_with_label(&self, label: &str) -> Vec<StoredNode> {
        self.store
            .lock()
            .nodes
            .iter()
            .filter(|n| n.has_label(label))
            .cloned()
            .collect()
    }

    pub fn relationships_of(&self, rel_type: &str) -> Vec<StoredRelationship> {
        self.store
            .lock()
            .relationships
            .iter()
            .filter(|r| r.rel_type == rel_type)
            .cloned()
            .collect()
    }

    pub fn queries(&self) -> Vec<QueryCall> {
        self.query_log.lock().clone()
    }

    pub fn query_count(&self, statement: &str) -> usize {
        self.query_log
            .lock()
            .iter()
            .filter(|call| call.statement == statement)
            .count()
    }

    /// Number of `create_node` calls whose labels include `label`,
    /// successful or not.
    pub fn create_attempts(&self, label: &str) -> usize {
        self.create_attempts
            .lock()
            .iter()
            .filter(|labels| labels.iter().any(|l| l == label))
            .count()
    }
}

#[async_trait]
impl GraphPort for MemoryGraph {
    async fn run_query(&self, statement: &str, params: Params) -> Result<Vec<Record>> {
        self.query_log.lock().push(QueryCall {
            statement: statement.to_string(),
            params: params.clone(),
        });

        if self.failing_statements.read().contains(statement) {
            return Err(PortError::query(format!(
                "scripted failure for statement: {}",
                statement
            )));
        }

        let handler = self.handlers.read().get(statement).cloned();
        match handler {
            Some(handler) => {
                let store = self.store.lock();
                handler(&params, &*store)
            }
            None => {
                debug!("MemoryGraph: no handler for statement, returning no rows");
                Ok(Vec::new())
            }
        }
    }

    async fn create_node(&self, labels: &[&str], properties: Params) -> Result<Option<NodeId>> {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.create_attempts.lock().push(labels.clone());

        {
            let faults = self.faults.read();
            if labels.iter().any(|l| faults.failing_labels.contains(l)) {
                return Err(PortError::write(format!(
                    "scripted write failure for labels {:?}",
                    labels
                )));
            }
            if labels.iter().any(|l| faults.unassigned_labels.contains(l)) {
                return Ok(None);
            }
        }

        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        self.store.lock().nodes.push(StoredNode {
            id,
            labels,
            properties,
        });
        Ok(Some(id))
    }

    async fn create_relationship(
        &self,
        from: NodeId,
        to: NodeId,
        rel_type: &str,
        properties: Params,
    ) -> Result<bool> {
        if self.faults.read().failing_relationships.contains(rel_type) {
            return Err(PortError::write(format!(
                "scripted write failure for relationship {}",
                rel_type
            )));
        }

        let mut store = self.store.lock();
        if store.node(from).is_none() || store.node(to).is_none() {
            return Ok(false);
        }
        store.relationships.push(StoredRelationship {
            from,
            to,
            rel_type: rel_type.to_string(),
            properties,
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::params;
    use crate::PortErrorKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_node_assigns_ids_after_seeded_nodes() {
        let graph = MemoryGraph::new();
        graph.insert_node(10, &["Function"], params([("name", json!("run"))]));

        let id = graph.create_node(&["Source"], params([])).await.unwrap();
        assert_eq!(id, Some(11));
        assert_eq!(graph.nodes_with_label("Source").len(), 1);
        assert_eq!(graph.create_attempts("Source"), 1);
    }

    #[tokio::test]
    async fn test_withheld_ids_are_not_stored() {
        let graph = MemoryGraph::new();
        graph.withhold_ids_for("Source");

        let id = graph.create_node(&["Source"], params([])).await.unwrap();
        assert_eq!(id, None);
        assert!(graph.nodes_with_label("Source").is_empty());
        assert_eq!(graph.create_attempts("Source"), 1);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let graph = MemoryGraph::new();
        graph.fail_writes_for("Sink");

        let err = graph.create_node(&["Sink"], params([])).await.unwrap_err();
        assert_eq!(err.kind, PortErrorKind::Write);
    }

    #[tokio::test]
    async fn test_relationship_requires_both_endpoints() {
        let graph = MemoryGraph::new();
        graph.insert_node(1, &["Function"], params([]));
        graph.insert_node(2, &["Function"], params([]));

        assert!(graph
            .create_relationship(1, 2, "CALLS", params([]))
            .await
            .unwrap());
        assert!(!graph
            .create_relationship(1, 99, "CALLS", params([]))
            .await
            .unwrap());
        assert_eq!(graph.relationships_of("CALLS").len(), 1);
    }

    #[tokio::test]
    async fn test_query_handlers_see_store() {
        let graph = MemoryGraph::new();
        graph.insert_node(5, &["Investigation"], params([("id", json!("inv-1"))]));
        graph.on_query("FIND", |p, snapshot| {
            let id = p.get("id").cloned().unwrap_or(Value::Null);
            Ok(snapshot
                .find_nodes("Investigation", "id", &id)
                .into_iter()
                .map(|n| params([("graph_id", json!(n.id))]))
                .collect())
        });

        let rows = graph
            .run_query("FIND", params([("id", json!("inv-1"))]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["graph_id"], json!(5));

        let none = graph
            .run_query("FIND", params([("id", json!("inv-2"))]))
            .await
            .unwrap();
        assert!(none.is_empty());
        assert_eq!(graph.query_count("FIND"), 2);
    }

    #[tokio::test]
    async fn test_unregistered_and_failing_statements() {
        let graph = MemoryGraph::new();
        assert!(graph.run_query("UNKNOWN", params([])).await.unwrap().is_empty());

        graph.fail_query("BROKEN");
        let err = graph.run_query("BROKEN", params([])).await.unwrap_err();
        assert_eq!(err.kind, PortErrorKind::Query);
    }
}
