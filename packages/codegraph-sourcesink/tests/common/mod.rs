//! Shared fixtures for workflow integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use codegraph_ports::{params, MemoryGraph, NodeId, Params, Record};
use codegraph_sourcesink::queries::{
    FIND_SINK_BY_NODE_ID, FIND_SOURCE_BY_NODE_ID, INVESTIGATION_EXISTS, NODE_CODE,
};
use codegraph_sourcesink::{
    Analyzer, Candidate, DataFlowPath, Funnel, ImpactLevel, Result, SinkNode, SourceNode,
    SourceSinkCategory, WorkflowError,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub const INVESTIGATION_ID: &str = "inv-1";
pub const INVESTIGATION_NODE: NodeId = 900;
pub const GRAPH_NODE: NodeId = 901;
pub const FILE_NODE: NodeId = 10;

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

/// Graph with one investigation, one file and handlers for every lookup the
/// engine issues. Code nodes are added with `add_code_node`.
pub fn fixture_graph() -> Arc<MemoryGraph> {
    let graph = Arc::new(MemoryGraph::new());
    graph.insert_node(
        INVESTIGATION_NODE,
        &["Investigation"],
        params([("id", json!(INVESTIGATION_ID))]),
    );
    graph.insert_node(GRAPH_NODE, &["Graph"], Params::new());
    graph.insert_node(FILE_NODE, &["File"], params([("path", json!("app/views.py"))]));
    graph.insert_relationship(INVESTIGATION_NODE, GRAPH_NODE, "HAS_GRAPH");

    graph.on_query(INVESTIGATION_EXISTS, |params, snapshot| {
        Ok(snapshot
            .find_nodes("Investigation", "id", &params["investigation_id"])
            .into_iter()
            .map(|node| {
                record(json!({
                    "investigation_id": node.property("id"),
                    "node_id": node.id,
                    "graph_id": snapshot.neighbours(node.id, "HAS_GRAPH").first(),
                }))
            })
            .collect())
    });

    graph.on_query(NODE_CODE, |params, snapshot| {
        let node = params["node_id"].as_i64().and_then(|id| snapshot.node(id));
        Ok(node
            .filter(|node| node.property("code").is_some())
            .map(|node| {
                vec![record(json!({
                    "code": node.property("code"),
                    "docstring": node.property("docstring"),
                    "file_path": "app/views.py",
                }))]
            })
            .unwrap_or_default())
    });

    for (statement, label) in [
        (FIND_SOURCE_BY_NODE_ID, "Source"),
        (FIND_SINK_BY_NODE_ID, "Sink"),
    ] {
        graph.on_query(statement, move |params, snapshot| {
            Ok(snapshot
                .find_nodes(label, "node_id", &params["node_id"])
                .into_iter()
                .filter(|node| node.property("investigation_id") == Some(&params["investigation_id"]))
                .map(|node| record(json!({"id": node.id})))
                .collect())
        });
    }

    graph
}

/// Add a function node; `code: None` models a node whose code was never ingested.
pub fn add_code_node(
    graph: &MemoryGraph,
    id: NodeId,
    name: &str,
    code: Option<&str>,
    docstring: Option<&str>,
) {
    let mut properties = params([("name", json!(name))]);
    if let Some(code) = code {
        properties.insert("code".into(), json!(code));
    }
    if let Some(docstring) = docstring {
        properties.insert("docstring".into(), json!(docstring));
    }
    graph.insert_node(id, &["Function"], properties);
    graph.insert_relationship(FILE_NODE, id, "CONTAINS");
}

pub fn candidate(id: NodeId, name: &str) -> Candidate {
    Candidate::new(id, name).with_file(FILE_NODE, "app/views.py")
}

// ───────────────────────────────────────────────────────────────────────────
// Stub funnel
// ───────────────────────────────────────────────────────────────────────────

pub struct StubFunnel {
    sources: Vec<Candidate>,
    sinks: Vec<Candidate>,
    calls: AtomicUsize,
    cancel_on_call: Option<CancellationToken>,
}

impl StubFunnel {
    pub fn new(sources: Vec<Candidate>, sinks: Vec<Candidate>) -> Self {
        Self {
            sources,
            sinks,
            calls: AtomicUsize::new(0),
            cancel_on_call: None,
        }
    }

    /// Cancel `token` as soon as the funnel is queried.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_call = Some(token);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Funnel for StubFunnel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn query_sources(&self, _investigation_id: &str) -> Vec<Candidate> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        self.sources.clone()
    }

    async fn query_sinks(&self, _investigation_id: &str) -> Vec<Candidate> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sinks.clone()
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Stub analyzer
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Behaviour {
    Confirm,
    Decline,
    Fail,
}

pub struct StubAnalyzer {
    name: String,
    confidence: f64,
    behaviour: Behaviour,
    paths: Vec<(String, ImpactLevel)>,
    calls: Mutex<Vec<String>>,
}

impl StubAnalyzer {
    fn build(name: &str, confidence: f64, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            confidence,
            behaviour,
            paths: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Confirms every candidate with `confidence`.
    pub fn confirming(name: &str, confidence: f64) -> Self {
        Self::build(name, confidence, Behaviour::Confirm)
    }

    pub fn declining(name: &str) -> Self {
        Self::build(name, 0.0, Behaviour::Decline)
    }

    /// Errors on every candidate and on flow synthesis.
    pub fn failing(name: &str) -> Self {
        Self::build(name, 0.0, Behaviour::Fail)
    }

    /// Propose one path from the first source to the first sink.
    pub fn with_path(mut self, vulnerability: &str, impact: ImpactLevel) -> Self {
        self.paths.push((vulnerability.to_string(), impact));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn judge(&self, role: &str, candidate: &Candidate) -> Result<bool> {
        self.calls
            .lock()
            .push(format!("{}:{}", role, candidate.node_id));
        match self.behaviour {
            Behaviour::Confirm => Ok(true),
            Behaviour::Decline => Ok(false),
            Behaviour::Fail => Err(WorkflowError::parse(format!(
                "{} cannot read candidate {}",
                self.name, candidate.node_id
            ))),
        }
    }
}

#[async_trait]
impl Analyzer for StubAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze_source(
        &self,
        candidate: &Candidate,
        _investigation_id: &str,
    ) -> Result<Option<SourceNode>> {
        Ok(self.judge("source", candidate)?.then(|| {
            SourceNode::from_candidate(
                candidate,
                SourceSinkCategory::UserInput,
                self.confidence,
                format!("confirmed by {}", self.name),
            )
        }))
    }

    async fn analyze_sink(
        &self,
        candidate: &Candidate,
        _investigation_id: &str,
    ) -> Result<Option<SinkNode>> {
        Ok(self.judge("sink", candidate)?.then(|| {
            SinkNode::from_candidate(
                candidate,
                SourceSinkCategory::DatabaseWrite,
                self.confidence,
                format!("confirmed by {}", self.name),
            )
        }))
    }

    async fn analyze_data_flow(
        &self,
        sources: &[SourceNode],
        sinks: &[SinkNode],
        _investigation_id: &str,
    ) -> Result<Vec<DataFlowPath>> {
        self.calls.lock().push("flow".to_string());
        if let Behaviour::Fail = self.behaviour {
            return Err(WorkflowError::parse(format!("{} cannot trace flows", self.name)));
        }
        let (Some(source), Some(sink)) = (sources.first(), sinks.first()) else {
            return Ok(Vec::new());
        };
        Ok(self
            .paths
            .iter()
            .map(|(vulnerability, impact)| {
                DataFlowPath::new(source.clone(), sink.clone(), vulnerability.clone())
                    .with_impact(*impact)
                    .with_confidence(self.confidence)
                    .with_recommendations(vec!["Use parameterized queries".to_string()])
            })
            .collect())
    }
}
