//! Integration tests for the default funnel and analyzers
//!
//! Runs `SourceSinkWorkflow::with_defaults` against the in-memory graph and a
//! scripted completion service.

mod common;

use std::sync::Arc;

use codegraph_ports::{CompletionPort, MemoryGraph, ScriptedCompletion};
use codegraph_sourcesink::queries::{
    CALL_PATH, KEYWORD_SINK_CANDIDATES, KEYWORD_SOURCE_CANDIDATES, NODE_CODE,
};
use codegraph_sourcesink::{
    ImpactLevel, SourceSinkCategory, SourceSinkWorkflow, WorkflowConfig, WorkflowError,
};
use common::{add_code_node, fixture_graph, record, FILE_NODE, INVESTIGATION_ID};
use pretty_assertions::assert_eq;
use serde_json::json;

fn candidate_row(id: i64, name: &str, summary: &str) -> codegraph_ports::Record {
    record(json!({
        "node_id": id,
        "name": name,
        "kind": "Function",
        "file_node_id": FILE_NODE,
        "file_path": "app/views.py",
        "line_number": id * 10,
        "description": summary,
        "role": "source",
    }))
}

fn seeded_graph() -> Arc<MemoryGraph> {
    let graph = fixture_graph();
    add_code_node(
        &graph,
        1,
        "get_user_input",
        Some("def get_user_input(request):\n    return request.form['q']"),
        Some("Reads the search form from the HTTP request"),
    );
    add_code_node(
        &graph,
        2,
        "execute_query",
        Some("def execute_query(q):\n    cursor.execute('SELECT * FROM t WHERE x=' + q)"),
        Some("Runs raw SQL against the database"),
    );
    graph.on_query_rows(
        KEYWORD_SOURCE_CANDIDATES,
        vec![candidate_row(1, "get_user_input", "Reads user input")],
    );
    graph.on_query_rows(
        KEYWORD_SINK_CANDIDATES,
        vec![candidate_row(2, "execute_query", "Executes a query")],
    );
    graph.on_query_rows(CALL_PATH, vec![record(json!({"path_ids": [1, 2]}))]);
    graph
}

#[tokio::test]
async fn test_documentation_only_pipeline() {
    let graph = seeded_graph();
    let workflow =
        SourceSinkWorkflow::with_defaults(graph.clone(), None, WorkflowConfig::default()).unwrap();

    let result = workflow.run(INVESTIGATION_ID).await.unwrap();

    assert_eq!(result.metadata["analyzers"], json!(["documentation"]));
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].category, SourceSinkCategory::UserInput);
    assert_eq!(result.sources[0].line_number, Some(10));
    assert_eq!(result.sinks[0].category, SourceSinkCategory::DatabaseWrite);

    assert_eq!(result.data_flow_paths.len(), 1);
    let path = &result.data_flow_paths[0];
    assert_eq!(path.vulnerability_type, "SQL Injection");
    assert_eq!(path.impact, ImpactLevel::Medium);
    assert_eq!(path.confidence, 0.6);
    assert!(path.intermediate_nodes.is_empty());

    // funnel parameters come from the config
    let call = graph
        .queries()
        .into_iter()
        .find(|q| q.statement == KEYWORD_SOURCE_CANDIDATES)
        .unwrap();
    assert_eq!(call.params["investigation_id"], json!(INVESTIGATION_ID));
    assert!(call.params["keywords"]
        .as_array()
        .unwrap()
        .contains(&json!("input")));

    let source_entity = &graph.nodes_with_label("Source")[0];
    assert_eq!(source_entity.property("category"), Some(&json!("user_input")));
    assert_eq!(graph.relationships_of("IN_FILE").len(), 2);
}

#[tokio::test]
async fn test_candidate_without_code_is_skipped() {
    let graph = fixture_graph();
    add_code_node(
        &graph,
        1,
        "get_user_input",
        Some("def get_user_input(request): return request.form"),
        Some("Reads the request form"),
    );
    add_code_node(&graph, 3, "read_cookie", None, Some("Reads a cookie header"));
    graph.on_query_rows(
        KEYWORD_SOURCE_CANDIDATES,
        vec![
            candidate_row(1, "get_user_input", "Reads user input"),
            candidate_row(3, "read_cookie", "Reads a cookie"),
        ],
    );
    let workflow =
        SourceSinkWorkflow::with_defaults(graph.clone(), None, WorkflowConfig::default()).unwrap();

    let result = workflow.run(INVESTIGATION_ID).await.unwrap();

    assert_eq!(result.metadata["candidate_counts"], json!({"sources": 2, "sinks": 0}));
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].node_id, 1);
    assert!(result.sinks.is_empty());
    assert!(result.data_flow_paths.is_empty());
    assert_eq!(graph.query_count(NODE_CODE), 2);
}

#[tokio::test]
async fn test_failing_funnel_query_degrades_to_empty() {
    let graph = seeded_graph();
    graph.fail_query(KEYWORD_SOURCE_CANDIDATES);
    let workflow =
        SourceSinkWorkflow::with_defaults(graph.clone(), None, WorkflowConfig::default()).unwrap();

    let result = workflow.run(INVESTIGATION_ID).await.unwrap();

    assert!(result.sources.is_empty());
    assert_eq!(result.sinks.len(), 1);
    assert!(result.data_flow_paths.is_empty());
    assert_eq!(graph.query_count(CALL_PATH), 0);
}

#[tokio::test]
async fn test_llm_pipeline_end_to_end() {
    let graph = seeded_graph();
    let llm = Arc::new(
        ScriptedCompletion::new("Nothing to report.")
            .respond_when(
                "Name: get_user_input",
                "This function is a source of user input; it definitely reads the request.",
            )
            .respond_when(
                "Name: execute_query",
                "This function is a sink. It likely writes to the database with raw SQL.",
            )
            .respond_when(
                "- get_user_input (user_input)",
                "Vulnerability: SQL Injection\n\
                 Impact: High\n\
                 Description: The search term is likely concatenated into SQL.\n\
                 Recommendation: Use parameterized queries\n\
                 Source: get_user_input\n\
                 Sink: execute_query\n",
            )
            .respond_when(
                "Investigation: inv-1",
                "One high impact SQL injection path needs review.",
            ),
    );
    let completion: Arc<dyn CompletionPort> = llm.clone();
    let workflow =
        SourceSinkWorkflow::with_defaults(graph.clone(), Some(completion), WorkflowConfig::default())
            .unwrap();

    let result = workflow.run(INVESTIGATION_ID).await.unwrap();

    assert_eq!(result.metadata["analyzers"], json!(["llm", "documentation"]));

    // the LLM analyzer is registered first, so it confirms both candidates
    assert_eq!(result.sources[0].confidence, 0.9);
    assert_eq!(result.sources[0].metadata["analyzer"], json!("llm"));
    assert_eq!(result.sinks[0].confidence, 0.7);
    assert_eq!(result.sinks[0].category, SourceSinkCategory::DatabaseWrite);

    // LLM extraction and call-path adjacency both contribute
    assert_eq!(result.data_flow_paths.len(), 2);
    assert_eq!(result.data_flow_paths[0].impact, ImpactLevel::High);
    assert_eq!(
        result.data_flow_paths[0].recommendations,
        vec!["Use parameterized queries"]
    );
    assert_eq!(result.data_flow_paths[1].metadata["analyzer"], json!("documentation"));

    assert_eq!(result.summary, "One high impact SQL injection path needs review.");
    assert_eq!(graph.nodes_with_label("DataFlowPath").len(), 2);

    // two confirmations, one flow prompt, one summary
    assert_eq!(llm.call_count(), 4);
    let markdown = result.to_markdown();
    assert!(markdown.contains("### Path 1: SQL Injection"));
    assert!(markdown.contains("### Path 2: SQL Injection"));
}

#[tokio::test]
async fn test_summary_failure_falls_back_to_counts() {
    let graph = seeded_graph();
    let llm: Arc<dyn CompletionPort> = Arc::new(
        ScriptedCompletion::new("I am unsure.").fail_when("Investigation: inv-1", "quota exceeded"),
    );
    let workflow =
        SourceSinkWorkflow::with_defaults(graph, Some(llm), WorkflowConfig::default()).unwrap();

    let result = workflow.run(INVESTIGATION_ID).await.unwrap();

    // LLM declines, documentation analyzer confirms
    assert_eq!(result.sources[0].metadata["analyzer"], json!("documentation"));
    assert!(result.summary.starts_with("Identified 1 sources (user_input: 1)"));
}

#[tokio::test]
async fn test_required_llm_missing() {
    let config = WorkflowConfig {
        require_llm: true,
        ..Default::default()
    };
    let graph = seeded_graph();
    let workflow = SourceSinkWorkflow::with_defaults(graph.clone(), None, config).unwrap();

    let err = workflow.run(INVESTIGATION_ID).await.unwrap_err();

    assert!(matches!(err, WorkflowError::CompletionServiceMissing));
    assert!(err.category().is_fatal());
    assert!(graph.queries().is_empty());
}
