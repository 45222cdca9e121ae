//! Graph statements issued by the engine
//!
//! Statements are Cypher. The in-memory adapter keys its handlers on these
//! constants, so tests stay in sync with the real text.

/// Params: `investigation_id`. Rows: `investigation_id`, `node_id`, `graph_id`.
pub const INVESTIGATION_EXISTS: &str = "\
MATCH (i:Investigation {id: $investigation_id})
OPTIONAL MATCH (i)-[:HAS_GRAPH]->(g)
RETURN i.id AS investigation_id, id(i) AS node_id, id(g) AS graph_id
LIMIT 1";

/// Params: `investigation_id`, `keywords`, `limit`.
pub const KEYWORD_SOURCE_CANDIDATES: &str = "\
MATCH (i:Investigation {id: $investigation_id})-[:HAS_GRAPH]->(g)-[:CONTAINS*]->(n)
WHERE (n:Function OR n:Method OR n:Class)
  AND n.summary IS NOT NULL
  AND any(k IN $keywords WHERE toLower(n.summary) CONTAINS k OR toLower(n.name) CONTAINS k)
OPTIONAL MATCH (f:File)-[:CONTAINS*]->(n)
RETURN id(n) AS node_id, n.name AS name, head(labels(n)) AS kind,
       id(f) AS file_node_id, f.path AS file_path,
       n.start_line AS line_number, n.summary AS description, 'source' AS role
LIMIT coalesce($limit, 1000)";

/// Params: `investigation_id`, `keywords`, `limit`.
pub const KEYWORD_SINK_CANDIDATES: &str = "\
MATCH (i:Investigation {id: $investigation_id})-[:HAS_GRAPH]->(g)-[:CONTAINS*]->(n)
WHERE (n:Function OR n:Method OR n:Class)
  AND n.summary IS NOT NULL
  AND any(k IN $keywords WHERE toLower(n.summary) CONTAINS k OR toLower(n.name) CONTAINS k)
OPTIONAL MATCH (f:File)-[:CONTAINS*]->(n)
RETURN id(n) AS node_id, n.name AS name, head(labels(n)) AS kind,
       id(f) AS file_node_id, f.path AS file_path,
       n.start_line AS line_number, n.summary AS description, 'sink' AS role
LIMIT coalesce($limit, 1000)";

/// Params: `node_id`. Rows: `code`, `docstring`, `file_path`.
pub const NODE_CODE: &str = "\
MATCH (n) WHERE id(n) = $node_id
OPTIONAL MATCH (f:File)-[:CONTAINS*]->(n)
RETURN n.code AS code, n.docstring AS docstring, f.path AS file_path";

/// Params: `source_id`, `sink_id`, `max_hops`. Rows: `path_ids`.
pub const CALL_PATH: &str = "\
MATCH (a), (b) WHERE id(a) = $source_id AND id(b) = $sink_id
MATCH p = shortestPath((a)-[:CALLS*1..10]->(b))
WHERE length(p) <= $max_hops
RETURN [x IN nodes(p) | id(x)] AS path_ids
LIMIT 1";

/// Params: `investigation_id`, `node_id`. Rows: `id`.
pub const FIND_SOURCE_BY_NODE_ID: &str = "\
MATCH (s:Source {investigation_id: $investigation_id, node_id: $node_id})
RETURN id(s) AS id
LIMIT 1";

/// Params: `investigation_id`, `node_id`. Rows: `id`.
pub const FIND_SINK_BY_NODE_ID: &str = "\
MATCH (s:Sink {investigation_id: $investigation_id, node_id: $node_id})
RETURN id(s) AS id
LIMIT 1";

// Persisted labels and relationship types
pub const SOURCE_LABEL: &str = "Source";
pub const SINK_LABEL: &str = "Sink";
pub const DATA_FLOW_PATH_LABEL: &str = "DataFlowPath";

pub const REPRESENTS: &str = "REPRESENTS";
pub const IN_FILE: &str = "IN_FILE";
pub const HAS_SOURCE: &str = "HAS_SOURCE";
pub const HAS_SINK: &str = "HAS_SINK";
pub const HAS_DATA_FLOW_PATH: &str = "HAS_DATA_FLOW_PATH";
pub const FLOWS_TO: &str = "FLOWS_TO";
