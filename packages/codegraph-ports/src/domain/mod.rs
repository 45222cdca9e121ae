//! Port traits and row types shared by every engine
//!
//! # Port Traits
//!
//! - `GraphPort`: parameterized queries plus additive node/relationship writes
//! - `CompletionPort`: single-shot text completion
//!
//! # Row Types
//!
//! Query results are row-like JSON maps. `RecordExt` reads columns leniently:
//! graph stores disagree on whether ids come back as numbers or strings, and
//! optional properties are frequently `null`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::PortError;
use crate::Result;

/// Opaque graph-assigned identifier of a node.
pub type NodeId = i64;

/// One result row, keyed by returned column name.
pub type Record = Map<String, Value>;

/// Query parameters and node/relationship properties.
pub type Params = Map<String, Value>;

/// Build a parameter map from `(name, value)` pairs.
///
/// ```rust
/// use codegraph_ports::params;
/// use serde_json::json;
///
/// let p = params([("node_id", json!(42)), ("name", json!("run"))]);
/// assert_eq!(p["node_id"], json!(42));
/// ```
pub fn params<const N: usize>(entries: [(&str, Value); N]) -> Params {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Lenient typed access to record columns
pub trait RecordExt {
    /// Integer column; numeric strings are accepted.
    fn get_i64(&self, column: &str) -> Option<i64>;

    /// String column; numbers and booleans are rendered, `null` is `None`.
    fn get_string(&self, column: &str) -> Option<String>;

    /// Non-empty string column.
    fn get_non_empty(&self, column: &str) -> Option<String> {
        self.get_string(column)
            .filter(|value| !value.trim().is_empty())
    }

    /// Integer list column (e.g. node ids along a path); non-integers are dropped.
    fn get_i64_list(&self, column: &str) -> Vec<i64>;

    /// Required integer column.
    fn require_i64(&self, column: &str) -> Result<i64> {
        self.get_i64(column)
            .ok_or_else(|| PortError::invalid_record(column, "an integer"))
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl RecordExt for Record {
    fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(value_as_i64)
    }

    fn get_string(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn get_i64_list(&self, column: &str) -> Vec<i64> {
        match self.get(column) {
            Some(Value::Array(items)) => items.iter().filter_map(value_as_i64).collect(),
            _ => Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait: GraphPort
// ═══════════════════════════════════════════════════════════════════════════

/// Code property graph abstraction
///
/// Writes are additive: engines never update or delete through this port.
/// Node/relationship creation is synchronous from the caller's point of view,
/// and the returned id is usable in subsequent queries of the same run.
///
/// # Implementations
///
/// - `MemoryGraph`: in-process adapter with scripted query handlers
#[async_trait]
pub trait GraphPort: Send + Sync {
    /// Run a parameterized statement and return its rows.
    async fn run_query(&self, statement: &str, params: Params) -> Result<Vec<Record>>;

    /// Create a node carrying `labels` and `properties`.
    ///
    /// # Returns
    ///
    /// The graph-assigned id, or `None` when the store accepted the call but
    /// did not hand back an id. Callers must treat `None` as "not persisted".
    async fn create_node(&self, labels: &[&str], properties: Params) -> Result<Option<NodeId>>;

    /// Create a directed `rel_type` relationship between two existing nodes.
    ///
    /// # Returns
    ///
    /// `false` when either endpoint could not be matched.
    async fn create_relationship(
        &self,
        from: NodeId,
        to: NodeId,
        rel_type: &str,
        properties: Params,
    ) -> Result<bool>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait: CompletionPort
// ═══════════════════════════════════════════════════════════════════════════

/// Text-completion service abstraction
///
/// One call is one stateless conversation turn: a system prompt, a user
/// prompt, and the full response text. No streaming.
#[async_trait]
pub trait CompletionPort: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String>;
}
