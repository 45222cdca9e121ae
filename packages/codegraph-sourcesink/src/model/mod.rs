//! Sources, sinks and data-flow paths
//!
//! # Domain Models
//!
//! - `Candidate`: raw funnel row, not yet judged
//! - `SourceNode` / `SinkNode`: a confirmed graph entity with category and confidence
//! - `DataFlowPath`: an asserted (source, sink) pair with a vulnerability hypothesis
//! - `AnalysisResult`: everything one run produced
//!
//! Confirmed nodes and paths are value objects: analyzers build them once and
//! nothing downstream mutates them. Every type serializes to a JSON map with
//! enumerations rendered as their snake_case tag, and parses back from it.

pub mod report;

use codegraph_ports::{NodeId, Record, RecordExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WorkflowError};

/// Open key-value bag carried by nodes, paths and results
pub type Metadata = Map<String, Value>;

// ═══════════════════════════════════════════════════════════════════════════
// Enumerations
// ═══════════════════════════════════════════════════════════════════════════

/// Kind of source or sink
///
/// `Unknown` is a valid classification, not an error: analyzers use it when
/// they are sure about the role but not the channel. Unrecognized tags parse
/// as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSinkCategory {
    // Sources
    UserInput,
    DatabaseRead,
    FileRead,
    NetworkReceive,
    EnvironmentVariable,
    Configuration,
    // Sinks
    DatabaseWrite,
    FileWrite,
    NetworkSend,
    CommandExecution,
    MarkupRendering,
    Logging,
    ResponseGeneration,
    #[serde(other)]
    Unknown,
}

impl SourceSinkCategory {
    pub const SOURCE_KINDS: [SourceSinkCategory; 6] = [
        SourceSinkCategory::UserInput,
        SourceSinkCategory::DatabaseRead,
        SourceSinkCategory::FileRead,
        SourceSinkCategory::NetworkReceive,
        SourceSinkCategory::EnvironmentVariable,
        SourceSinkCategory::Configuration,
    ];

    pub const SINK_KINDS: [SourceSinkCategory; 7] = [
        SourceSinkCategory::DatabaseWrite,
        SourceSinkCategory::FileWrite,
        SourceSinkCategory::NetworkSend,
        SourceSinkCategory::CommandExecution,
        SourceSinkCategory::MarkupRendering,
        SourceSinkCategory::Logging,
        SourceSinkCategory::ResponseGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSinkCategory::UserInput => "user_input",
            SourceSinkCategory::DatabaseRead => "database_read",
            SourceSinkCategory::FileRead => "file_read",
            SourceSinkCategory::NetworkReceive => "network_receive",
            SourceSinkCategory::EnvironmentVariable => "environment_variable",
            SourceSinkCategory::Configuration => "configuration",
            SourceSinkCategory::DatabaseWrite => "database_write",
            SourceSinkCategory::FileWrite => "file_write",
            SourceSinkCategory::NetworkSend => "network_send",
            SourceSinkCategory::CommandExecution => "command_execution",
            SourceSinkCategory::MarkupRendering => "markup_rendering",
            SourceSinkCategory::Logging => "logging",
            SourceSinkCategory::ResponseGeneration => "response_generation",
            SourceSinkCategory::Unknown => "unknown",
        }
    }

    /// Strict parse; unlike deserialization, unrecognized tags are errors.
    pub fn from_str(s: &str) -> Result<Self> {
        SourceSinkCategory::SOURCE_KINDS
            .iter()
            .chain(SourceSinkCategory::SINK_KINDS.iter())
            .chain(std::iter::once(&SourceSinkCategory::Unknown))
            .copied()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| WorkflowError::parse(format!("Invalid category: {}", s)))
    }

    pub fn is_source_kind(&self) -> bool {
        SourceSinkCategory::SOURCE_KINDS.contains(self)
    }

    pub fn is_sink_kind(&self) -> bool {
        SourceSinkCategory::SINK_KINDS.contains(self)
    }
}

impl std::fmt::Display for SourceSinkCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse severity used to rank flow paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    High,
    #[default]
    Medium,
    Low,
    Informational,
}

impl ImpactLevel {
    pub const ALL: [ImpactLevel; 4] = [
        ImpactLevel::High,
        ImpactLevel::Medium,
        ImpactLevel::Low,
        ImpactLevel::Informational,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::High => "high",
            ImpactLevel::Medium => "medium",
            ImpactLevel::Low => "low",
            ImpactLevel::Informational => "informational",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        ImpactLevel::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| WorkflowError::parse(format!("Invalid impact level: {}", s)))
    }

    /// Lenient parse of free text such as "High", "critical" or "info".
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        if label.starts_with("crit") || label.starts_with("high") {
            Some(ImpactLevel::High)
        } else if label.starts_with("med") || label.starts_with("moderate") {
            Some(ImpactLevel::Medium)
        } else if label.starts_with("low") {
            Some(ImpactLevel::Low)
        } else if label.starts_with("info") || label.starts_with("none") {
            Some(ImpactLevel::Informational)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Clamp a confidence score into [0.0, 1.0]; NaN becomes 0.0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Candidates
// ═══════════════════════════════════════════════════════════════════════════

/// Funnel output: a graph entity that might be a source or sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub node_id: NodeId,
    #[serde(default)]
    pub name: String,
    /// Graph label of the entity (Function, Method, Class)
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub file_node_id: Option<NodeId>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub line_number: Option<u32>,
    /// Existing human or machine summary of the code
    #[serde(default)]
    pub description: String,
    /// Columns the funnel returned beyond the known ones
    #[serde(default)]
    pub extra: Metadata,
}

pub type SourceCandidate = Candidate;
pub type SinkCandidate = Candidate;

const CANDIDATE_COLUMNS: [&str; 8] = [
    "node_id",
    "name",
    "kind",
    "file_node_id",
    "file_path",
    "line_number",
    "description",
    "summary",
];

impl Candidate {
    pub fn new(node_id: NodeId, name: impl Into<String>) -> Self {
        Self {
            node_id,
            name: name.into(),
            kind: None,
            file_node_id: None,
            file_path: None,
            line_number: None,
            description: String::new(),
            extra: Metadata::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_file(mut self, file_node_id: NodeId, file_path: impl Into<String>) -> Self {
        self.file_node_id = Some(file_node_id);
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_line(mut self, line_number: u32) -> Self {
        self.line_number = Some(line_number);
        self
    }

    /// Parse a funnel row. Only `node_id` is required; `summary` is accepted
    /// as an alias of `description`.
    pub fn from_record(record: &Record) -> Result<Self> {
        let node_id = record.require_i64("node_id").map_err(WorkflowError::Graph)?;
        let description = record
            .get_non_empty("description")
            .or_else(|| record.get_non_empty("summary"))
            .unwrap_or_default();

        let extra = record
            .iter()
            .filter(|(key, _)| !CANDIDATE_COLUMNS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            node_id,
            name: record.get_string("name").unwrap_or_default(),
            kind: record.get_non_empty("kind"),
            file_node_id: record.get_i64("file_node_id"),
            file_path: record.get_non_empty("file_path"),
            line_number: record
                .get_i64("line_number")
                .and_then(|line| u32::try_from(line).ok()),
            description,
            extra,
        })
    }

    pub fn is_class(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|kind| kind.eq_ignore_ascii_case("class"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Confirmed endpoints
// ═══════════════════════════════════════════════════════════════════════════

/// Accessors shared by sources and sinks
pub trait FlowEndpoint {
    fn node_id(&self) -> NodeId;
    fn name(&self) -> &str;
    fn category(&self) -> SourceSinkCategory;
    fn file_node_id(&self) -> Option<NodeId>;
    fn confidence(&self) -> f64;
    fn description(&self) -> &str;
}

macro_rules! flow_endpoint {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub node_id: NodeId,
            #[serde(default)]
            pub name: String,
            #[serde(default = "unknown_category")]
            pub category: SourceSinkCategory,
            #[serde(default)]
            pub file_node_id: Option<NodeId>,
            #[serde(default)]
            pub function_node_id: Option<NodeId>,
            #[serde(default)]
            pub class_node_id: Option<NodeId>,
            #[serde(default)]
            pub line_number: Option<u32>,
            #[serde(default)]
            pub description: String,
            #[serde(default)]
            pub confidence: f64,
            #[serde(default)]
            pub metadata: Metadata,
        }

        impl $name {
            pub fn new(node_id: NodeId, name: impl Into<String>, category: SourceSinkCategory) -> Self {
                Self {
                    node_id,
                    name: name.into(),
                    category,
                    file_node_id: None,
                    function_node_id: None,
                    class_node_id: None,
                    line_number: None,
                    description: String::new(),
                    confidence: 0.0,
                    metadata: Metadata::new(),
                }
            }

            /// Confirmed node for `candidate`; the candidate's own id fills the
            /// function or class self-reference depending on its kind.
            pub fn from_candidate(
                candidate: &Candidate,
                category: SourceSinkCategory,
                confidence: f64,
                description: impl Into<String>,
            ) -> Self {
                let mut node = Self::new(candidate.node_id, candidate.name.clone(), category)
                    .with_confidence(confidence)
                    .with_description(description);
                node.file_node_id = candidate.file_node_id;
                node.line_number = candidate.line_number;
                if candidate.is_class() {
                    node.class_node_id = Some(candidate.node_id);
                } else {
                    node.function_node_id = Some(candidate.node_id);
                }
                if let Some(path) = &candidate.file_path {
                    node.metadata
                        .insert("file_path".to_string(), Value::String(path.clone()));
                }
                node
            }

            pub fn with_confidence(mut self, confidence: f64) -> Self {
                self.confidence = clamp_confidence(confidence);
                self
            }

            pub fn with_description(mut self, description: impl Into<String>) -> Self {
                self.description = description.into();
                self
            }

            pub fn with_file(mut self, file_node_id: NodeId) -> Self {
                self.file_node_id = Some(file_node_id);
                self
            }

            pub fn with_line(mut self, line_number: u32) -> Self {
                self.line_number = Some(line_number);
                self
            }

            pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
                self.metadata.insert(key.into(), value);
                self
            }

            /// File path recorded at confirmation time, if the funnel knew it
            pub fn file_path(&self) -> Option<&str> {
                self.metadata.get("file_path").and_then(Value::as_str)
            }

            pub fn to_map(&self) -> Result<Metadata> {
                to_map(self)
            }

            pub fn from_map(map: &Metadata) -> Result<Self> {
                from_map(map)
            }
        }

        impl FlowEndpoint for $name {
            fn node_id(&self) -> NodeId {
                self.node_id
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn category(&self) -> SourceSinkCategory {
                self.category
            }

            fn file_node_id(&self) -> Option<NodeId> {
                self.file_node_id
            }

            fn confidence(&self) -> f64 {
                self.confidence
            }

            fn description(&self) -> &str {
                &self.description
            }
        }
    };
}

fn unknown_category() -> SourceSinkCategory {
    SourceSinkCategory::Unknown
}

flow_endpoint!(
    /// A graph entity confirmed to bring untrusted data into the program
    SourceNode
);

flow_endpoint!(
    /// A graph entity confirmed to move data out of the program or into a
    /// dangerous operation
    SinkNode
);

// ═══════════════════════════════════════════════════════════════════════════
// Data-flow paths
// ═══════════════════════════════════════════════════════════════════════════

/// Asserted flow from a confirmed source to a confirmed sink
///
/// `intermediate_nodes` may be empty: a path does not need to be fully
/// resolved to be worth reviewing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowPath {
    pub source_node: SourceNode,
    pub sink_node: SinkNode,
    #[serde(default)]
    pub intermediate_nodes: Vec<NodeId>,
    #[serde(default)]
    pub vulnerability_type: String,
    #[serde(default)]
    pub impact: ImpactLevel,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DataFlowPath {
    pub fn new(
        source_node: SourceNode,
        sink_node: SinkNode,
        vulnerability_type: impl Into<String>,
    ) -> Self {
        Self {
            source_node,
            sink_node,
            intermediate_nodes: Vec::new(),
            vulnerability_type: vulnerability_type.into(),
            impact: ImpactLevel::default(),
            description: String::new(),
            recommendations: Vec::new(),
            confidence: 0.0,
            metadata: Metadata::new(),
        }
    }

    pub fn with_impact(mut self, impact: ImpactLevel) -> Self {
        self.impact = impact;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_intermediate_nodes(mut self, nodes: Vec<NodeId>) -> Self {
        self.intermediate_nodes = nodes;
        self
    }

    pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
        self.recommendations = recommendations;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn to_map(&self) -> Result<Metadata> {
        to_map(self)
    }

    pub fn from_map(map: &Metadata) -> Result<Self> {
        from_map(map)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Result
// ═══════════════════════════════════════════════════════════════════════════

/// Terminal aggregate of one workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub investigation_id: String,
    #[serde(default)]
    pub sources: Vec<SourceNode>,
    #[serde(default)]
    pub sinks: Vec<SinkNode>,
    #[serde(default)]
    pub data_flow_paths: Vec<DataFlowPath>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl AnalysisResult {
    pub fn new(investigation_id: impl Into<String>) -> Self {
        Self {
            investigation_id: investigation_id.into(),
            sources: Vec::new(),
            sinks: Vec::new(),
            data_flow_paths: Vec::new(),
            summary: String::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn to_map(&self) -> Result<Metadata> {
        to_map(self)
    }

    pub fn from_map(map: &Metadata) -> Result<Self> {
        from_map(map)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_map()?).map_err(WorkflowError::serialization)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(WorkflowError::serialization)
    }
}

fn to_map<T: Serialize>(value: &T) -> Result<Metadata> {
    match serde_json::to_value(value).map_err(WorkflowError::serialization)? {
        Value::Object(map) => Ok(map),
        other => Err(WorkflowError::serialization(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn from_map<T: serde::de::DeserializeOwned>(map: &Metadata) -> Result<T> {
    serde_json::from_value(Value::Object(map.clone())).map_err(WorkflowError::serialization)
}
