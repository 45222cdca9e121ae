//! Best-effort flow extraction from completion text
//!
//! Responses are scanned line by line for `source:`, `sink:`,
//! `vulnerability:`, `impact:`, `description:` and `recommendation:` markers
//! (optionally bulleted, any case). Markers accumulate in a buffer; once the
//! buffer holds a resolved source and a resolved sink a path is emitted and
//! the buffer resets.
//!
//! This is pattern matching over free text, not a grammar. When the model
//! strays from the requested layout the extractor returns fewer paths than
//! the text describes; it never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::lexicon::{hedge_confidence, vulnerability_profile};
use crate::model::{DataFlowPath, FlowEndpoint, ImpactLevel, SinkNode, SourceNode};

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*•]|\d+[.)])?\s*\**(source|sink|vulnerability|description|recommendation|impact)s?\**\s*:\s*(.*)$",
    )
    .expect("marker regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Source,
    Sink,
    Vulnerability,
    Description,
    Recommendation,
    Impact,
}

impl Marker {
    fn parse(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "source" => Some(Marker::Source),
            "sink" => Some(Marker::Sink),
            "vulnerability" => Some(Marker::Vulnerability),
            "description" => Some(Marker::Description),
            "recommendation" => Some(Marker::Recommendation),
            "impact" => Some(Marker::Impact),
            _ => None,
        }
    }
}

/// One marker line
fn parse_marker(line: &str) -> Option<(Marker, String)> {
    let captures = MARKER.captures(line)?;
    let marker = Marker::parse(captures.get(1)?.as_str())?;
    let value = captures
        .get(2)
        .map(|m| m.as_str().trim().trim_matches('*').trim().to_string())
        .unwrap_or_default();
    Some((marker, value))
}

/// Resolve a marker value to one of `nodes` by name.
///
/// Exact (case-insensitive) matches win; otherwise the longest node name
/// contained in the value. Backticks and call parentheses are ignored.
pub fn resolve_endpoint<'a, T: FlowEndpoint>(value: &str, nodes: &'a [T]) -> Option<&'a T> {
    let value = value
        .replace('`', "")
        .replace("()", "")
        .trim()
        .to_lowercase();
    if value.is_empty() {
        return None;
    }

    if let Some(exact) = nodes
        .iter()
        .find(|node| node.name().to_lowercase() == value)
    {
        return Some(exact);
    }

    nodes
        .iter()
        .filter(|node| !node.name().is_empty() && value.contains(&node.name().to_lowercase()))
        .max_by_key(|node| node.name().len())
}

#[derive(Default)]
struct Buffer<'a> {
    source: Option<&'a SourceNode>,
    sink: Option<&'a SinkNode>,
    vulnerability: Option<String>,
    impact: Option<ImpactLevel>,
    description: Option<String>,
    recommendations: Vec<String>,
}

impl Buffer<'_> {
    fn into_path(self) -> Option<DataFlowPath> {
        let (source, sink) = (self.source?, self.sink?);
        let vulnerability = self
            .vulnerability
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vulnerability_profile(sink.category).vulnerability_type.to_string());
        let description = self.description.unwrap_or_default();
        let confidence = hedge_confidence(&description);

        Some(
            DataFlowPath::new(source.clone(), sink.clone(), vulnerability)
                .with_impact(self.impact.unwrap_or_default())
                .with_confidence(confidence)
                .with_description(description)
                .with_recommendations(self.recommendations),
        )
    }
}

/// Extract every fully resolved path from `response`.
///
/// Unresolvable source or sink names leave the buffer waiting; a later
/// resolvable marker of the same kind replaces them.
pub fn extract_flows(
    response: &str,
    sources: &[SourceNode],
    sinks: &[SinkNode],
) -> Vec<DataFlowPath> {
    let mut paths = Vec::new();
    let mut buffer = Buffer::default();

    for line in response.lines() {
        let Some((marker, value)) = parse_marker(line) else {
            continue;
        };

        match marker {
            Marker::Source => {
                if let Some(source) = resolve_endpoint(&value, sources) {
                    buffer.source = Some(source);
                }
            }
            Marker::Sink => {
                if let Some(sink) = resolve_endpoint(&value, sinks) {
                    buffer.sink = Some(sink);
                }
            }
            Marker::Vulnerability => buffer.vulnerability = Some(value),
            Marker::Impact => buffer.impact = ImpactLevel::from_label(&value),
            Marker::Description => buffer.description = Some(value),
            Marker::Recommendation => {
                if !value.is_empty() {
                    buffer.recommendations.push(value);
                }
            }
        }

        if buffer.source.is_some() && buffer.sink.is_some() {
            if let Some(path) = std::mem::take(&mut buffer).into_path() {
                paths.push(path.with_metadata("extraction", json!("marker_lines")));
            }
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceSinkCategory;
    use pretty_assertions::assert_eq;

    fn endpoints() -> (Vec<SourceNode>, Vec<SinkNode>) {
        (
            vec![
                SourceNode::new(1, "get_user_input", SourceSinkCategory::UserInput),
                SourceNode::new(3, "read_config", SourceSinkCategory::Configuration),
            ],
            vec![
                SinkNode::new(2, "execute_query", SourceSinkCategory::DatabaseWrite),
                SinkNode::new(4, "render_page", SourceSinkCategory::MarkupRendering),
            ],
        )
    }

    #[test]
    fn test_marker_lines() {
        assert_eq!(
            parse_marker("  - **Vulnerability:** SQL Injection"),
            Some((Marker::Vulnerability, "SQL Injection".to_string()))
        );
        assert_eq!(
            parse_marker("Recommendations: escape output"),
            Some((Marker::Recommendation, "escape output".to_string()))
        );
        assert_eq!(parse_marker("1. SINK: render_page"), Some((Marker::Sink, "render_page".to_string())));
        assert_eq!(parse_marker("The source is clear"), None);
    }

    #[test]
    fn test_resolution_prefers_exact_then_longest() {
        let sources = vec![
            SourceNode::new(1, "read", SourceSinkCategory::FileRead),
            SourceNode::new(2, "read_config", SourceSinkCategory::Configuration),
        ];
        assert_eq!(resolve_endpoint("`read()`", &sources).map(|s| s.node_id), Some(1));
        assert_eq!(
            resolve_endpoint("the read_config function", &sources).map(|s| s.node_id),
            Some(2)
        );
        assert!(resolve_endpoint("write", &sources).is_none());
        assert!(resolve_endpoint("", &sources).is_none());
    }

    #[test]
    fn test_extracts_paths_and_resets_buffer() {
        let (sources, sinks) = endpoints();
        let response = "\
Vulnerability: SQL Injection
Impact: High
Description: User input is likely concatenated into SQL
Recommendation: Use parameterized queries
Recommendation: Validate input
Source: get_user_input
Sink: execute_query

Vulnerability: Cross-Site Scripting
Source: read_config
Sink: render_page
";
        let paths = extract_flows(response, &sources, &sinks);
        assert_eq!(paths.len(), 2);

        assert_eq!(paths[0].vulnerability_type, "SQL Injection");
        assert_eq!(paths[0].impact, ImpactLevel::High);
        assert_eq!(paths[0].confidence, 0.7);
        assert_eq!(paths[0].recommendations.len(), 2);
        assert_eq!(paths[0].source_node.node_id, 1);
        assert_eq!(paths[0].sink_node.node_id, 2);

        assert_eq!(paths[1].vulnerability_type, "Cross-Site Scripting");
        assert_eq!(paths[1].impact, ImpactLevel::Medium);
        assert!(paths[1].recommendations.is_empty());
        assert!(paths[1].description.is_empty());
    }

    #[test]
    fn test_unresolved_names_yield_fewer_paths() {
        let (sources, sinks) = endpoints();
        let response = "Source: mystery\nSink: execute_query\nVulnerability: x\n";
        assert!(extract_flows(response, &sources, &sinks).is_empty());
    }

    #[test]
    fn test_missing_vulnerability_falls_back_to_sink_profile() {
        let (sources, sinks) = endpoints();
        let response = "Sink: execute_query\nSource: get_user_input\n";
        let paths = extract_flows(response, &sources, &sinks);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].vulnerability_type, "SQL Injection");
    }

    #[test]
    fn test_prose_without_markers_yields_nothing() {
        let (sources, sinks) = endpoints();
        let response = "I could not find any flows between get_user_input and execute_query.";
        assert!(extract_flows(response, &sources, &sinks).is_empty());
    }
}
