//! Markdown rendering of an `AnalysisResult`

use std::fmt::Write;

use super::{AnalysisResult, FlowEndpoint};

impl AnalysisResult {
    /// Render the result as a Markdown review document.
    ///
    /// Section order: title, investigation id, summary, sources table, sinks
    /// table, then one `### Path N: <vulnerability>` subsection per path.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(out, "# Sources and Sinks Analysis\n");
        let _ = writeln!(out, "**Investigation:** {}\n", self.investigation_id);

        let _ = writeln!(out, "## Summary\n");
        if self.summary.trim().is_empty() {
            let _ = writeln!(out, "_No summary available._\n");
        } else {
            let _ = writeln!(out, "{}\n", self.summary.trim());
        }

        let _ = writeln!(out, "## Sources\n");
        write_endpoint_table(&mut out, &self.sources);

        let _ = writeln!(out, "## Sinks\n");
        write_endpoint_table(&mut out, &self.sinks);

        let _ = writeln!(out, "## Data Flow Paths\n");
        if self.data_flow_paths.is_empty() {
            let _ = writeln!(out, "_No data flow paths identified._\n");
        }
        for (index, path) in self.data_flow_paths.iter().enumerate() {
            let vulnerability = if path.vulnerability_type.trim().is_empty() {
                "Unclassified"
            } else {
                path.vulnerability_type.trim()
            };
            let _ = writeln!(out, "### Path {}: {}\n", index + 1, vulnerability);
            let _ = writeln!(out, "**Impact:** {}\n", path.impact);
            let _ = writeln!(
                out,
                "**Source:** {} ({})\n",
                path.source_node.name, path.source_node.category
            );
            let _ = writeln!(
                out,
                "**Sink:** {} ({})\n",
                path.sink_node.name, path.sink_node.category
            );
            if !path.description.trim().is_empty() {
                let _ = writeln!(out, "**Description:** {}\n", path.description.trim());
            }
            if !path.recommendations.is_empty() {
                let _ = writeln!(out, "**Recommendations:**\n");
                for recommendation in &path.recommendations {
                    let _ = writeln!(out, "- {}", recommendation);
                }
                out.push('\n');
            }
        }

        out
    }
}

fn write_endpoint_table<T: FlowEndpoint>(out: &mut String, nodes: &[T]) {
    if nodes.is_empty() {
        let _ = writeln!(out, "_None identified._\n");
        return;
    }

    let _ = writeln!(out, "| Name | Category | Confidence | Description |");
    let _ = writeln!(out, "|------|----------|------------|-------------|");
    for node in nodes {
        let _ = writeln!(
            out,
            "| {} | {} | {:.2} | {} |",
            escape_cell(node.name()),
            node.category(),
            node.confidence(),
            escape_cell(node.description())
        );
    }
    out.push('\n');
}

/// Table cells cannot contain pipes or line breaks.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
