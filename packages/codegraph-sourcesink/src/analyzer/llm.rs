//! Completion-backed analyzer
//!
//! Candidates are judged one prompt at a time; confirmation, category and
//! confidence come from fixed lexicons applied to the response text. Flows
//! are proposed per file from one combined prompt and pulled out of the
//! response by `extract::extract_flows`.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use codegraph_ports::{CompletionPort, GraphPort, NodeId, PortError};
use serde_json::json;
use tracing::{debug, warn};

use super::{count_by_category, count_by_impact, fetch_code, truncate_chars, Analyzer, Summarizer};
use crate::config::LlmConfig;
use crate::error::{ErrorCategory, Result, WorkflowError};
use crate::extract::extract_flows;
use crate::lexicon::{
    claims_sink, claims_source, first_matching_category, hedge_confidence, CategoryTable,
    SINK_CATEGORY_KEYWORDS, SOURCE_CATEGORY_KEYWORDS,
};
use crate::model::{
    Candidate, DataFlowPath, SinkNode, SourceNode, SourceSinkCategory,
};

const SOURCE_SYSTEM_PROMPT: &str = "You are a security analyst reviewing code for taint sources: \
places where untrusted data enters a program (user input, database reads, file reads, network \
receives, environment variables, configuration). Answer in plain prose.";

const SINK_SYSTEM_PROMPT: &str = "You are a security analyst reviewing code for taint sinks: \
places where data leaves a program or reaches a dangerous operation (database writes, file \
writes, network sends, command execution, markup rendering, logging, response generation). \
Answer in plain prose.";

const FLOW_SYSTEM_PROMPT: &str = "You are a security analyst tracing data flows from taint \
sources to taint sinks within one file. Report only flows you can justify from the code.";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a security analyst writing a short executive \
summary of a sources-and-sinks review for engineers who will triage the findings.";

/// What a single-candidate prompt is asking about
struct Role {
    noun: &'static str,
    system_prompt: &'static str,
    claims: fn(&str) -> bool,
    categories: &'static CategoryTable,
}

const SOURCE_ROLE: Role = Role {
    noun: "source",
    system_prompt: SOURCE_SYSTEM_PROMPT,
    claims: claims_source,
    categories: SOURCE_CATEGORY_KEYWORDS,
};

const SINK_ROLE: Role = Role {
    noun: "sink",
    system_prompt: SINK_SYSTEM_PROMPT,
    claims: claims_sink,
    categories: SINK_CATEGORY_KEYWORDS,
};

/// Judgement parsed from one completion
#[derive(Debug, Clone, PartialEq)]
struct Verdict {
    category: SourceSinkCategory,
    confidence: f64,
    rationale: String,
}

fn parse_verdict(response: &str, role: &Role) -> Option<Verdict> {
    if !(role.claims)(response) {
        return None;
    }
    let rationale = response
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string();

    Some(Verdict {
        category: first_matching_category(response, role.categories)
            .unwrap_or(SourceSinkCategory::Unknown),
        confidence: hedge_confidence(response),
        rationale,
    })
}

pub struct LlmAnalyzer {
    graph: Arc<dyn GraphPort>,
    completion: Arc<dyn CompletionPort>,
    config: LlmConfig,
}

impl LlmAnalyzer {
    pub fn new(
        graph: Arc<dyn GraphPort>,
        completion: Arc<dyn CompletionPort>,
        config: LlmConfig,
    ) -> Self {
        Self {
            graph,
            completion,
            config,
        }
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str, max_tokens: u32) -> Result<String> {
        self.completion
            .complete(system_prompt, user_prompt, self.config.temperature, max_tokens)
            .await
            .map_err(WorkflowError::Completion)
    }

    /// Ask about one candidate; `None` when it has no code or is not confirmed.
    async fn judge(&self, candidate: &Candidate, role: &Role) -> Result<Option<(Verdict, String)>> {
        let Some(context) = fetch_code(self.graph.as_ref(), candidate.node_id).await? else {
            debug!(
                "LlmAnalyzer: no code for node {} ({}), skipping",
                candidate.node_id, candidate.name
            );
            return Ok(None);
        };

        let mut prompt = String::new();
        let _ = writeln!(prompt, "Name: {}", candidate.name);
        if let Some(path) = context.file_path.as_ref().or(candidate.file_path.as_ref()) {
            let _ = writeln!(prompt, "File: {}", path);
        }
        if !candidate.description.is_empty() {
            let _ = writeln!(prompt, "Existing description: {}", candidate.description);
        }
        if let Some(docstring) = &context.docstring {
            let _ = writeln!(prompt, "Docstring: {}", docstring);
        }
        let _ = writeln!(
            prompt,
            "\nCode:\n```\n{}\n```\n",
            truncate_chars(&context.code, self.config.candidate_code_budget)
        );
        let _ = write!(
            prompt,
            "Is this code a {noun}? If it is, say \"this is a {noun}\" and name the kind of {noun}. \
             Qualify your certainty with one word (definitely, likely, probably, possibly, might).",
            noun = role.noun
        );

        let response = self
            .complete(role.system_prompt, &prompt, self.config.max_tokens)
            .await?;
        Ok(parse_verdict(&response, role).map(|verdict| (verdict, response)))
    }

    async fn flows_for_file(
        &self,
        file_node_id: NodeId,
        sources: &[SourceNode],
        sinks: &[SinkNode],
    ) -> Result<Vec<DataFlowPath>> {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "Sources:");
        for source in sources {
            self.describe_entity(&mut prompt, source.node_id, &source.name, source.category)
                .await?;
        }
        let _ = writeln!(prompt, "Sinks:");
        for sink in sinks {
            self.describe_entity(&mut prompt, sink.node_id, &sink.name, sink.category)
                .await?;
        }
        let _ = write!(
            prompt,
            "For every flow from one of the sources to one of the sinks, answer with these lines \
             in this order:\nVulnerability: <type>\nImpact: <high|medium|low|informational>\n\
             Description: <how the data flows>\nRecommendation: <one fix per line>\n\
             Source: <source name>\nSink: <sink name>\n"
        );

        let response = self
            .complete(FLOW_SYSTEM_PROMPT, &prompt, self.config.max_tokens)
            .await?;
        Ok(extract_flows(&response, sources, sinks)
            .into_iter()
            .map(|path| {
                path.with_metadata("analyzer", json!(self.name()))
                    .with_metadata("file_node_id", json!(file_node_id))
            })
            .collect())
    }

    async fn describe_entity(
        &self,
        prompt: &mut String,
        node_id: NodeId,
        name: &str,
        category: SourceSinkCategory,
    ) -> Result<()> {
        let code = fetch_code(self.graph.as_ref(), node_id)
            .await?
            .map(|context| truncate_chars(&context.code, self.config.code_char_budget))
            .unwrap_or_default();
        let _ = writeln!(prompt, "- {} ({})\n```\n{}\n```", name, category, code);
        Ok(())
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn analyze_source(
        &self,
        candidate: &Candidate,
        _investigation_id: &str,
    ) -> Result<Option<SourceNode>> {
        let Some((verdict, response)) = self.judge(candidate, &SOURCE_ROLE).await? else {
            return Ok(None);
        };
        Ok(Some(
            SourceNode::from_candidate(candidate, verdict.category, verdict.confidence, verdict.rationale)
                .with_metadata("analyzer", json!(self.name()))
                .with_metadata("llm_response", json!(response)),
        ))
    }

    async fn analyze_sink(
        &self,
        candidate: &Candidate,
        _investigation_id: &str,
    ) -> Result<Option<SinkNode>> {
        let Some((verdict, response)) = self.judge(candidate, &SINK_ROLE).await? else {
            return Ok(None);
        };
        Ok(Some(
            SinkNode::from_candidate(candidate, verdict.category, verdict.confidence, verdict.rationale)
                .with_metadata("analyzer", json!(self.name()))
                .with_metadata("llm_response", json!(response)),
        ))
    }

    async fn analyze_data_flow(
        &self,
        sources: &[SourceNode],
        sinks: &[SinkNode],
        investigation_id: &str,
    ) -> Result<Vec<DataFlowPath>> {
        let mut paths = Vec::new();
        if sources.is_empty() || sinks.is_empty() {
            return Ok(paths);
        }

        let mut groups: BTreeMap<NodeId, (Vec<SourceNode>, Vec<SinkNode>)> = BTreeMap::new();
        for source in sources {
            if let Some(file) = source.file_node_id {
                groups.entry(file).or_default().0.push(source.clone());
            }
        }
        for sink in sinks {
            if let Some(file) = sink.file_node_id {
                groups.entry(file).or_default().1.push(sink.clone());
            }
        }

        for (file_node_id, (file_sources, file_sinks)) in &groups {
            if file_sources.is_empty() || file_sinks.is_empty() {
                continue;
            }
            match self.flows_for_file(*file_node_id, file_sources, file_sinks).await {
                Ok(found) => {
                    debug!(
                        "LlmAnalyzer: {} flows in file node {} for investigation {}",
                        found.len(),
                        file_node_id,
                        investigation_id
                    );
                    paths.extend(found);
                }
                Err(e) => warn!(
                    category = %ErrorCategory::Synthesis,
                    "LlmAnalyzer: flow synthesis failed for file node {} in investigation {}: {}",
                    file_node_id, investigation_id, e
                ),
            }
        }

        Ok(paths)
    }
}

#[async_trait]
impl Summarizer for LlmAnalyzer {
    async fn generate_summary(
        &self,
        sources: &[SourceNode],
        sinks: &[SinkNode],
        paths: &[DataFlowPath],
        investigation_id: &str,
    ) -> Result<String> {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "Investigation: {}", investigation_id);
        let _ = writeln!(prompt, "Sources: {}", sources.len());
        for (category, count) in count_by_category(sources) {
            let _ = writeln!(prompt, "  {}: {}", category, count);
        }
        let _ = writeln!(prompt, "Sinks: {}", sinks.len());
        for (category, count) in count_by_category(sinks) {
            let _ = writeln!(prompt, "  {}: {}", category, count);
        }
        let _ = writeln!(prompt, "Data flow paths: {}", paths.len());
        for (impact, count) in count_by_impact(paths) {
            let _ = writeln!(prompt, "  {}: {}", impact, count);
        }
        for path in paths {
            let _ = writeln!(
                prompt,
                "- {} ({}): {} -> {}",
                path.vulnerability_type, path.impact, path.source_node.name, path.sink_node.name
            );
        }
        let _ = write!(
            prompt,
            "\nSummarize the security posture these findings suggest and what to review first."
        );

        let summary = self
            .complete(SUMMARY_SYSTEM_PROMPT, &prompt, self.config.summary_max_tokens)
            .await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(WorkflowError::Completion(PortError::completion(
                "empty summary response",
            )));
        }
        Ok(summary.to_string())
    }
}
