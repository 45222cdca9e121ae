use std::sync::Arc;

use codegraph_ports::{params, CompletionPort, GraphPort};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analyzer::{
    count_by_category, count_by_impact, Analyzer, DocumentationAnalyzer, LlmAnalyzer, Summarizer,
};
use crate::config::WorkflowConfig;
use crate::error::{ErrorCategory, RecoveredFailures, Result, WorkflowError};
use crate::funnel::{Funnel, KeywordFunnel};
use crate::model::{
    AnalysisResult, DataFlowPath, Metadata, SinkCandidate, SinkNode, SourceCandidate, SourceNode,
};
use crate::persist::{Investigation, PersistCounts, Persister};
use crate::queries::INVESTIGATION_EXISTS;
use crate::stage::{StageTracker, WorkflowStage};

/// Sources-and-sinks orchestrator
///
/// Runs `SETUP → QUERY_CANDIDATES → CONFIRM_CANDIDATES → SYNTHESIZE_FLOWS →
/// PERSIST → REPORT → DONE` strictly in order.
///
/// - Confirmation: analyzers are tried per candidate in registration order
///   and the first confirmation wins.
/// - Synthesis: every analyzer runs and all proposed paths are kept.
/// - Only configuration, lookup and cancellation errors end a run; every
///   other failure is logged, skips one item and is tallied in the
///   `recovered_failures` metadata.
pub struct SourceSinkWorkflow {
    graph: Arc<dyn GraphPort>,
    completion: Option<Arc<dyn CompletionPort>>,
    config: WorkflowConfig,
    funnels: Vec<Arc<dyn Funnel>>,
    analyzers: Vec<Arc<dyn Analyzer>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    cancel: CancellationToken,
}

impl SourceSinkWorkflow {
    /// Workflow with empty registries
    pub fn new(
        graph: Arc<dyn GraphPort>,
        completion: Option<Arc<dyn CompletionPort>>,
        config: WorkflowConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            graph,
            completion,
            config,
            funnels: Vec::new(),
            analyzers: Vec::new(),
            summarizer: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Workflow with the default funnel and analyzers registered
    pub fn with_defaults(
        graph: Arc<dyn GraphPort>,
        completion: Option<Arc<dyn CompletionPort>>,
        config: WorkflowConfig,
    ) -> Result<Self> {
        let mut workflow = Self::new(graph, completion, config)?;
        workflow.setup();
        Ok(workflow)
    }

    /// SETUP: keyword funnel, then the LLM analyzer when a completion port is
    /// available, then the documentation analyzer.
    pub fn setup(&mut self) {
        let funnel = KeywordFunnel::new(self.graph.clone(), &self.config.funnel);
        self.register_funnel(Arc::new(funnel));

        if let Some(completion) = self.completion.clone() {
            let llm = Arc::new(LlmAnalyzer::new(
                self.graph.clone(),
                completion,
                self.config.llm.clone(),
            ));
            self.register_analyzer(llm.clone());
            self.set_summarizer(llm);
        }

        let documentation =
            DocumentationAnalyzer::new(self.graph.clone(), self.config.documentation.clone());
        self.register_analyzer(Arc::new(documentation));
    }

    pub fn register_funnel(&mut self, funnel: Arc<dyn Funnel>) {
        info!("SourceSinkWorkflow: registered funnel {}", funnel.name());
        self.funnels.push(funnel);
    }

    /// Register an analyzer; earlier registrations take precedence during
    /// confirmation.
    pub fn register_analyzer(&mut self, analyzer: Arc<dyn Analyzer>) {
        info!("SourceSinkWorkflow: registered analyzer {}", analyzer.name());
        self.analyzers.push(analyzer);
    }

    pub fn set_summarizer(&mut self, summarizer: Arc<dyn Summarizer>) {
        self.summarizer = Some(summarizer);
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn funnel_names(&self) -> Vec<String> {
        self.funnels.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn analyzer_names(&self) -> Vec<String> {
        self.analyzers.iter().map(|a| a.name().to_string()).collect()
    }

    /// Workflow-wide shutdown token.
    ///
    /// Cancelling it stops the current run at the next stage boundary and
    /// every later run before its first stage; it is never reset. To abort a
    /// single run, pass a token to `run_with_cancellation` instead.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the whole pipeline for one investigation.
    pub async fn run(&self, investigation_id: &str) -> Result<AnalysisResult> {
        self.run_with_cancellation(investigation_id, self.cancel.child_token())
            .await
    }

    /// Like `run`, also stopping at the next stage boundary once `run_token`
    /// is cancelled. Other runs on this workflow are unaffected.
    pub async fn run_with_cancellation(
        &self,
        investigation_id: &str,
        run_token: CancellationToken,
    ) -> Result<AnalysisResult> {
        let investigation_id = investigation_id.trim();
        if investigation_id.is_empty() {
            return Err(WorkflowError::config("investigation id is required"));
        }
        if self.config.require_llm && self.completion.is_none() {
            return Err(WorkflowError::CompletionServiceMissing);
        }

        let mut tracker = StageTracker::new();
        let mut failures = RecoveredFailures::default();
        info!(
            "SourceSinkWorkflow: starting {} for investigation {} ({} funnels, {} analyzers)",
            self.config.name,
            investigation_id,
            self.funnels.len(),
            self.analyzers.len()
        );

        self.enter(&mut tracker, &run_token, WorkflowStage::QueryCandidates)?;
        let investigation = self.lookup_investigation(investigation_id).await?;
        let (source_candidates, sink_candidates) = self.query_candidates(investigation_id).await;

        self.enter(&mut tracker, &run_token, WorkflowStage::ConfirmCandidates)?;
        let (sources, source_failures) =
            self.confirm_sources(&source_candidates, investigation_id).await;
        let (sinks, sink_failures) = self.confirm_sinks(&sink_candidates, investigation_id).await;
        failures.record(ErrorCategory::Candidate, source_failures + sink_failures);
        info!(
            "SourceSinkWorkflow: confirmed {}/{} sources, {}/{} sinks",
            sources.len(),
            source_candidates.len(),
            sinks.len(),
            sink_candidates.len()
        );

        self.enter(&mut tracker, &run_token, WorkflowStage::SynthesizeFlows)?;
        let (paths, synthesis_failures) =
            self.synthesize_flows(&sources, &sinks, investigation_id).await;
        failures.record(ErrorCategory::Synthesis, synthesis_failures);

        self.enter(&mut tracker, &run_token, WorkflowStage::Persist)?;
        let persisted = if self.config.persist {
            Persister::new(self.graph.as_ref(), &investigation)
                .persist_all(&sources, &sinks, &paths)
                .await
        } else {
            info!("SourceSinkWorkflow: persistence disabled, skipping writes");
            PersistCounts::default()
        };
        failures.record(ErrorCategory::Persistence, persisted.failed);

        self.enter(&mut tracker, &run_token, WorkflowStage::Report)?;
        let summary = self
            .summarize(&sources, &sinks, &paths, investigation_id)
            .await;

        let mut result = AnalysisResult::new(investigation_id);
        result.metadata =
            self.run_metadata(&source_candidates, &sink_candidates, persisted, failures);
        result.sources = sources;
        result.sinks = sinks;
        result.data_flow_paths = paths;
        result.summary = summary;

        tracker.advance(WorkflowStage::Done)?;
        result
            .metadata
            .insert("stage_timings_ms".to_string(), json!(tracker.timings()));

        info!(
            "SourceSinkWorkflow: investigation {} done: {} sources, {} sinks, {} paths, {} recovered failures",
            investigation_id,
            result.sources.len(),
            result.sinks.len(),
            result.data_flow_paths.len(),
            failures.total()
        );
        Ok(result)
    }

    /// Cancellation check, then transition.
    fn enter(
        &self,
        tracker: &mut StageTracker,
        run_token: &CancellationToken,
        stage: WorkflowStage,
    ) -> Result<()> {
        if self.cancel.is_cancelled() || run_token.is_cancelled() {
            warn!("SourceSinkWorkflow: cancelled before stage {}", stage);
            return Err(WorkflowError::Cancelled { stage });
        }
        tracker.advance(stage)?;
        info!("SourceSinkWorkflow: entering stage {}", stage);
        Ok(())
    }

    async fn lookup_investigation(&self, investigation_id: &str) -> Result<Investigation> {
        let rows = self
            .graph
            .run_query(
                INVESTIGATION_EXISTS,
                params([("investigation_id", json!(investigation_id))]),
            )
            .await
            .map_err(|e| {
                error!(
                    "SourceSinkWorkflow: investigation lookup failed for {}: {}",
                    investigation_id, e
                );
                WorkflowError::Graph(e)
            })?;

        match rows.first() {
            Some(row) => Ok(Investigation::from_record(investigation_id, row)),
            None => {
                error!("SourceSinkWorkflow: investigation {} not found", investigation_id);
                Err(WorkflowError::InvestigationNotFound(investigation_id.to_string()))
            }
        }
    }

    /// Concatenate every funnel's candidates, without deduplication.
    async fn query_candidates(
        &self,
        investigation_id: &str,
    ) -> (Vec<SourceCandidate>, Vec<SinkCandidate>) {
        let mut sources = Vec::new();
        let mut sinks = Vec::new();
        for funnel in &self.funnels {
            sources.extend(funnel.query_sources(investigation_id).await);
            sinks.extend(funnel.query_sinks(investigation_id).await);
        }
        info!(
            "SourceSinkWorkflow: {} source candidates, {} sink candidates",
            sources.len(),
            sinks.len()
        );
        (sources, sinks)
    }

    async fn confirm_source(
        &self,
        candidate: &SourceCandidate,
        investigation_id: &str,
    ) -> (Option<SourceNode>, usize) {
        let mut failures = 0;
        for analyzer in &self.analyzers {
            match analyzer.analyze_source(candidate, investigation_id).await {
                Ok(Some(node)) => return (Some(node), failures),
                Ok(None) => {}
                Err(e) => {
                    failures += 1;
                    warn!(
                        category = %ErrorCategory::Candidate,
                        "SourceSinkWorkflow: {} failed on source candidate {} ({}): {}",
                        analyzer.name(),
                        candidate.name,
                        candidate.node_id,
                        e
                    );
                }
            }
        }
        (None, failures)
    }

    async fn confirm_sink(
        &self,
        candidate: &SinkCandidate,
        investigation_id: &str,
    ) -> (Option<SinkNode>, usize) {
        let mut failures = 0;
        for analyzer in &self.analyzers {
            match analyzer.analyze_sink(candidate, investigation_id).await {
                Ok(Some(node)) => return (Some(node), failures),
                Ok(None) => {}
                Err(e) => {
                    failures += 1;
                    warn!(
                        category = %ErrorCategory::Candidate,
                        "SourceSinkWorkflow: {} failed on sink candidate {} ({}): {}",
                        analyzer.name(),
                        candidate.name,
                        candidate.node_id,
                        e
                    );
                }
            }
        }
        (None, failures)
    }

    // Candidates run up to `max_concurrency` at a time; `buffered` yields in
    // input order and each candidate walks analyzers in registration order.

    async fn confirm_sources(
        &self,
        candidates: &[SourceCandidate],
        investigation_id: &str,
    ) -> (Vec<SourceNode>, usize) {
        let confirmed: Vec<(Option<SourceNode>, usize)> = stream::iter(candidates)
            .map(|candidate| self.confirm_source(candidate, investigation_id))
            .buffered(self.config.max_concurrency)
            .collect()
            .await;
        let failures = confirmed.iter().map(|(_, failures)| failures).sum();
        (confirmed.into_iter().filter_map(|(node, _)| node).collect(), failures)
    }

    async fn confirm_sinks(
        &self,
        candidates: &[SinkCandidate],
        investigation_id: &str,
    ) -> (Vec<SinkNode>, usize) {
        let confirmed: Vec<(Option<SinkNode>, usize)> = stream::iter(candidates)
            .map(|candidate| self.confirm_sink(candidate, investigation_id))
            .buffered(self.config.max_concurrency)
            .collect()
            .await;
        let failures = confirmed.iter().map(|(_, failures)| failures).sum();
        (confirmed.into_iter().filter_map(|(node, _)| node).collect(), failures)
    }

    /// Union of every analyzer's proposals, with the number of analyzers
    /// that failed.
    async fn synthesize_flows(
        &self,
        sources: &[SourceNode],
        sinks: &[SinkNode],
        investigation_id: &str,
    ) -> (Vec<DataFlowPath>, usize) {
        let mut paths = Vec::new();
        let mut failures = 0;
        for analyzer in &self.analyzers {
            match analyzer
                .analyze_data_flow(sources, sinks, investigation_id)
                .await
            {
                Ok(found) => {
                    info!(
                        "SourceSinkWorkflow: {} proposed {} paths",
                        analyzer.name(),
                        found.len()
                    );
                    paths.extend(found);
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        category = %ErrorCategory::Synthesis,
                        "SourceSinkWorkflow: {} flow synthesis failed for investigation {}: {}",
                        analyzer.name(),
                        investigation_id,
                        e
                    );
                }
            }
        }
        (paths, failures)
    }

    async fn summarize(
        &self,
        sources: &[SourceNode],
        sinks: &[SinkNode],
        paths: &[DataFlowPath],
        investigation_id: &str,
    ) -> String {
        if let Some(summarizer) = &self.summarizer {
            match summarizer
                .generate_summary(sources, sinks, paths, investigation_id)
                .await
            {
                Ok(summary) => return summary,
                Err(e) => warn!(
                    "SourceSinkWorkflow: summary generation failed, using counts: {}",
                    e
                ),
            }
        }
        fallback_summary(sources, sinks, paths)
    }

    fn run_metadata(
        &self,
        source_candidates: &[SourceCandidate],
        sink_candidates: &[SinkCandidate],
        persisted: PersistCounts,
        failures: RecoveredFailures,
    ) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("workflow_name".into(), json!(self.config.name));
        metadata.insert("workflow_description".into(), json!(self.config.description));
        metadata.insert("timestamp".into(), json!(chrono::Utc::now().to_rfc3339()));
        metadata.insert("run_id".into(), json!(Uuid::new_v4().to_string()));
        metadata.insert("funnels".into(), json!(self.funnel_names()));
        metadata.insert("analyzers".into(), json!(self.analyzer_names()));
        metadata.insert(
            "candidate_counts".into(),
            json!({
                "sources": source_candidates.len(),
                "sinks": sink_candidates.len(),
            }),
        );
        metadata.insert("persist_enabled".into(), Value::Bool(self.config.persist));
        metadata.insert("persisted".into(), json!(persisted));
        metadata.insert("recovered_failures".into(), json!(failures));
        metadata
    }
}

/// Count-based narrative used when no summarizer is available.
pub fn fallback_summary(
    sources: &[SourceNode],
    sinks: &[SinkNode],
    paths: &[DataFlowPath],
) -> String {
    fn breakdown(counts: std::collections::BTreeMap<&'static str, usize>) -> String {
        if counts.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = counts
            .into_iter()
            .map(|(key, count)| format!("{}: {}", key, count))
            .collect();
        format!(" ({})", parts.join(", "))
    }

    format!(
        "Identified {} sources{}, {} sinks{} and {} data flow paths{}.",
        sources.len(),
        breakdown(count_by_category(sources)),
        sinks.len(),
        breakdown(count_by_category(sinks)),
        paths.len(),
        breakdown(count_by_impact(paths)),
    )
}
