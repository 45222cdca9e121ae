use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WorkflowError};

/// Workflow stage identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Setup,
    QueryCandidates,
    ConfirmCandidates,
    SynthesizeFlows,
    Persist,
    Report,
    Done,
}

impl WorkflowStage {
    pub const ALL: [WorkflowStage; 7] = [
        WorkflowStage::Setup,
        WorkflowStage::QueryCandidates,
        WorkflowStage::ConfirmCandidates,
        WorkflowStage::SynthesizeFlows,
        WorkflowStage::Persist,
        WorkflowStage::Report,
        WorkflowStage::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::Setup => "setup",
            WorkflowStage::QueryCandidates => "query_candidates",
            WorkflowStage::ConfirmCandidates => "confirm_candidates",
            WorkflowStage::SynthesizeFlows => "synthesize_flows",
            WorkflowStage::Persist => "persist",
            WorkflowStage::Report => "report",
            WorkflowStage::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        WorkflowStage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| WorkflowError::parse(format!("Invalid stage: {}", s)))
    }

    /// The only stage allowed to follow this one.
    pub fn next(&self) -> Option<WorkflowStage> {
        match self {
            WorkflowStage::Setup => Some(WorkflowStage::QueryCandidates),
            WorkflowStage::QueryCandidates => Some(WorkflowStage::ConfirmCandidates),
            WorkflowStage::ConfirmCandidates => Some(WorkflowStage::SynthesizeFlows),
            WorkflowStage::SynthesizeFlows => Some(WorkflowStage::Persist),
            WorkflowStage::Persist => Some(WorkflowStage::Report),
            WorkflowStage::Report => Some(WorkflowStage::Done),
            WorkflowStage::Done => None,
        }
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Forward-only stage machine for one run
///
/// Every transition must go to `current.next()`; skipping or revisiting a
/// stage is an error. Elapsed time per completed stage is kept for reporting.
#[derive(Debug)]
pub struct StageTracker {
    current: WorkflowStage,
    entered_at: Instant,
    timings_ms: BTreeMap<WorkflowStage, u64>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: WorkflowStage::Setup,
            entered_at: Instant::now(),
            timings_ms: BTreeMap::new(),
        }
    }

    pub fn current(&self) -> WorkflowStage {
        self.current
    }

    /// Transition: current → `to`
    pub fn advance(&mut self, to: WorkflowStage) -> Result<()> {
        if self.current.next() != Some(to) {
            return Err(WorkflowError::InvalidStageTransition {
                from: self.current.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        let elapsed = self.entered_at.elapsed().as_millis() as u64;
        self.timings_ms.insert(self.current, elapsed);
        debug!("Stage {} finished in {}ms, entering {}", self.current, elapsed, to);

        self.current = to;
        self.entered_at = Instant::now();
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.current == WorkflowStage::Done
    }

    /// Elapsed milliseconds of every completed stage, keyed by stage name
    pub fn timings(&self) -> BTreeMap<String, u64> {
        self.timings_ms
            .iter()
            .map(|(stage, ms)| (stage.as_str().to_string(), *ms))
            .collect()
    }
}
