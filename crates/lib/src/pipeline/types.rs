use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::build::BuildError;
use crate::collect::CollectError;
use crate::store::{EntryRecord, StoreError};

use super::verify::FreshnessReport;

/// States of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
  Start,
  FirstBuild,
  FirstCollect,
  EmbeddingRebuild,
  FinalCollect,
  Done,
  Failed,
}

impl Phase {
  /// The phase that follows a successful `self`.
  pub fn next(self) -> Option<Phase> {
    match self {
      Phase::Start => Some(Phase::FirstBuild),
      Phase::FirstBuild => Some(Phase::FirstCollect),
      Phase::FirstCollect => Some(Phase::EmbeddingRebuild),
      Phase::EmbeddingRebuild => Some(Phase::FinalCollect),
      Phase::FinalCollect => Some(Phase::Done),
      Phase::Done | Phase::Failed => None,
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, Phase::Done | Phase::Failed)
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Phase::Start => "start",
      Phase::FirstBuild => "first-build",
      Phase::FirstCollect => "first-collect",
      Phase::EmbeddingRebuild => "embedding-rebuild",
      Phase::FinalCollect => "final-collect",
      Phase::Done => "done",
      Phase::Failed => "failed",
    };
    f.write_str(name)
  }
}

/// Cooperative cancellation, checked before each phase starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseRecord {
  pub phase: Phase,
  /// Modules compiled (build phases) or staged (collect phases).
  pub modules: Vec<String>,
  /// Modules whose entry bytes changed; empty for build phases.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub written: Vec<String>,
  pub duration_ms: u64,
}

impl PhaseRecord {
  pub fn duration(&self) -> Duration {
    Duration::from_millis(self.duration_ms)
  }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
  pub phases: Vec<PhaseRecord>,
  /// Final store entries keyed by module name.
  pub entries: BTreeMap<String, EntryRecord>,
  pub freshness: FreshnessReport,
}

impl RunReport {
  pub fn phase(&self, phase: Phase) -> Option<&PhaseRecord> {
    self.phases.iter().find(|r| r.phase == phase)
  }

  /// Modules whose entry changed at any point of the run.
  pub fn written(&self) -> Vec<&str> {
    let mut written: Vec<&str> = self
      .phases
      .iter()
      .flat_map(|r| r.written.iter().map(String::as_str))
      .collect();
    written.sort_unstable();
    written.dedup();
    written
  }

  pub fn total_duration(&self) -> Duration {
    self.phases.iter().map(PhaseRecord::duration).sum()
  }
}

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("{phase} failed")]
  Build {
    phase: Phase,
    #[source]
    source: BuildError,
  },

  #[error("{phase} failed")]
  Collect {
    phase: Phase,
    #[source]
    source: CollectError,
  },

  #[error("cannot rebuild {embedding}: {missing} was not staged by the preceding collect")]
  SequencingViolation { embedding: String, missing: String },

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("embedding entries are stale after the rebuild:\n{0}")]
  StaleEmbedding(FreshnessReport),

  #[error("cancelled before {phase}")]
  Cancelled { phase: Phase },
}

impl PipelineError {
  /// Phase the run was in when it failed, if the error is tied to one.
  pub fn phase(&self) -> Option<Phase> {
    match self {
      PipelineError::Build { phase, .. }
      | PipelineError::Collect { phase, .. }
      | PipelineError::Cancelled { phase } => Some(*phase),
      PipelineError::SequencingViolation { .. } => Some(Phase::EmbeddingRebuild),
      PipelineError::StaleEmbedding(_) => Some(Phase::FinalCollect),
      PipelineError::Store(_) => None,
    }
  }
}
