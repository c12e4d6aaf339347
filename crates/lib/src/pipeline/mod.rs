//! The Embedding Rebuild Trigger.
//!
//! Drives one complete run as a state machine:
//!
//! ```text
//! Start -> FirstBuild -> FirstCollect -> EmbeddingRebuild -> FinalCollect -> Done
//!               \              \                \                  \
//!                `--------------`----------------`------------------`--> Failed
//! ```
//!
//! The first build compiles the whole workspace. Ordinary entries staged by
//! the first collect are final, but every embedding entry still bundles
//! whatever the store held before the run. Each embedding module is then
//! recompiled on its own against the refreshed entries and collected again.
//!
//! Nothing is collected from a failed build, and each phase writes into its own
//! arena, so a failure leaves the store as the last completed collect left it.

mod types;
pub mod verify;

pub use types::*;
pub use verify::{FreshnessIssue, FreshnessReport, verify_freshness};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::build::{BuildOutput, Compiler, WorkspaceBuilder};
use crate::collect::{ArtifactCollector, CollectReport};
use crate::store::{EmbeddedRef, Provenance, ResourceStore};
use crate::workspace::{BuildScope, Module, Workspace};

type PhaseObserver = Arc<dyn Fn(Phase) + Send + Sync>;

pub struct Pipeline<C> {
  builder: WorkspaceBuilder<C>,
  store: ResourceStore,
  cancel: CancelFlag,
  phase: Phase,
  observer: Option<PhaseObserver>,
}

/// An embedding module rebuilt against a known store state.
struct Rebuilt {
  module: Module,
  provenance: Provenance,
  output: BuildOutput,
}

impl<C: Compiler> Pipeline<C> {
  pub fn new(builder: WorkspaceBuilder<C>, store: ResourceStore) -> Self {
    Self {
      builder,
      store,
      cancel: CancelFlag::new(),
      phase: Phase::Start,
      observer: None,
    }
  }

  pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
    self.cancel = cancel;
    self
  }

  /// Call `observer` with every phase the run enters, after it is entered.
  pub fn on_phase(mut self, observer: impl Fn(Phase) + Send + Sync + 'static) -> Self {
    self.observer = Some(Arc::new(observer));
    self
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn store(&self) -> &ResourceStore {
    &self.store
  }

  /// Run every phase to completion.
  pub async fn run(&mut self) -> Result<RunReport, PipelineError> {
    let started = Instant::now();
    self.phase = Phase::Start;

    match self.run_phases().await {
      Ok(report) => {
        self.advance(Phase::Done);
        info!(
          entries = report.entries.len(),
          written = report.written().len(),
          elapsed_ms = started.elapsed().as_millis() as u64,
          "pipeline complete"
        );
        Ok(report)
      }
      Err(err) => {
        warn!(phase = %self.phase, error = %err, "pipeline failed");
        self.phase = Phase::Failed;
        Err(err)
      }
    }
  }

  async fn run_phases(&mut self) -> Result<RunReport, PipelineError> {
    let workspace = self.builder.workspace().clone();
    let mut report = RunReport::default();
    self.store.ensure_writable()?;

    // FirstBuild
    self.enter(Phase::FirstBuild)?;
    let timer = Instant::now();
    let output = self
      .builder
      .build(&BuildScope::All)
      .await
      .map_err(|source| PipelineError::Build {
        phase: Phase::FirstBuild,
        source,
      })?;
    report.phases.push(build_record(Phase::FirstBuild, module_names(workspace.modules()), timer));

    // FirstCollect
    self.enter(Phase::FirstCollect)?;
    let timer = Instant::now();
    let expected: Vec<&Module> = workspace.modules().iter().collect();
    let first = self.collect(&workspace, &output, &expected, Phase::FirstCollect)?;
    drop(output);
    report.phases.push(collect_record(Phase::FirstCollect, &first, timer));

    // EmbeddingRebuild
    self.enter(Phase::EmbeddingRebuild)?;
    let timer = Instant::now();
    let mut rebuilt = Vec::new();
    for module in workspace.embedding_modules() {
      let provenance = self.snapshot(module, &first)?;
      debug!(module = %module.name, built_after = provenance.built_after, "rebuilding embedding module");

      let output = self
        .builder
        .build(&BuildScope::Module(module.name.clone()))
        .await
        .map_err(|source| PipelineError::Build {
          phase: Phase::EmbeddingRebuild,
          source,
        })?;
      rebuilt.push(Rebuilt {
        module: module.clone(),
        provenance,
        output,
      });
    }
    let rebuilt_names = rebuilt.iter().map(|r| r.module.name.clone()).collect();
    report.phases.push(build_record(Phase::EmbeddingRebuild, rebuilt_names, timer));

    // FinalCollect
    self.enter(Phase::FinalCollect)?;
    let timer = Instant::now();
    let mut last = CollectReport::default();
    for Rebuilt {
      module,
      provenance,
      output,
    } in rebuilt
    {
      let collected = self.collect(&workspace, &output, &[&module], Phase::FinalCollect)?;
      self.store.attach_provenance(&module, provenance)?;
      last.written.extend(collected.written);
      last.unchanged.extend(collected.unchanged);
      last.ignored.extend(collected.ignored);
    }
    report.phases.push(collect_record(Phase::FinalCollect, &last, timer));

    let freshness = verify_freshness(&workspace, &self.store)?;
    if !freshness.is_fresh() {
      return Err(PipelineError::StaleEmbedding(freshness));
    }

    report.entries = self.store.load_manifest()?.entries;
    report.freshness = freshness;
    Ok(report)
  }

  /// Move to `phase` unless the run has been cancelled.
  fn enter(&mut self, phase: Phase) -> Result<(), PipelineError> {
    if self.cancel.is_cancelled() {
      info!(phase = %phase, "cancellation requested");
      return Err(PipelineError::Cancelled { phase });
    }
    self.advance(phase);
    Ok(())
  }

  fn advance(&mut self, phase: Phase) {
    debug_assert_eq!(self.phase.next(), Some(phase), "invalid transition");
    info!(from = %self.phase, to = %phase, "pipeline phase");
    self.phase = phase;
    if let Some(observer) = &self.observer {
      observer(phase);
    }
  }

  fn collect(
    &self,
    workspace: &Workspace,
    output: &BuildOutput,
    expected: &[&Module],
    phase: Phase,
  ) -> Result<CollectReport, PipelineError> {
    ArtifactCollector::new(workspace, &self.store)
      .collect_expected(output.location(), expected)
      .map_err(|source| PipelineError::Collect { phase, source })
  }

  /// Record what `module` is about to embed.
  ///
  /// Every embedded module must have been staged by the first collect of this
  /// run and still be present in the store.
  fn snapshot(&self, module: &Module, first: &CollectReport) -> Result<Provenance, PipelineError> {
    let manifest = self.store.load_manifest()?;
    let mut embedded = BTreeMap::new();

    for name in module.embeds() {
      let violation = || PipelineError::SequencingViolation {
        embedding: module.name.clone(),
        missing: name.clone(),
      };
      if !first.staged(name) {
        return Err(violation());
      }
      let record = manifest.get(name).ok_or_else(violation)?;
      if !self.store.root().join(&record.file_name).is_file() {
        return Err(violation());
      }
      embedded.insert(name.clone(), EmbeddedRef::from(record));
    }

    Ok(Provenance {
      built_after: manifest.clock,
      embedded,
    })
  }
}

fn module_names(modules: &[Module]) -> Vec<String> {
  modules.iter().map(|m| m.name.clone()).collect()
}

fn elapsed_ms(timer: Instant) -> u64 {
  timer.elapsed().as_millis() as u64
}

fn build_record(phase: Phase, modules: Vec<String>, timer: Instant) -> PhaseRecord {
  PhaseRecord {
    phase,
    modules,
    written: Vec::new(),
    duration_ms: elapsed_ms(timer),
  }
}

fn collect_record(phase: Phase, collected: &CollectReport, timer: Instant) -> PhaseRecord {
  let mut modules: Vec<String> = collected.written.iter().chain(&collected.unchanged).cloned().collect();
  modules.sort();
  PhaseRecord {
    phase,
    modules,
    written: collected.written.clone(),
    duration_ms: elapsed_ms(timer),
  }
}
