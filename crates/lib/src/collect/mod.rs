//! The Artifact Collector.
//!
//! Stages bytecode binaries from a build output location into the Resource
//! Store. A file matches when its name is the artifact file name of a known
//! module; anything else is ignored.
//!
//! All matching files are read and validated before the first write, so a
//! missing, unreadable or malformed binary leaves the store untouched. Entries
//! are then staged one at a time: an I/O error while staging keeps the entries
//! staged before it. Each entry write is atomic, and `verify` reports any
//! embedding entry left inconsistent by a partial collect.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::consts::WASM_MAGIC;
use crate::store::{PutOutcome, ResourceStore, StoreError};
use crate::workspace::{Module, Workspace};

#[derive(Debug, Error)]
pub enum CollectError {
  #[error("failed to scan build output {path}: {message}")]
  Scan { path: PathBuf, message: String },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{path} is not a WebAssembly binary (module {module})")]
  InvalidArtifact { module: String, path: PathBuf },

  #[error("build output {location} has no binary for module {module}")]
  MissingArtifact { module: String, location: PathBuf },

  #[error(transparent)]
  Store(#[from] StoreError),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CollectReport {
  /// Modules whose entry changed.
  pub written: Vec<String>,
  /// Modules whose entry already held the collected bytes.
  pub unchanged: Vec<String>,
  /// Files that matched no module.
  pub ignored: Vec<PathBuf>,
}

impl CollectReport {
  /// Whether `module` now holds the collected bytes.
  pub fn staged(&self, module: &str) -> bool {
    self.written.iter().chain(&self.unchanged).any(|m| m == module)
  }

  pub fn staged_count(&self) -> usize {
    self.written.len() + self.unchanged.len()
  }
}

pub struct ArtifactCollector<'a> {
  workspace: &'a Workspace,
  store: &'a ResourceStore,
}

struct Candidate<'a> {
  module: &'a Module,
  bytes: Vec<u8>,
}

impl<'a> ArtifactCollector<'a> {
  pub fn new(workspace: &'a Workspace, store: &'a ResourceStore) -> Self {
    Self { workspace, store }
  }

  /// Stage every matching binary found in `location`.
  pub fn collect(&self, location: &Path) -> Result<CollectReport, CollectError> {
    self.collect_expected(location, &[])
  }

  /// Like [`collect`](Self::collect), but fails without writing anything when
  /// a binary for one of `expected` is absent.
  pub fn collect_expected(&self, location: &Path, expected: &[&Module]) -> Result<CollectReport, CollectError> {
    let mut report = CollectReport::default();
    let candidates = self.scan(location, &mut report)?;

    for module in expected {
      if !candidates.iter().any(|c| c.module.name == module.name) {
        return Err(CollectError::MissingArtifact {
          module: module.name.clone(),
          location: location.to_path_buf(),
        });
      }
    }

    for candidate in candidates {
      match self.store.put(candidate.module, &candidate.bytes)? {
        PutOutcome::Written(_) => report.written.push(candidate.module.name.clone()),
        PutOutcome::Unchanged(_) => report.unchanged.push(candidate.module.name.clone()),
      }
    }

    info!(
      location = %location.display(),
      written = report.written.len(),
      unchanged = report.unchanged.len(),
      ignored = report.ignored.len(),
      "collected artifacts"
    );
    Ok(report)
  }

  fn scan(&self, location: &Path, report: &mut CollectReport) -> Result<Vec<Candidate<'a>>, CollectError> {
    let walker = WalkDir::new(location).min_depth(1).max_depth(1).sort_by_file_name();

    let mut candidates = Vec::new();
    for entry in walker {
      let entry = entry.map_err(|e| CollectError::Scan {
        path: location.to_path_buf(),
        message: e.to_string(),
      })?;
      if !entry.file_type().is_file() {
        continue;
      }

      let path = entry.path();
      let module = entry.file_name().to_str().and_then(|name| self.workspace.module_for_file_name(name));
      let Some(module) = module else {
        debug!(path = %path.display(), "ignoring non-matching file");
        report.ignored.push(path.to_path_buf());
        continue;
      };

      let bytes = std::fs::read(path).map_err(|source| CollectError::Read {
        path: path.to_path_buf(),
        source,
      })?;
      if !bytes.starts_with(WASM_MAGIC) {
        return Err(CollectError::InvalidArtifact {
          module: module.name.clone(),
          path: path.to_path_buf(),
        });
      }
      candidates.push(Candidate { module, bytes });
    }
    Ok(candidates)
  }
}
