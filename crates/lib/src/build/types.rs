use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;

use crate::workspace::BuildScope;

/// The compiler rejected one or more modules.
///
/// `Display` gives a one-line summary. `diagnostic` is the compiler's own
/// output, kept verbatim so callers can show it to the user unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
  pub scope: BuildScope,
  /// Packages the compiler reported as failing, in report order.
  pub modules: Vec<String>,
  pub exit_code: Option<i32>,
  pub diagnostic: String,
}

impl fmt::Display for BuildFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "build of {} failed", self.scope)?;
    if !self.modules.is_empty() {
      write!(f, " in {}", self.modules.join(", "))?;
    }
    if let Some(code) = self.exit_code {
      write!(f, " (exit code {})", code)?;
    }
    Ok(())
  }
}

impl std::error::Error for BuildFailure {}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Failed(#[from] BuildFailure),

  #[error("cannot build unknown module {0}")]
  UnknownModule(String),

  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to prepare build output {path}: {source}")]
  Output {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("compiler reported {0}, which does not exist")]
  MissingBinary(PathBuf),
}

/// Binaries produced by one build, held in that build's own arena.
///
/// The arena directory is removed when the output is dropped, so binaries from
/// a build that is never collected are discarded.
#[derive(Debug)]
pub struct BuildOutput {
  pub scope: BuildScope,
  pub binaries: Vec<PathBuf>,
  arena: TempDir,
}

impl BuildOutput {
  pub fn new(scope: BuildScope, binaries: Vec<PathBuf>, arena: TempDir) -> Self {
    Self { scope, binaries, arena }
  }

  /// The directory the Artifact Collector scans.
  pub fn location(&self) -> &Path {
    self.arena.path()
  }
}
