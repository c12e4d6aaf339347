//! The Workspace Builder.
//!
//! Runs the external compiler for one [`BuildScope`] and hands back the
//! produced binaries. The compiler sits behind the [`Compiler`] trait; the
//! production implementation drives Cargo (see [`cargo`]).
//!
//! Every build writes into a fresh arena directory under the staging root.
//! The builder never touches the Resource Store.
//!
//! # Submodules
//!
//! - [`cargo`] - `cargo build` invocation and JSON message parsing

pub mod cargo;
mod types;

pub use types::*;

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::workspace::{BuildScope, TargetFormat, Workspace};

/// The external compiler.
///
/// Implementations compile `scope` for `target` and place every produced
/// bytecode binary inside `out_dir`, returning their paths.
pub trait Compiler {
  fn compile(
    &self,
    scope: &BuildScope,
    target: &TargetFormat,
    out_dir: &Path,
  ) -> impl Future<Output = Result<Vec<PathBuf>, BuildError>> + Send;
}

pub struct WorkspaceBuilder<C> {
  workspace: Workspace,
  compiler: C,
  target: TargetFormat,
  staging_dir: PathBuf,
}

impl<C: Compiler> WorkspaceBuilder<C> {
  pub fn new(workspace: Workspace, compiler: C, target: TargetFormat, staging_dir: impl Into<PathBuf>) -> Self {
    Self {
      workspace,
      compiler,
      target,
      staging_dir: staging_dir.into(),
    }
  }

  pub fn workspace(&self) -> &Workspace {
    &self.workspace
  }

  pub fn target(&self) -> &TargetFormat {
    &self.target
  }

  /// Compile `scope` into a new arena.
  ///
  /// A single-module scope must name a known module; the compiler is not
  /// invoked otherwise.
  pub async fn build(&self, scope: &BuildScope) -> Result<BuildOutput, BuildError> {
    if let BuildScope::Module(name) = scope
      && self.workspace.module(name).is_none()
    {
      return Err(BuildError::UnknownModule(name.clone()));
    }

    let arena = self.create_arena(scope)?;
    info!(%scope, target = %self.target, "building");

    let binaries = self.compiler.compile(scope, &self.target, arena.path()).await?;

    for binary in &binaries {
      if !binary.is_file() {
        return Err(BuildError::MissingBinary(binary.clone()));
      }
    }

    debug!(%scope, count = binaries.len(), arena = %arena.path().display(), "build produced binaries");
    Ok(BuildOutput::new(scope.clone(), binaries, arena))
  }

  fn create_arena(&self, scope: &BuildScope) -> Result<tempfile::TempDir, BuildError> {
    let output_err = |source| BuildError::Output {
      path: self.staging_dir.clone(),
      source,
    };

    std::fs::create_dir_all(&self.staging_dir).map_err(output_err)?;
    let prefix = match scope {
      BuildScope::All => "all-".to_string(),
      BuildScope::Module(name) => format!("{}-", name),
    };
    tempfile::Builder::new()
      .prefix(&prefix)
      .tempdir_in(&self.staging_dir)
      .map_err(output_err)
  }
}
