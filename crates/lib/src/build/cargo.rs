//! Cargo-backed [`Compiler`].
//!
//! Runs `cargo build --message-format=json` and reads Cargo's message stream
//! from stdout:
//!
//! - `compiler-artifact` messages list produced files; `.wasm` files are
//!   copied into the build's arena
//! - `compiler-message` messages carry rendered diagnostics, kept verbatim
//!
//! Cargo's stderr (progress lines and `could not compile` summaries) is kept
//! verbatim as well and appended to the diagnostic of a failed build.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{BuildError, BuildFailure, Compiler};
use crate::config::Config;
use crate::consts::ARTIFACT_EXTENSION;
use crate::workspace::{BuildScope, TargetFormat};

#[derive(Debug, Clone)]
pub struct CargoCompiler {
  cargo: PathBuf,
  /// Directory containing the workspace `Cargo.toml`.
  workspace_root: PathBuf,
  target_dir: PathBuf,
  rustflags: Option<String>,
}

impl CargoCompiler {
  pub fn new(cargo: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
    Self {
      cargo: cargo.into(),
      workspace_root: workspace_root.into(),
      target_dir: target_dir.into(),
      rustflags: None,
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(&config.cargo, config.workspace.root(), &config.target_dir).with_rustflags(config.rustflags.clone())
  }

  pub fn with_rustflags(mut self, rustflags: Option<String>) -> Self {
    self.rustflags = rustflags;
    self
  }

  /// Arguments passed to cargo for one scope.
  pub fn args(&self, scope: &BuildScope, target: &TargetFormat) -> Vec<String> {
    let mut args = vec![
      "build".to_string(),
      "--manifest-path".to_string(),
      self.workspace_root.join("Cargo.toml").to_string_lossy().to_string(),
      "--target".to_string(),
      target.triple.clone(),
      "--profile".to_string(),
      target.profile.clone(),
      "--target-dir".to_string(),
      self.target_dir.to_string_lossy().to_string(),
      "--message-format=json".to_string(),
    ];
    match scope {
      BuildScope::All => args.push("--workspace".to_string()),
      BuildScope::Module(name) => {
        args.push("-p".to_string());
        args.push(name.clone());
      }
    }
    args
  }

  fn command(&self, scope: &BuildScope, target: &TargetFormat) -> Command {
    let mut cmd = Command::new(&self.cargo);
    cmd
      .args(self.args(scope, target))
      .current_dir(&self.workspace_root)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(flags) = &self.rustflags {
      cmd.env("RUSTFLAGS", flags);
    }
    // Keep terminal interrupts away from cargo; the pipeline decides when to stop.
    #[cfg(unix)]
    cmd.process_group(0);
    #[cfg(windows)]
    cmd.creation_flags(windows_sys::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP);
    cmd
  }
}

impl Compiler for CargoCompiler {
  async fn compile(
    &self,
    scope: &BuildScope,
    target: &TargetFormat,
    out_dir: &Path,
  ) -> Result<Vec<PathBuf>, BuildError> {
    let program = self.cargo.to_string_lossy().to_string();
    debug!(%program, args = ?self.args(scope, target), "spawning compiler");

    let output = self
      .command(scope, target)
      .output()
      .await
      .map_err(|source| BuildError::Spawn { program, source })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let messages = parse_messages(&stdout);

    if !output.status.success() {
      let mut modules = messages.failed_packages.clone();
      for name in failed_from_stderr(&stderr) {
        if !modules.contains(&name) {
          modules.push(name);
        }
      }

      let mut diagnostic = messages.diagnostics.concat();
      diagnostic.push_str(&stderr);

      warn!(%scope, ?modules, code = ?output.status.code(), "compiler failed");
      return Err(
        BuildFailure {
          scope: scope.clone(),
          modules,
          exit_code: output.status.code(),
          diagnostic,
        }
        .into(),
      );
    }

    let mut produced = Vec::new();
    for artifact in &messages.artifacts {
      let Some(file_name) = artifact.file_name() else {
        continue;
      };
      let dest = out_dir.join(file_name);
      tokio::fs::copy(artifact, &dest).await.map_err(|source| BuildError::Output {
        path: artifact.clone(),
        source,
      })?;
      produced.push(dest);
    }

    info!(%scope, binaries = produced.len(), "compiler finished");
    Ok(produced)
  }
}

/// The parts of Cargo's JSON message stream the builder cares about.
#[derive(Debug, Default, PartialEq)]
pub struct CargoMessages {
  /// Produced `.wasm` files, deduplicated, in report order.
  pub artifacts: Vec<PathBuf>,
  /// Rendered diagnostics, verbatim.
  pub diagnostics: Vec<String>,
  /// Packages with at least one error-level diagnostic.
  pub failed_packages: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
enum Message {
  CompilerArtifact {
    filenames: Vec<PathBuf>,
  },
  CompilerMessage {
    package_id: String,
    message: Diagnostic,
  },
  #[serde(other)]
  Other,
}

#[derive(Debug, Deserialize)]
struct Diagnostic {
  level: String,
  rendered: Option<String>,
}

pub fn parse_messages(stdout: &str) -> CargoMessages {
  let mut parsed = CargoMessages::default();
  let mut seen = BTreeSet::new();

  for line in stdout.lines().filter(|l| l.starts_with('{')) {
    let message = match serde_json::from_str::<Message>(line) {
      Ok(message) => message,
      Err(e) => {
        debug!(error = %e, "skipping unrecognised cargo message");
        continue;
      }
    };

    match message {
      Message::CompilerArtifact { filenames } => {
        for file in filenames {
          let is_wasm = file.extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION);
          if is_wasm && seen.insert(file.clone()) {
            parsed.artifacts.push(file);
          }
        }
      }
      Message::CompilerMessage { package_id, message } => {
        if let Some(rendered) = message.rendered {
          parsed.diagnostics.push(rendered);
        }
        if message.level == "error" {
          let name = package_name(&package_id);
          if !parsed.failed_packages.contains(&name) {
            parsed.failed_packages.push(name);
          }
        }
      }
      Message::Other => {}
    }
  }

  parsed
}

/// Extracts the package name from a Cargo package id.
///
/// Handles both the legacy `name version (source)` form and the
/// `source#name@version` form, where `#version` alone means the name is the
/// last path segment of the source.
pub fn package_name(package_id: &str) -> String {
  if let Some((name, _)) = package_id.split_once(' ') {
    return name.to_string();
  }
  let Some((source, fragment)) = package_id.rsplit_once('#') else {
    return package_id.to_string();
  };

  match fragment.split_once('@') {
    Some((name, _version)) => name.to_string(),
    None => source
      .trim_end_matches('/')
      .rsplit('/')
      .next()
      .unwrap_or(source)
      .to_string(),
  }
}

/// Package names from ``error: could not compile `name` `` lines.
pub fn failed_from_stderr(stderr: &str) -> Vec<String> {
  const MARKER: &str = "could not compile `";

  let mut names = Vec::new();
  for line in stderr.lines() {
    let Some(start) = line.find(MARKER) else {
      continue;
    };
    let rest = &line[start + MARKER.len()..];
    if let Some(end) = rest.find('`') {
      let name = rest[..end].to_string();
      if !names.contains(&name) {
        names.push(name);
      }
    }
  }
  names
}
