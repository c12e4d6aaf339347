//! Test utilities for resforge-lib.
//!
//! [`FakeCompiler`] stands in for Cargo. It models `include_bytes!` the way the
//! real deployer contract uses it: compiling an embedding module reads the
//! current Resource Store entries of the modules it embeds.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::build::{BuildError, BuildFailure, Compiler};
use crate::consts::WASM_MAGIC;
use crate::workspace::{BuildScope, Module, TargetFormat, Workspace};

/// `token` is embedded by `deployer`.
pub fn token_deployer_workspace(root: &Path) -> Workspace {
  Workspace::new(
    root,
    vec![
      Module::ordinary("token", root.join("token")),
      Module::embedding("deployer", root.join("deployer"), &["token"]),
    ],
  )
  .unwrap()
}

/// Decoded content of a binary produced by [`FakeCompiler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeArtifact {
  pub module: String,
  pub source: String,
  /// Bytes read from the store per embedded module; `None` if the entry was absent.
  pub embedded: BTreeMap<String, Option<Vec<u8>>>,
}

impl FakeArtifact {
  pub fn decode(bytes: &[u8]) -> Self {
    assert!(bytes.starts_with(WASM_MAGIC), "not a fake wasm binary");
    serde_json::from_slice(&bytes[WASM_MAGIC.len()..]).unwrap()
  }

  fn encode(&self) -> Vec<u8> {
    let mut bytes = WASM_MAGIC.to_vec();
    bytes.extend(serde_json::to_vec(self).unwrap());
    bytes
  }
}

type CompileHook = Arc<dyn Fn(&BuildScope) + Send + Sync>;

#[derive(Default)]
struct FakeState {
  sources: HashMap<String, String>,
  failures: HashMap<String, String>,
  rebuild_failures: HashMap<String, String>,
  invocations: Vec<String>,
  hook: Option<CompileHook>,
}

#[derive(Clone)]
pub struct FakeCompiler {
  workspace: Workspace,
  res_dir: PathBuf,
  state: Arc<Mutex<FakeState>>,
}

impl FakeCompiler {
  pub fn new(workspace: &Workspace, res_dir: impl Into<PathBuf>) -> Self {
    let mut state = FakeState::default();
    for module in workspace.modules() {
      state.sources.insert(module.name.clone(), format!("{} v1", module.name));
    }
    Self {
      workspace: workspace.clone(),
      res_dir: res_dir.into(),
      state: Arc::new(Mutex::new(state)),
    }
  }

  /// Change a module's source; its next compile produces different bytes.
  pub fn edit(&self, module: &str, source: &str) {
    let mut state = self.state.lock().unwrap();
    state.sources.insert(module.to_string(), source.to_string());
    state.failures.remove(module);
    state.rebuild_failures.remove(module);
  }

  /// Make every compile that includes `module` fail with `diagnostic`.
  pub fn fail(&self, module: &str, diagnostic: &str) {
    let mut state = self.state.lock().unwrap();
    state.failures.insert(module.to_string(), diagnostic.to_string());
  }

  /// Make only single-module compiles of `module` fail.
  pub fn fail_rebuild(&self, module: &str, diagnostic: &str) {
    let mut state = self.state.lock().unwrap();
    state.rebuild_failures.insert(module.to_string(), diagnostic.to_string());
  }

  /// Run `hook` after each compile is recorded, before any output is written.
  pub fn on_compile(&self, hook: impl Fn(&BuildScope) + Send + Sync + 'static) {
    self.state.lock().unwrap().hook = Some(Arc::new(hook));
  }

  /// Scopes compiled so far, rendered with `Display`.
  pub fn invocations(&self) -> Vec<String> {
    self.state.lock().unwrap().invocations.clone()
  }

  fn compile_module(&self, module: &Module, source: &str) -> Vec<u8> {
    let embedded = module
      .embeds()
      .iter()
      .map(|name| {
        let file_name = self.workspace.module(name).unwrap().artifact_file_name();
        (name.clone(), std::fs::read(self.res_dir.join(file_name)).ok())
      })
      .collect();
    FakeArtifact {
      module: module.name.clone(),
      source: source.to_string(),
      embedded,
    }
    .encode()
  }
}

impl Compiler for FakeCompiler {
  async fn compile(
    &self,
    scope: &BuildScope,
    _target: &TargetFormat,
    out_dir: &Path,
  ) -> Result<Vec<PathBuf>, BuildError> {
    let modules: Vec<Module> = self
      .workspace
      .scope_modules(scope)
      .unwrap()
      .into_iter()
      .cloned()
      .collect();

    let (sources, failures, hook) = {
      let mut state = self.state.lock().unwrap();
      state.invocations.push(scope.to_string());
      let mut failures = state.failures.clone();
      if let BuildScope::Module(name) = scope
        && let Some(diagnostic) = state.rebuild_failures.get(name)
      {
        failures.insert(name.clone(), diagnostic.clone());
      }
      (state.sources.clone(), failures, state.hook.clone())
    };
    if let Some(hook) = hook {
      hook(scope);
    }

    let failed: Vec<&Module> = modules.iter().filter(|m| failures.contains_key(&m.name)).collect();
    if !failed.is_empty() {
      return Err(
        BuildFailure {
          scope: scope.clone(),
          modules: failed.iter().map(|m| m.name.clone()).collect(),
          exit_code: Some(101),
          diagnostic: failed.iter().map(|m| failures[&m.name].clone()).collect::<Vec<_>>().join("\n"),
        }
        .into(),
      );
    }

    let mut produced = Vec::new();
    for module in &modules {
      let path = out_dir.join(module.artifact_file_name());
      std::fs::write(&path, self.compile_module(module, &sources[&module.name])).unwrap();
      produced.push(path);
    }
    Ok(produced)
  }
}

/// Writes an executable shell script standing in for `cargo`.
#[cfg(unix)]
pub fn fake_cargo(dir: &Path, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join("fake-cargo");
  std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}
