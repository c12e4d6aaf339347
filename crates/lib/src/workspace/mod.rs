//! Workspace model: the set of known modules and their roles.
//!
//! A [`Workspace`] is always validated on construction:
//!
//! - module names are unique and non-empty
//! - no two modules map to the same artifact file name
//! - every embedding module embeds only known, ordinary modules, and never itself

mod types;

pub use types::*;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkspaceError {
  #[error("workspace declares no modules")]
  Empty,

  #[error("module name must not be empty")]
  EmptyName,

  #[error("duplicate module: {0}")]
  DuplicateModule(String),

  #[error("modules {first} and {second} both build {file_name}")]
  ArtifactNameCollision {
    first: String,
    second: String,
    file_name: String,
  },

  #[error("module {0} embeds itself")]
  SelfEmbed(String),

  #[error("module {module} embeds unknown module {embeds}")]
  UnknownEmbed { module: String, embeds: String },

  #[error("module {module} embeds {embeds}, which is itself an embedding module")]
  EmbedsEmbedding { module: String, embeds: String },

  #[error("unknown module: {0}")]
  UnknownModule(String),
}

#[derive(Debug, Clone)]
pub struct Workspace {
  root: PathBuf,
  modules: Vec<Module>,
}

impl Workspace {
  pub fn new(root: impl Into<PathBuf>, modules: Vec<Module>) -> Result<Self, WorkspaceError> {
    if modules.is_empty() {
      return Err(WorkspaceError::Empty);
    }

    let mut names = HashSet::new();
    let mut file_names: HashMap<String, &str> = HashMap::new();
    for module in &modules {
      if module.name.is_empty() {
        return Err(WorkspaceError::EmptyName);
      }
      if !names.insert(module.name.as_str()) {
        return Err(WorkspaceError::DuplicateModule(module.name.clone()));
      }
      let file_name = module.artifact_file_name();
      if let Some(first) = file_names.get(&file_name) {
        return Err(WorkspaceError::ArtifactNameCollision {
          first: first.to_string(),
          second: module.name.clone(),
          file_name,
        });
      }
      file_names.insert(file_name, &module.name);
    }

    for module in &modules {
      for embedded in module.embeds() {
        if *embedded == module.name {
          return Err(WorkspaceError::SelfEmbed(module.name.clone()));
        }
        let Some(target) = modules.iter().find(|m| m.name == *embedded) else {
          return Err(WorkspaceError::UnknownEmbed {
            module: module.name.clone(),
            embeds: embedded.clone(),
          });
        };
        if target.is_embedding() {
          return Err(WorkspaceError::EmbedsEmbedding {
            module: module.name.clone(),
            embeds: embedded.clone(),
          });
        }
      }
    }

    Ok(Self {
      root: root.into(),
      modules,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// All modules, in declaration order.
  pub fn modules(&self) -> &[Module] {
    &self.modules
  }

  pub fn module(&self, name: &str) -> Option<&Module> {
    self.modules.iter().find(|m| m.name == name)
  }

  pub fn embedding_modules(&self) -> impl Iterator<Item = &Module> {
    self.modules.iter().filter(|m| m.is_embedding())
  }

  /// Resolves a binary's file name back to the module that builds it.
  pub fn module_for_file_name(&self, file_name: &str) -> Option<&Module> {
    self.modules.iter().find(|m| m.artifact_file_name() == file_name)
  }

  /// Modules a scope is expected to produce binaries for.
  pub fn scope_modules(&self, scope: &BuildScope) -> Result<Vec<&Module>, WorkspaceError> {
    match scope {
      BuildScope::All => Ok(self.modules.iter().collect()),
      BuildScope::Module(name) => self
        .module(name)
        .map(|m| vec![m])
        .ok_or_else(|| WorkspaceError::UnknownModule(name.clone())),
    }
  }
}
