use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{ARTIFACT_EXTENSION, DEFAULT_PROFILE, DEFAULT_TARGET};

/// How a module participates in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Role {
  /// Compiles to one standalone binary.
  Ordinary,
  /// Reads the Resource Store entries of `embeds` at its own build time.
  Embedding { embeds: Vec<String> },
}

/// A compilable contract unit, identified by its package name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
  pub name: String,
  /// Source location, absolute once the workspace has been loaded.
  pub path: PathBuf,
  #[serde(flatten)]
  pub role: Role,
}

impl Module {
  pub fn ordinary(name: &str, path: impl Into<PathBuf>) -> Self {
    Self {
      name: name.to_string(),
      path: path.into(),
      role: Role::Ordinary,
    }
  }

  pub fn embedding(name: &str, path: impl Into<PathBuf>, embeds: &[&str]) -> Self {
    Self {
      name: name.to_string(),
      path: path.into(),
      role: Role::Embedding {
        embeds: embeds.iter().map(|s| s.to_string()).collect(),
      },
    }
  }

  pub fn is_embedding(&self) -> bool {
    matches!(self.role, Role::Embedding { .. })
  }

  /// Names of the modules this module embeds; empty for ordinary modules.
  pub fn embeds(&self) -> &[String] {
    match &self.role {
      Role::Ordinary => &[],
      Role::Embedding { embeds } => embeds,
    }
  }

  pub fn artifact_file_name(&self) -> String {
    artifact_file_name(&self.name)
  }
}

/// Maps a module name to the file name of its bytecode binary.
///
/// Cargo replaces `-` with `_` in library target names, so
/// `token-set-fungible-token` builds `token_set_fungible_token.wasm`.
pub fn artifact_file_name(module: &str) -> String {
  format!("{}.{}", module.replace('-', "_"), ARTIFACT_EXTENSION)
}

/// A single request to the Workspace Builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildScope {
  All,
  Module(String),
}

impl fmt::Display for BuildScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildScope::All => write!(f, "all"),
      BuildScope::Module(name) => write!(f, "module {}", name),
    }
  }
}

/// The bytecode format every build of a run targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFormat {
  pub triple: String,
  pub profile: String,
}

impl Default for TargetFormat {
  fn default() -> Self {
    Self {
      triple: DEFAULT_TARGET.to_string(),
      profile: DEFAULT_PROFILE.to_string(),
    }
  }
}

impl fmt::Display for TargetFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.triple, self.profile)
  }
}
