//! Workspace configuration (`resforge.json`).
//!
//! The configuration file lives at the workspace root and lists the contract
//! modules the pipeline knows about. Relative paths resolve against the
//! directory containing the file.
//!
//! ```json
//! {
//!   "target": "wasm32-unknown-unknown",
//!   "profile": "release",
//!   "res_dir": "res",
//!   "modules": [
//!     { "name": "token-set-fungible-token", "path": "token-set" },
//!     {
//!       "name": "deployer-contract",
//!       "embeds": ["token-set-fungible-token"]
//!     }
//!   ]
//! }
//! ```
//!
//! Environment overrides: `RESFORGE_RES_DIR`, `RESFORGE_TARGET_DIR`, and
//! `CARGO` for the compiler binary.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{
  DEFAULT_PROFILE, DEFAULT_RES_DIR, DEFAULT_RUSTFLAGS, DEFAULT_TARGET, ENV_CARGO, ENV_RES_DIR, ENV_TARGET_DIR,
  STAGING_DIRNAME,
};
use crate::workspace::{Module, Role, TargetFormat, Workspace, WorkspaceError};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid workspace: {0}")]
  Workspace(#[from] WorkspaceError),
}

/// On-disk shape of `resforge.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
  #[serde(default = "default_target")]
  pub target: String,

  #[serde(default = "default_profile")]
  pub profile: String,

  #[serde(default = "default_res_dir")]
  pub res_dir: PathBuf,

  /// Cargo target directory; `<root>/target` when absent.
  #[serde(default)]
  pub target_dir: Option<PathBuf>,

  /// `RUSTFLAGS` for every compile. `null` leaves the environment untouched.
  #[serde(default = "default_rustflags")]
  pub rustflags: Option<String>,

  pub modules: Vec<ModuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
  pub name: String,

  /// Source directory; defaults to a directory named after the module.
  #[serde(default)]
  pub path: Option<PathBuf>,

  #[serde(default)]
  pub embeds: Vec<String>,
}

fn default_target() -> String {
  DEFAULT_TARGET.to_string()
}

fn default_profile() -> String {
  DEFAULT_PROFILE.to_string()
}

fn default_res_dir() -> PathBuf {
  PathBuf::from(DEFAULT_RES_DIR)
}

fn default_rustflags() -> Option<String> {
  Some(DEFAULT_RUSTFLAGS.to_string())
}

impl ModuleConfig {
  fn into_module(self, root: &Path) -> Module {
    let path = root.join(self.path.unwrap_or_else(|| PathBuf::from(&self.name)));
    let role = if self.embeds.is_empty() {
      Role::Ordinary
    } else {
      Role::Embedding { embeds: self.embeds }
    };
    Module {
      name: self.name,
      path,
      role,
    }
  }
}

/// Fully resolved configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct Config {
  pub workspace: Workspace,
  pub target: TargetFormat,
  /// The Resource Store directory.
  pub res_dir: PathBuf,
  pub target_dir: PathBuf,
  pub rustflags: Option<String>,
  /// Compiler binary.
  pub cargo: PathBuf,
}

impl Config {
  /// Load and validate the configuration file at `path`.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ConfigError::NotFound(path.to_path_buf())),
      Err(source) => {
        return Err(ConfigError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    let file: ConfigFile = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    let canonical = dunce::canonicalize(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let root = canonical.parent().map(Path::to_path_buf).unwrap_or_default();

    debug!(path = %canonical.display(), root = %root.display(), "loaded config");
    Self::from_file(file, &root)
  }

  /// Resolve a parsed configuration against the workspace root.
  pub fn from_file(file: ConfigFile, root: &Path) -> Result<Self, ConfigError> {
    let modules = file.modules.into_iter().map(|m| m.into_module(root)).collect();
    let workspace = Workspace::new(root, modules)?;

    let res_dir = match std::env::var(ENV_RES_DIR) {
      Ok(dir) => PathBuf::from(dir),
      Err(_) => root.join(&file.res_dir),
    };
    let target_dir = match std::env::var(ENV_TARGET_DIR) {
      Ok(dir) => PathBuf::from(dir),
      Err(_) => root.join(file.target_dir.unwrap_or_else(|| PathBuf::from("target"))),
    };
    let cargo = std::env::var(ENV_CARGO)
      .map(PathBuf::from)
      .unwrap_or_else(|_| PathBuf::from("cargo"));

    Ok(Self {
      workspace,
      target: TargetFormat {
        triple: file.target,
        profile: file.profile,
      },
      res_dir,
      target_dir,
      rustflags: file.rustflags,
      cargo,
    })
  }

  /// Root of the per-phase build arenas.
  pub fn staging_dir(&self) -> PathBuf {
    self.target_dir.join(STAGING_DIRNAME)
  }
}
