//! The Resource Store: one bytecode binary per module name.
//!
//! # Layout
//!
//! ```text
//! res/
//! ├── .resforge.lock              # Run lock (see [`lock`])
//! ├── .resforge-manifest.json     # Entry ledger (see [`manifest`])
//! ├── token_set_fungible_token.wasm
//! └── deployer_contract.wasm
//! ```
//!
//! Files that belong to no configured module are left alone. Every write goes
//! to a temporary file in the store directory and is renamed into place, so a
//! reader never observes a partially written entry.
//!
//! A store handle always holds the run lock. Only handles opened with
//! [`ResourceStore::open_exclusive`] can write; clones share the same lock.

pub mod lock;
pub mod manifest;

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::MANIFEST_FILENAME;
use crate::util::hash::{ContentHash, hash_bytes, hash_file};
use crate::workspace::Module;
use lock::RunLock;

pub use lock::{Access, Holder, RunLockError};
pub use manifest::{EmbeddedRef, EntryRecord, MANIFEST_VERSION, Provenance, StoreManifest};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to create resource directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse store manifest: {0}")]
  ParseManifest(#[source] serde_json::Error),

  #[error("failed to serialize store manifest: {0}")]
  SerializeManifest(#[source] serde_json::Error),

  #[error("unsupported store manifest version {0}, expected {MANIFEST_VERSION}")]
  UnsupportedVersion(u32),

  #[error("no resource store entry for module {0}")]
  MissingEntry(String),

  #[error(transparent)]
  Lock(#[from] RunLockError),

  #[error("resource store {0} was opened read-only")]
  ReadOnly(PathBuf),
}

/// Result of staging bytes for one module.
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
  /// The entry's bytes changed.
  Written(EntryRecord),
  /// The entry already held these bytes; nothing was touched.
  Unchanged(EntryRecord),
}

impl PutOutcome {
  pub fn record(&self) -> &EntryRecord {
    match self {
      PutOutcome::Written(record) | PutOutcome::Unchanged(record) => record,
    }
  }
}

#[derive(Clone)]
pub struct ResourceStore {
  root: PathBuf,
  lock: Arc<RunLock>,
}

impl fmt::Debug for ResourceStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResourceStore")
      .field("root", &self.root)
      .field("access", &self.access())
      .finish()
  }
}

impl ResourceStore {
  /// Open the store for staging entries on behalf of `command`.
  ///
  /// Fails immediately if any other handle has the store open.
  pub fn open_exclusive(root: impl Into<PathBuf>, command: &str) -> Result<Self, StoreError> {
    Self::open(root.into(), Access::Exclusive, command)
  }

  /// Open the store for reading; fails while a writer holds it.
  pub fn open_shared(root: impl Into<PathBuf>, command: &str) -> Result<Self, StoreError> {
    Self::open(root.into(), Access::Shared, command)
  }

  fn open(root: PathBuf, access: Access, command: &str) -> Result<Self, StoreError> {
    fs::create_dir_all(&root).map_err(|source| StoreError::CreateDir {
      path: root.clone(),
      source,
    })?;
    let lock = RunLock::acquire(&root, access, command)?;
    Ok(Self {
      root,
      lock: Arc::new(lock),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn access(&self) -> Access {
    self.lock.access()
  }

  /// Fails unless this handle may stage entries.
  pub fn ensure_writable(&self) -> Result<(), StoreError> {
    match self.access() {
      Access::Exclusive => Ok(()),
      Access::Shared => Err(StoreError::ReadOnly(self.root.clone())),
    }
  }

  pub fn entry_path(&self, module: &Module) -> PathBuf {
    self.root.join(module.artifact_file_name())
  }

  fn manifest_path(&self) -> PathBuf {
    self.root.join(MANIFEST_FILENAME)
  }

  /// Current bytes of a module's entry, if any.
  pub fn read(&self, module: &Module) -> Result<Option<Vec<u8>>, StoreError> {
    let path = self.entry_path(module);
    match fs::read(&path) {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(source) => Err(StoreError::Read { path, source }),
    }
  }

  /// Load the manifest; an absent manifest is an empty one.
  pub fn load_manifest(&self) -> Result<StoreManifest, StoreError> {
    let path = self.manifest_path();
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoreManifest::new()),
      Err(source) => return Err(StoreError::Read { path, source }),
    };

    let manifest: StoreManifest = serde_json::from_str(&content).map_err(StoreError::ParseManifest)?;
    if manifest.version != MANIFEST_VERSION {
      return Err(StoreError::UnsupportedVersion(manifest.version));
    }
    Ok(manifest)
  }

  fn save_manifest(&self, manifest: &StoreManifest) -> Result<(), StoreError> {
    let content = serde_json::to_vec_pretty(manifest).map_err(StoreError::SerializeManifest)?;
    self.write_atomic(&self.manifest_path(), &content)
  }

  /// Stage `bytes` as the entry for `module`.
  ///
  /// Identical bytes are a no-op, which keeps repeated collects idempotent.
  pub fn put(&self, module: &Module, bytes: &[u8]) -> Result<PutOutcome, StoreError> {
    self.ensure_writable()?;
    let path = self.entry_path(module);
    let sha256 = hash_bytes(bytes);
    let mut manifest = self.load_manifest()?;

    if let Some(record) = manifest.get(&module.name)
      && record.sha256 == sha256
      && self.on_disk_matches(&path, &sha256)?
    {
      debug!(module = %module.name, hash = %sha256.short(), "entry unchanged");
      return Ok(PutOutcome::Unchanged(record.clone()));
    }

    self.write_atomic(&path, bytes)?;
    let record = manifest.record_write(&module.name, &module.artifact_file_name(), sha256, bytes.len() as u64);
    self.save_manifest(&manifest)?;

    info!(
      module = %module.name,
      hash = %record.sha256.short(),
      generation = record.generation,
      "staged entry"
    );
    Ok(PutOutcome::Written(record))
  }

  /// Attach provenance to an embedding module's current entry.
  pub fn attach_provenance(&self, module: &Module, provenance: Provenance) -> Result<EntryRecord, StoreError> {
    self.ensure_writable()?;
    let mut manifest = self.load_manifest()?;
    let record = manifest
      .entries
      .get_mut(&module.name)
      .ok_or_else(|| StoreError::MissingEntry(module.name.clone()))?;
    record.provenance = Some(provenance);
    let record = record.clone();
    self.save_manifest(&manifest)?;
    Ok(record)
  }

  fn on_disk_matches(&self, path: &Path, expected: &ContentHash) -> Result<bool, StoreError> {
    match hash_file(path) {
      Ok(actual) => Ok(actual == *expected),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
      Err(source) => Err(StoreError::Read {
        path: path.to_path_buf(),
        source,
      }),
    }
  }

  /// Write to a temp file in the store directory, fsync, rename into place.
  fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
      path: path.to_path_buf(),
      source,
    };

    let mut temp = NamedTempFile::new_in(&self.root).map_err(write_err)?;
    temp.write_all(bytes).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
  }
}
