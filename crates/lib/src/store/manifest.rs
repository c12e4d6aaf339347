//! The Resource Store manifest (`.resforge-manifest.json`).
//!
//! Records, per entry, the content hash and a logical generation taken from a
//! store-wide clock. The clock only advances when an entry's bytes change, so
//! generations order writes without relying on wall-clock time.
//!
//! Embedding entries staged by a complete pipeline run also carry
//! [`Provenance`]: the hash and generation of every embedded entry as it was
//! when the embedding rebuild started.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::util::hash::ContentHash;

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
  pub version: u32,
  /// Logical clock; equals the generation of the most recent write.
  pub clock: u64,
  /// Entry records keyed by module name.
  pub entries: BTreeMap<String, EntryRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
  pub file_name: String,
  pub sha256: ContentHash,
  pub size: u64,
  pub generation: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub provenance: Option<Provenance>,
}

/// What an embedding build consumed from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
  /// Store clock when the embedding rebuild started.
  pub built_after: u64,
  pub embedded: BTreeMap<String, EmbeddedRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedRef {
  pub sha256: ContentHash,
  pub generation: u64,
}

impl From<&EntryRecord> for EmbeddedRef {
  fn from(record: &EntryRecord) -> Self {
    Self {
      sha256: record.sha256.clone(),
      generation: record.generation,
    }
  }
}

impl Default for StoreManifest {
  fn default() -> Self {
    Self::new()
  }
}

impl StoreManifest {
  pub fn new() -> Self {
    Self {
      version: MANIFEST_VERSION,
      clock: 0,
      entries: BTreeMap::new(),
    }
  }

  pub fn get(&self, module: &str) -> Option<&EntryRecord> {
    self.entries.get(module)
  }

  /// Records new bytes for `module`, advancing the clock.
  ///
  /// Any provenance on the previous record is dropped: it described other bytes.
  pub fn record_write(&mut self, module: &str, file_name: &str, sha256: ContentHash, size: u64) -> EntryRecord {
    self.clock += 1;
    let record = EntryRecord {
      file_name: file_name.to_string(),
      sha256,
      size,
      generation: self.clock,
      provenance: None,
    };
    self.entries.insert(module.to_string(), record.clone());
    record
  }
}
