//! Freshness verification.
//!
//! An embedding entry is fresh when the store manifest shows it was staged by
//! a completed embedding rebuild, and that rebuild consumed exactly the current
//! entries of every module it embeds, after those entries reached their values.

use std::fmt;
use std::io;

use serde::Serialize;

use crate::store::{ResourceStore, StoreError};
use crate::util::hash::hash_file;
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FreshnessIssue {
  /// No entry (or no manifest record) for a configured module.
  MissingEntry { module: String },
  /// The entry's bytes no longer match the manifest.
  Modified { module: String },
  /// The embedding entry was not staged by a completed rebuild.
  NoProvenance { module: String },
  /// The rebuild did not record reading `embeds`.
  NotEmbedded { module: String, embeds: String },
  /// The rebuild consumed bytes other than the current entry of `embeds`.
  StaleEmbed {
    module: String,
    embeds: String,
    embedded_sha256: String,
    current_sha256: String,
  },
  /// `embeds` reached its current value after the rebuild started.
  OutOfOrder {
    module: String,
    embeds: String,
    generation: u64,
    built_after: u64,
  },
}

impl FreshnessIssue {
  pub fn module(&self) -> &str {
    match self {
      FreshnessIssue::MissingEntry { module }
      | FreshnessIssue::Modified { module }
      | FreshnessIssue::NoProvenance { module }
      | FreshnessIssue::NotEmbedded { module, .. }
      | FreshnessIssue::StaleEmbed { module, .. }
      | FreshnessIssue::OutOfOrder { module, .. } => module,
    }
  }
}

impl fmt::Display for FreshnessIssue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FreshnessIssue::MissingEntry { module } => write!(f, "{}: no resource store entry", module),
      FreshnessIssue::Modified { module } => write!(f, "{}: entry modified outside resforge", module),
      FreshnessIssue::NoProvenance { module } => {
        write!(f, "{}: not staged by an embedding rebuild (stale self-reference)", module)
      }
      FreshnessIssue::NotEmbedded { module, embeds } => {
        write!(f, "{}: rebuild did not record embedding {}", module, embeds)
      }
      FreshnessIssue::StaleEmbed {
        module,
        embeds,
        embedded_sha256,
        current_sha256,
      } => write!(
        f,
        "{}: embeds {} at {} but the current entry is {}",
        module,
        embeds,
        &embedded_sha256[..embedded_sha256.len().min(12)],
        &current_sha256[..current_sha256.len().min(12)]
      ),
      FreshnessIssue::OutOfOrder {
        module,
        embeds,
        generation,
        built_after,
      } => write!(
        f,
        "{}: {} changed at generation {} after the rebuild started at {}",
        module, embeds, generation, built_after
      ),
    }
  }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FreshnessReport {
  /// Modules that were checked, in workspace order.
  pub checked: Vec<String>,
  pub issues: Vec<FreshnessIssue>,
}

impl FreshnessReport {
  pub fn is_fresh(&self) -> bool {
    self.issues.is_empty()
  }

  pub fn issues_for<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a FreshnessIssue> + 'a {
    self.issues.iter().filter(move |issue| issue.module() == module)
  }
}

impl fmt::Display for FreshnessReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_fresh() {
      return write!(f, "all {} entries fresh", self.checked.len());
    }
    for (idx, issue) in self.issues.iter().enumerate() {
      if idx > 0 {
        writeln!(f)?;
      }
      write!(f, "  {}", issue)?;
    }
    Ok(())
  }
}

/// Check every configured module's entry, and the freshness of every
/// embedding entry, against the store manifest.
pub fn verify_freshness(workspace: &Workspace, store: &ResourceStore) -> Result<FreshnessReport, StoreError> {
  let manifest = store.load_manifest()?;
  let mut report = FreshnessReport::default();

  for module in workspace.modules() {
    report.checked.push(module.name.clone());

    let Some(record) = manifest.get(&module.name) else {
      report.issues.push(FreshnessIssue::MissingEntry {
        module: module.name.clone(),
      });
      continue;
    };

    let path = store.entry_path(module);
    match hash_file(&path) {
      Ok(actual) if actual == record.sha256 => {}
      Ok(_) => report.issues.push(FreshnessIssue::Modified {
        module: module.name.clone(),
      }),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        report.issues.push(FreshnessIssue::MissingEntry {
          module: module.name.clone(),
        });
        continue;
      }
      Err(source) => return Err(StoreError::Read { path, source }),
    }

    if !module.is_embedding() {
      continue;
    }

    let Some(provenance) = &record.provenance else {
      report.issues.push(FreshnessIssue::NoProvenance {
        module: module.name.clone(),
      });
      continue;
    };

    for embeds in module.embeds() {
      let Some(current) = manifest.get(embeds) else {
        // Reported as MissingEntry when the embedded module itself is checked.
        continue;
      };
      let Some(consumed) = provenance.embedded.get(embeds) else {
        report.issues.push(FreshnessIssue::NotEmbedded {
          module: module.name.clone(),
          embeds: embeds.clone(),
        });
        continue;
      };

      if consumed.sha256 != current.sha256 {
        report.issues.push(FreshnessIssue::StaleEmbed {
          module: module.name.clone(),
          embeds: embeds.clone(),
          embedded_sha256: consumed.sha256.0.clone(),
          current_sha256: current.sha256.0.clone(),
        });
      } else if current.generation > provenance.built_after {
        report.issues.push(FreshnessIssue::OutOfOrder {
          module: module.name.clone(),
          embeds: embeds.clone(),
          generation: current.generation,
          built_after: provenance.built_after,
        });
      }
    }
  }

  Ok(report)
}
