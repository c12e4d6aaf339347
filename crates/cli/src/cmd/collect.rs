//! Implementation of the `resforge collect` command.

use std::path::Path;

use anyhow::{Context, Result};

use resforge_lib::collect::ArtifactCollector;
use resforge_lib::store::ResourceStore;

use super::load_config;
use crate::output::{OutputFormat, print_info, print_json, print_stat, print_success, print_warning};

/// Stage binaries from `dir` into the resource store without building.
///
/// Staging a changed embedding binary this way drops its freshness record;
/// `resforge verify` reports it until the next `resforge build`.
pub fn cmd_collect(config_path: &Path, dir: &Path, output: OutputFormat) -> Result<()> {
  let config = load_config(config_path)?;

  let store = ResourceStore::open_exclusive(&config.res_dir, "collect").context("Failed to open resource store")?;

  let report = ArtifactCollector::new(&config.workspace, &store)
    .collect(dir)
    .with_context(|| format!("Failed to collect from {}", dir.display()))?;

  if output.is_json() {
    return print_json(&report);
  }

  if report.staged_count() == 0 {
    print_info(&format!("No module binaries found in {}", dir.display()));
    return Ok(());
  }

  print_success(&format!("Collected {} binaries", report.staged_count()));
  for module in &report.written {
    print_stat(module, "updated");
  }
  for module in &report.unchanged {
    print_stat(module, "unchanged");
  }
  if report.written.iter().any(|m| config.workspace.module(m).is_some_and(|m| m.is_embedding())) {
    print_warning("Embedding entries were replaced outside a build; run `resforge verify`");
  }

  Ok(())
}
