//! Implementation of the `resforge verify` command.

use std::path::Path;

use anyhow::{Context, Result, bail};

use resforge_lib::pipeline::verify_freshness;
use resforge_lib::store::ResourceStore;

use super::load_config;
use crate::output::{OutputFormat, print_json, print_success, print_warning};

/// Fails when any embedding entry does not embed the current entries.
pub fn cmd_verify(config_path: &Path, output: OutputFormat) -> Result<()> {
  let config = load_config(config_path)?;

  let store = ResourceStore::open_shared(&config.res_dir, "verify").context("Failed to open resource store")?;
  let report = verify_freshness(&config.workspace, &store).context("Failed to check entries")?;

  if output.is_json() {
    print_json(&report)?;
  } else if report.is_fresh() {
    print_success(&format!("All {} entries are fresh", report.checked.len()));
  } else {
    for issue in &report.issues {
      print_warning(&issue.to_string());
    }
  }

  if !report.is_fresh() {
    bail!(
      "found {} freshness issue(s) across {} modules; run `resforge build`",
      report.issues.len(),
      report.checked.len()
    );
  }

  Ok(())
}
