//! Implementation of the `resforge status` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use resforge_lib::pipeline::{FreshnessReport, verify_freshness};
use resforge_lib::store::{EntryRecord, ResourceStore};

use super::load_config;
use crate::output::{self, OutputFormat, format_bytes, print_info, print_json, print_stat};

#[derive(Serialize)]
struct ModuleStatus<'a> {
  module: &'a str,
  path: &'a Path,
  embeds: &'a [String],
  #[serde(skip_serializing_if = "Option::is_none")]
  entry: Option<&'a EntryRecord>,
  fresh: bool,
}

pub fn cmd_status(config_path: &Path, verbose: bool, output: OutputFormat) -> Result<()> {
  let config = load_config(config_path)?;

  let store = ResourceStore::open_shared(&config.res_dir, "status").context("Failed to open resource store")?;
  let manifest = store.load_manifest().context("Failed to load store manifest")?;
  let freshness = verify_freshness(&config.workspace, &store).context("Failed to check entries")?;

  let statuses: Vec<ModuleStatus> = config
    .workspace
    .modules()
    .iter()
    .map(|module| ModuleStatus {
      module: &module.name,
      path: &module.path,
      embeds: module.embeds(),
      entry: manifest.get(&module.name),
      fresh: freshness.issues_for(&module.name).next().is_none(),
    })
    .collect();

  if output.is_json() {
    return print_json(&serde_json::json!({
      "res_dir": config.res_dir,
      "clock": manifest.clock,
      "modules": statuses,
    }));
  }

  print_info(&format!("Resource store: {}", config.res_dir.display()));
  println!();
  for status in &statuses {
    let source = status.path.strip_prefix(config.workspace.root()).unwrap_or(status.path);
    print_module(status, source, &freshness, verbose);
  }

  Ok(())
}

fn print_module(status: &ModuleStatus, source: &Path, freshness: &FreshnessReport, verbose: bool) {
  let state = if status.fresh { "fresh" } else { "stale" };
  let value = match status.entry {
    Some(entry) => format!(
      "{} {} {} gen {} [{}]",
      entry.file_name,
      entry.sha256.short(),
      format_bytes(entry.size),
      entry.generation,
      state
    ),
    None => "no entry".to_string(),
  };
  print_stat(status.module, &value);

  println!("      {} source {}", output::symbols::ARROW, source.display());
  if !status.embeds.is_empty() {
    println!("      {} embeds {}", output::symbols::ARROW, status.embeds.join(", "));
  }
  if verbose {
    for issue in freshness.issues_for(status.module) {
      println!("      {} {}", output::symbols::WARNING, issue);
    }
  }
}
