//! Implementation of the `resforge build` command.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use resforge_lib::build::WorkspaceBuilder;
use resforge_lib::build::cargo::CargoCompiler;
use resforge_lib::pipeline::{CancelFlag, Pipeline, RunReport};
use resforge_lib::store::ResourceStore;

use super::load_config;
use crate::output::{OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success};

/// Run the full pipeline for the configured workspace.
///
/// Holds the store exclusively for the whole run. Cargo runs in its own process
/// group, so Ctrl-C reaches only resforge: the compile in progress finishes and
/// the run stops before the next phase starts.
pub fn cmd_build(config_path: &Path, output: OutputFormat) -> Result<()> {
  let config = load_config(config_path)?;

  let store = ResourceStore::open_exclusive(&config.res_dir, "build").context("Failed to open resource store")?;

  let compiler = CargoCompiler::from_config(&config);
  let builder = WorkspaceBuilder::new(
    config.workspace.clone(),
    compiler,
    config.target.clone(),
    config.staging_dir(),
  );

  let cancel = CancelFlag::new();
  let mut pipeline = Pipeline::new(builder, store).with_cancel(cancel.clone());
  if !output.is_json() {
    pipeline = pipeline.on_phase(|phase| {
      if !phase.is_terminal() {
        print_info(&format!("{}...", phase));
      }
    });
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, stopping after the current phase");
      cancel.cancel();
    }
  });

  let report = rt.block_on(pipeline.run()).context("Build failed")?;

  if output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report);
  }

  Ok(())
}

fn print_report(report: &RunReport) {
  println!();
  print_success("Build complete!");
  for record in &report.phases {
    let modules = if record.modules.is_empty() {
      "-".to_string()
    } else {
      record.modules.join(", ")
    };
    print_stat(
      &record.phase.to_string(),
      &format!("{} ({})", modules, format_duration(record.duration())),
    );
  }

  println!();
  for (module, entry) in &report.entries {
    print_stat(
      module,
      &format!(
        "{} {} {}",
        entry.file_name,
        entry.sha256.short(),
        format_bytes(entry.size)
      ),
    );
  }

  let written = report.written();
  println!();
  if written.is_empty() {
    print_stat("Changed", "none");
  } else {
    print_stat("Changed", &written.join(", "));
  }
  print_stat("Duration", &format_duration(report.total_duration()));
}
