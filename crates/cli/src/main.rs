mod cmd;
mod output;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use resforge_lib::build::BuildError;
use resforge_lib::consts::CONFIG_FILENAME;

use crate::output::{OutputFormat, print_error};

/// resforge - two-phase build for contracts that embed other contracts
#[derive(Parser)]
#[command(name = "resforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the workspace configuration file
  #[arg(short, long, global = true, default_value = CONFIG_FILENAME)]
  config: PathBuf,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build every module, then rebuild embedding modules against the fresh entries
  Build {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Stage every matching binary found in a directory into the resource store
  Collect {
    /// Directory holding compiled binaries
    dir: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show resource store entries for every configured module
  Status {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Check that every embedding entry embeds the current entries
  Verify {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "info" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Build { output } => cmd::cmd_build(&cli.config, output),
    Commands::Collect { dir, output } => cmd::cmd_collect(&cli.config, &dir, output),
    Commands::Status { output } => cmd::cmd_status(&cli.config, cli.verbose, output),
    Commands::Verify { output } => cmd::cmd_verify(&cli.config, output),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_diagnostic(&err);
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}

/// Compiler output is printed exactly as the compiler produced it.
fn print_diagnostic(err: &anyhow::Error) {
  let Some(BuildError::Failed(failure)) = err.chain().find_map(|e| e.downcast_ref::<BuildError>()) else {
    return;
  };
  if failure.diagnostic.is_empty() {
    return;
  }

  let mut stderr = std::io::stderr().lock();
  let _ = stderr.write_all(failure.diagnostic.as_bytes());
  if !failure.diagnostic.ends_with('\n') {
    let _ = stderr.write_all(b"\n");
  }
}
