mod build;
mod collect;
mod status;
mod verify;

pub use build::cmd_build;
pub use collect::cmd_collect;
pub use status::cmd_status;
pub use verify::cmd_verify;

use std::path::Path;

use anyhow::{Context, Result};

use resforge_lib::config::Config;

fn load_config(path: &Path) -> Result<Config> {
  Config::load(path).with_context(|| format!("Failed to load {}", path.display()))
}
