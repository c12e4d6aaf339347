//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// `token` is embedded by `deployer`, like the fungible token deployer.
pub const TOKEN_DEPLOYER_CONFIG: &str = r#"{
  "modules": [
    { "name": "token" },
    { "name": "deployer", "embeds": ["token"] }
  ]
}"#;

/// Stand-in for `cargo build --message-format=json`.
///
/// `token.wasm` carries the contents of `token/src.txt`. `deployer.wasm`
/// carries whatever `res/token.wasm` holds at compile time, the way
/// `include_bytes!` would.
#[cfg(unix)]
pub const FAKE_CARGO: &str = r#"
mkdir -p out
emit() {
  echo "{\"reason\":\"compiler-artifact\",\"filenames\":[\"$PWD/out/$1\"]}"
}
deployer() {
  { printf '\000asm'; printf 'deployer:'; cat res/token.wasm 2>/dev/null; } > out/deployer.wasm
  emit deployer.wasm
}
case "$*" in
  *"-p deployer"*)
    deployer
    ;;
  *)
    { printf '\000asm'; cat token/src.txt; } > out/token.wasm
    emit token.wasm
    deployer
    ;;
esac
"#;

/// A compiler that always fails with a rustc-style error.
#[cfg(unix)]
pub const FAILING_CARGO: &str = r#"
echo 'error[E0425]: cannot find value `supply` in this scope' >&2
echo ' --> token/src/lib.rs:12:5' >&2
echo 'error: could not compile `token` (lib) due to 1 previous error' >&2
exit 101
"#;

/// Isolated test environment.
///
/// Each test gets its own workspace directory holding `resforge.json`, module
/// sources and the resource store.
pub struct TestEnv {
  pub temp: TempDir,
  cargo: Option<PathBuf>,
}

impl TestEnv {
  /// Create a workspace with the token/deployer configuration.
  pub fn token_deployer() -> Self {
    let env = Self::empty();
    env.write_file("resforge.json", TOKEN_DEPLOYER_CONFIG);
    env.write_file("token/src.txt", "token v1");
    env
  }

  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
      cargo: None,
    }
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn res_path(&self, file_name: &str) -> PathBuf {
    self.temp.path().join("res").join(file_name)
  }

  pub fn read_entry(&self, file_name: &str) -> Option<Vec<u8>> {
    std::fs::read(self.res_path(file_name)).ok()
  }

  /// Install an executable script used as `$CARGO` by later commands.
  #[cfg(unix)]
  pub fn with_cargo(mut self, body: &str) -> Self {
    self.set_cargo(body);
    self
  }

  #[cfg(unix)]
  pub fn set_cargo(&mut self, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    let path = self.temp.path().join("bin").join("cargo");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    self.cargo = Some(path);
  }

  /// Start resforge in its own process group, as a shell job would run it.
  #[cfg(unix)]
  pub fn spawn_resforge(&self, args: &[&str]) -> std::process::Child {
    use std::os::unix::process::CommandExt;
    use std::process::Stdio;

    let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_resforge"));
    cmd
      .args(args)
      .current_dir(self.temp.path())
      .env_remove("RESFORGE_RES_DIR")
      .env_remove("RESFORGE_TARGET_DIR")
      .env_remove("RUST_LOG")
      .env("CARGO", self.cargo.as_ref().unwrap())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .process_group(0);
    cmd.spawn().unwrap()
  }

  /// Wait up to ten seconds for `relative_path` to appear.
  #[cfg(unix)]
  pub fn wait_for_file(&self, relative_path: &str) {
    let path = self.temp.path().join(relative_path);
    for _ in 0..1000 {
      if path.exists() {
        return;
      }
      std::thread::sleep(std::time::Duration::from_millis(10));
    }
    panic!("{} never appeared", path.display());
  }

  /// Get a pre-configured Command for the resforge binary.
  ///
  /// Runs inside the workspace directory with environment overrides cleared.
  pub fn resforge_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("resforge");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("RESFORGE_RES_DIR");
    cmd.env_remove("RESFORGE_TARGET_DIR");
    cmd.env_remove("RUST_LOG");
    match &self.cargo {
      Some(cargo) => cmd.env("CARGO", cargo),
      None => cmd.env("CARGO", self.temp.path().join("bin").join("no-cargo")),
    };
    cmd
  }
}
