use predicates::prelude::*;

use super::common::{FAILING_CARGO, FAKE_CARGO, TestEnv};

fn deployer_embedding(token: &[u8]) -> Vec<u8> {
  let mut bytes = b"\0asmdeployer:".to_vec();
  bytes.extend_from_slice(token);
  bytes
}

#[test]
fn build_from_empty_store_embeds_fresh_token() {
  let env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);

  env
    .resforge_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("first-build..."))
    .stdout(predicate::str::contains("embedding-rebuild..."))
    .stdout(predicate::str::contains("Build complete"));

  let token = env.read_entry("token.wasm").unwrap();
  assert_eq!(token, b"\0asmtoken v1");
  assert_eq!(env.read_entry("deployer.wasm").unwrap(), deployer_embedding(&token));
}

#[test]
fn editing_token_changes_both_entries() {
  let env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);
  env.resforge_cmd().arg("build").assert().success();
  let deployer_before = env.read_entry("deployer.wasm").unwrap();

  env.write_file("token/src.txt", "token v2");
  env.resforge_cmd().arg("build").assert().success();

  let token = env.read_entry("token.wasm").unwrap();
  assert_eq!(token, b"\0asmtoken v2");
  let deployer = env.read_entry("deployer.wasm").unwrap();
  assert_ne!(deployer, deployer_before);
  assert_eq!(deployer, deployer_embedding(&token));
}

#[test]
fn failed_build_prints_diagnostic_and_keeps_entries() {
  let mut env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);
  env.resforge_cmd().arg("build").assert().success();
  let token = env.read_entry("token.wasm").unwrap();
  let deployer = env.read_entry("deployer.wasm").unwrap();

  env.set_cargo(FAILING_CARGO);
  env
    .resforge_cmd()
    .arg("build")
    .assert()
    .code(1)
    .stderr(predicate::str::contains(
      "error[E0425]: cannot find value `supply` in this scope\n --> token/src/lib.rs:12:5",
    ))
    .stderr(predicate::str::contains("first-build failed"))
    .stderr(predicate::str::contains("exit code 101"));

  assert_eq!(env.read_entry("token.wasm").unwrap(), token);
  assert_eq!(env.read_entry("deployer.wasm").unwrap(), deployer);
}

#[test]
fn failed_first_build_on_empty_store_stages_nothing() {
  let env = TestEnv::token_deployer().with_cargo(FAILING_CARGO);

  env.resforge_cmd().arg("build").assert().code(1);

  assert!(env.read_entry("token.wasm").is_none());
  assert!(env.read_entry("deployer.wasm").is_none());
}

#[test]
fn missing_compiler_fails() {
  let env = TestEnv::token_deployer();

  env
    .resforge_cmd()
    .arg("build")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("failed to run"));
}

#[test]
fn rebuild_is_idempotent() {
  let env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);
  env.resforge_cmd().arg("build").assert().success();
  let token = env.read_entry("token.wasm").unwrap();
  let deployer = env.read_entry("deployer.wasm").unwrap();

  env
    .resforge_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Changed: none"));

  assert_eq!(env.read_entry("token.wasm").unwrap(), token);
  assert_eq!(env.read_entry("deployer.wasm").unwrap(), deployer);
}

#[test]
fn unrelated_store_files_untouched() {
  let env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);
  env.write_file("res/defi.wasm", "external contract");

  env.resforge_cmd().arg("build").assert().success();

  assert_eq!(env.read_entry("defi.wasm").unwrap(), b"external contract");
}

#[test]
fn build_json_output_lists_phases() {
  let env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);

  env
    .resforge_cmd()
    .args(["build", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"first-build\""))
    .stdout(predicate::str::contains("\"embedding-rebuild\""))
    .stdout(predicate::str::contains("\"final-collect\""))
    .stdout(predicate::str::contains("\"built_after\""));
}

#[test]
fn verbose_build_logs_phases() {
  let env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);

  env
    .resforge_cmd()
    .args(["build", "--verbose"])
    .assert()
    .success()
    .stderr(predicate::str::contains("pipeline phase"));
}

#[test]
fn interrupt_cancels_between_phases_without_killing_cargo() {
  // Cargo takes a moment and records whether the interrupt reached it.
  let slow_cargo = format!("trap 'touch interrupted; exit 130' INT\ntouch started\nsleep 2\n{}", FAKE_CARGO);
  let env = TestEnv::token_deployer().with_cargo(&slow_cargo);

  let child = env.spawn_resforge(&["build"]);
  env.wait_for_file("started");
  let sent = std::process::Command::new("kill")
    .args(["-INT", "--", &format!("-{}", child.id())])
    .status()
    .unwrap();
  assert!(sent.success());

  let output = child.wait_with_output().unwrap();
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert_eq!(output.status.code(), Some(1), "stderr: {stderr}");
  assert!(stderr.contains("cancelled before first-collect"), "stderr: {stderr}");
  assert!(!stderr.contains("exit code 130"), "stderr: {stderr}");
  assert!(!env.path().join("interrupted").exists());
  assert!(env.read_entry("token.wasm").is_none());
}
