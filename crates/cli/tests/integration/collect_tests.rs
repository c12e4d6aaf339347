use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn collect_stages_matching_binaries() {
  let env = TestEnv::token_deployer();
  env.write_file("out/token.wasm", "\0asmtoken");
  env.write_file("out/notes.txt", "not a module");

  env
    .resforge_cmd()
    .args(["collect", "out"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Collected 1 binaries"));

  assert_eq!(env.read_entry("token.wasm").unwrap(), b"\0asmtoken");
  assert!(env.read_entry("notes.txt").is_none());
}

#[test]
fn collect_rejects_non_wasm_binary() {
  let env = TestEnv::token_deployer();
  env.write_file("out/token.wasm", "garbage");

  env
    .resforge_cmd()
    .args(["collect", "out"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("not a WebAssembly binary"));

  assert!(env.read_entry("token.wasm").is_none());
}

#[test]
fn collect_empty_directory_reports_nothing() {
  let env = TestEnv::token_deployer();
  std::fs::create_dir_all(env.path().join("out")).unwrap();

  env
    .resforge_cmd()
    .args(["collect", "out"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No module binaries found"));
}

#[test]
fn collect_json_output_is_valid() {
  let env = TestEnv::token_deployer();
  env.write_file("out/deployer.wasm", "\0asmdeployer");

  env
    .resforge_cmd()
    .args(["collect", "out", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"written\""))
    .stdout(predicate::str::contains("deployer"));
}
