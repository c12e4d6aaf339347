use predicates::prelude::*;

use super::common::{FAKE_CARGO, TestEnv};

#[test]
fn verify_after_build_succeeds() {
  let env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);
  env.resforge_cmd().arg("build").assert().success();

  env
    .resforge_cmd()
    .arg("verify")
    .assert()
    .success()
    .stdout(predicate::str::contains("All 2 entries are fresh"));
}

#[test]
fn verify_detects_single_pass_build() {
  let env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);
  env.resforge_cmd().arg("build").assert().success();

  // Stage a deployer compiled against an older token, bypassing the pipeline.
  env.write_file("stale/deployer.wasm", "\0asmdeployer:old token");
  env.resforge_cmd().args(["collect", "stale"]).assert().success();

  env
    .resforge_cmd()
    .arg("verify")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("deployer: not staged by an embedding rebuild"));
}

#[test]
fn verify_detects_out_of_band_edit() {
  let env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);
  env.resforge_cmd().arg("build").assert().success();
  env.write_file("res/token.wasm", "\0asmhand edited");

  env
    .resforge_cmd()
    .arg("verify")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("token: entry modified outside resforge"));
}

#[test]
fn status_shows_entries() {
  let env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);
  env.resforge_cmd().arg("build").assert().success();

  env
    .resforge_cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("token.wasm"))
    .stdout(predicate::str::contains("[fresh]"))
    .stdout(predicate::str::contains("source deployer"))
    .stdout(predicate::str::contains("embeds token"));
}

#[test]
fn status_json_output_is_valid() {
  let env = TestEnv::token_deployer().with_cargo(FAKE_CARGO);
  env.resforge_cmd().arg("build").assert().success();

  let output = env.resforge_cmd().args(["status", "-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let modules = json["modules"].as_array().unwrap();
  assert_eq!(modules.len(), 2);
  assert_eq!(modules[0]["module"], "token");
  let path = std::path::PathBuf::from(modules[0]["path"].as_str().unwrap());
  assert!(path.is_absolute());
  assert!(path.ends_with("token"));
  assert_eq!(modules[1]["module"], "deployer");
  assert_eq!(modules[1]["fresh"], true);
  assert!(modules[1]["entry"]["provenance"]["embedded"]["token"].is_object());
}
