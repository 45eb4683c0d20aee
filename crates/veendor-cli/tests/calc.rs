use assert_cmd::cargo::cargo_bin_cmd;
use std::fs;

mod common;

use common::{parse_json, Fixture};

#[test]
fn calc_prints_only_the_fingerprint() {
    let fixture = Fixture::new("veendor-calc");
    let assert = cargo_bin_cmd!("veendor")
        .current_dir(&fixture.project)
        .arg("calc")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let hash = stdout.trim_end();
    assert_eq!(stdout, format!("{hash}\n"));
    assert_eq!(hash.len(), 40);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn calc_honors_the_configured_suffix() {
    let fixture = Fixture::new("veendor-calc-suffix");
    let plain = cargo_bin_cmd!("veendor")
        .current_dir(&fixture.project)
        .arg("calc")
        .assert()
        .success();
    let plain = String::from_utf8(plain.get_output().stdout.clone()).expect("utf8");

    fs::write(
        fixture.project.join("ci.json"),
        r#"{
            "backends": [{"alias": "l", "backend": "local", "options": {"directory": "b"}}],
            "packageHash": {"suffix": {"env": "VEENDOR_TEST_PLATFORM"}}
        }"#,
    )
    .expect("config");
    cargo_bin_cmd!("veendor")
        .current_dir(&fixture.project)
        .env("VEENDOR_TEST_PLATFORM", "linux-arm64")
        .args(["calc", "--config", "ci.json"])
        .assert()
        .success()
        .stdout(format!("{}-linux-arm64\n", plain.trim_end()));
}

#[test]
fn calc_without_package_json_is_a_user_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = cargo_bin_cmd!("veendor")
        .current_dir(temp.path())
        .args(["calc", "--json"])
        .assert()
        .code(1);
    let payload = parse_json(&assert.get_output().stdout);
    assert_eq!(payload["status"], "user-error");
    assert_eq!(payload["details"]["reason"], "manifest_missing");
}
