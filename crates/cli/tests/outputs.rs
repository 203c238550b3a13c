// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn rombridge() -> Command {
    Command::new(env!("CARGO_BIN_EXE_rombridge"))
}

/// A card with two ROMs and an empty floppies folder.
fn write_card(dir: &Path) {
    std::fs::create_dir_all(dir.join("sd/roms")).unwrap();
    std::fs::create_dir_all(dir.join("sd/floppies")).unwrap();
    std::fs::write(dir.join("sd/roms/demo.bin"), [0x12, 0x34, 0x56, 0x78]).unwrap();
    std::fs::write(dir.join("sd/roms/zork.img"), vec![0u8; 512]).unwrap();
}

fn run(dir: &Path, script: &str) -> (Output, PathBuf) {
    let script_path = dir.join("host.yaml");
    std::fs::write(&script_path, script).unwrap();
    let result_path = dir.join("out/result.json");
    let output = rombridge()
        .args(["run", "--script"])
        .arg(&script_path)
        .arg("--output")
        .arg(&result_path)
        .output()
        .expect("Failed to execute command");
    (output, result_path)
}

fn read_result(path: &Path) -> serde_json::Value {
    let content = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[test]
fn test_load_rom_script_passes() {
    let dir = tempfile::tempdir().unwrap();
    write_card(dir.path());
    let (output, result_path) = run(
        dir.path(),
        r#"
schema_version: "1.0"
inputs:
  sd_root: "sd"
  config_image: "config.bin"
limits:
  max_iterations_per_step: 20
steps:
  - command: list_roms
  - command: load_rom
    index: 1
assertions:
  - boot_feature: "ROM_EMULATOR"
  - response_contains: "zork.img"
  - config_value:
      key: "BOOT_FEATURE"
      value: "ROM_EMULATOR"
"#,
    );
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result = read_result(&result_path);
    assert_eq!(result["result_schema_version"], "1.0");
    assert_eq!(result["status"], "pass");
    assert_eq!(result["steps_executed"], 2);
    assert_eq!(result["boot_feature"], "ROM_EMULATOR");
    assert_eq!(result["steps"][0]["response"], "demo.bin\nzork.img");
    assert_eq!(result["steps"][1]["completed"], true);
    assert_eq!(result["flash_hash"].as_str().unwrap().len(), 64);
    assert_eq!(result["assertions"].as_array().unwrap().len(), 3);

    // The feature went to the config image on disk.
    let shown = rombridge()
        .args(["config", "show", "--image"])
        .arg(dir.path().join("config.bin"))
        .output()
        .unwrap();
    assert!(shown.status.success());
    assert!(String::from_utf8_lossy(&shown.stdout).contains("ROM_EMULATOR"));
}

#[test]
fn test_failed_assertion_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    write_card(dir.path());
    let (output, result_path) = run(
        dir.path(),
        r#"
schema_version: "1.0"
inputs:
  sd_root: "sd"
limits:
  max_iterations_per_step: 20
steps:
  - command: list_floppies
assertions:
  - response_contains: "missing.st"
  - boot_feature: "CONFIGURATOR"
"#,
    );
    assert_eq!(output.status.code(), Some(1));
    let result = read_result(&result_path);
    assert_eq!(result["status"], "fail");
    assert_eq!(result["assertions"][0]["passed"], false);
    assert_eq!(result["assertions"][1]["passed"], true);
}

#[test]
fn test_steps_after_boot_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_card(dir.path());
    let (output, result_path) = run(
        dir.path(),
        r#"
schema_version: "1.0"
inputs:
  sd_root: "sd"
limits:
  max_iterations_per_step: 20
steps:
  - command: boot_rtc
  - command: list_roms
assertions:
  - boot_feature: "RTC_EMULATOR"
"#,
    );
    assert_eq!(output.status.code(), Some(0));
    let result = read_result(&result_path);
    assert_eq!(result["steps_executed"], 1);
    assert_eq!(result["boot"]["selection"]["alt_emulator"], "rtc");
}

#[test]
fn test_unknown_command_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let (output, result_path) = run(
        dir.path(),
        r#"
schema_version: "1.0"
inputs:
  sd_root: "sd"
limits:
  max_iterations_per_step: 20
steps:
  - command: format_card
"#,
    );
    assert_eq!(output.status.code(), Some(2));
    let result = read_result(&result_path);
    assert_eq!(result["status"], "error");
    assert!(result["message"].as_str().unwrap().contains("Step 0"));
}

#[test]
fn test_missing_http_fixture_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    write_card(dir.path());
    let (output, _) = run(
        dir.path(),
        r#"
schema_version: "1.0"
inputs:
  sd_root: "sd"
limits:
  max_iterations_per_step: 20
network:
  http:
    "http://roms.example/index.json": "nowhere.json"
steps:
  - command: get_roms_json_file
"#,
    );
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_network_session() {
    let dir = tempfile::tempdir().unwrap();
    write_card(dir.path());
    let (output, result_path) = run(
        dir.path(),
        r#"
schema_version: "1.0"
inputs:
  sd_root: "sd"
limits:
  max_iterations_per_step: 20
network:
  networks:
    - ssid: "home"
      auth_mode: 3
  password: "secret"
  ipv4: "10.0.0.7"
  latest_release: "v99.0.0"
steps:
  - command: connect_network
    ssid: "home"
    password: "secret"
    auth_mode: 3
  - command: get_ip_data
  - command: get_latest_release
assertions:
  - response_contains: "10.0.0.7"
  - response_contains: "v99.0.0"
  - config_value:
      key: "WIFI_SSID"
      value: "home"
"#,
    );
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let result = read_result(&result_path);
    assert_eq!(result["steps"][0]["completed"], true);
    assert!(result["steps"][0].get("token").is_none());
}
